//! Update feed URL construction.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use url::Url;

use crate::error::UpdateError;

/// Characters JavaScript's `encodeURIComponent` leaves alone.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Parameters the web application supplies for an update check.
///
/// All five are required; any `None` means the caller is not ready yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateCheckParams {
    /// Where release packages are published.
    pub auto_update_url: Option<String>,
    pub upgrade_version: Option<String>,
    pub upgrade_version_int: Option<u64>,
    pub current_version_int: Option<u64>,
    pub product_name: Option<String>,
}

/// A fully specified check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedRequest {
    pub auto_update_url: String,
    pub upgrade_version: String,
    pub upgrade_version_int: u64,
    pub current_version_int: u64,
    pub product_name: String,
}

impl UpdateCheckParams {
    pub fn complete(&self) -> Option<FeedRequest> {
        Some(FeedRequest {
            auto_update_url: self.auto_update_url.clone()?,
            upgrade_version: self.upgrade_version.clone()?,
            upgrade_version_int: self.upgrade_version_int?,
            current_version_int: self.current_version_int?,
            product_name: self.product_name.clone()?,
        })
    }
}

/// Package URL for `version` on `os_arch`.
pub fn package_url(auto_update_url: &str, version: &str, os_arch: &str) -> String {
    format!(
        "{}/pgadmin4-{version}-{os_arch}.zip",
        auto_update_url.trim_end_matches('/')
    )
}

/// Feed endpoint on the local backend that proxies the release server.
pub fn feed_url(
    base_url: &str,
    session_key: &str,
    request: &FeedRequest,
    os_arch: &str,
) -> Result<Url, UpdateError> {
    let package = package_url(&request.auto_update_url, &request.upgrade_version, os_arch);
    let raw = format!(
        "{}/misc/auto_update/{}/{}/{}/{}/{}/?key={}",
        base_url.trim_end_matches('/'),
        request.current_version_int,
        utf8_percent_encode(&request.upgrade_version, URI_COMPONENT),
        request.upgrade_version_int,
        utf8_percent_encode(&request.product_name, URI_COMPONENT),
        utf8_percent_encode(&package, URI_COMPONENT),
        session_key,
    );
    Ok(Url::parse(&raw)?)
}
