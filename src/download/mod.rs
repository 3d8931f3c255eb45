//! Download queue manager
//!
//! Tracks every in-flight download by destination path and keeps the
//! presenter's dock badge and progress indicator in step with it.
//!
//! ## Module Organization
//! - `queue`: the path-keyed queue and aggregate progress
//! - `fetch`: streams an HTTP response body through the queue

mod fetch;
mod queue;

pub use fetch::fetch_to;
pub use queue::{DownloadItem, DownloadQueue, FileOpener, SystemOpener, aggregate_progress};
