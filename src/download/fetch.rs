use std::path::Path;

use futures::StreamExt;

use super::DownloadQueue;
use crate::error::DownloadError;

/// Stream `url` into `dest` through `queue`.
///
/// The item is opened before the request, sized from `Content-Length` when the
/// server sends one, and closed on success. Any failure aborts the item.
pub async fn fetch_to(
    client: &reqwest::Client,
    url: &str,
    queue: &DownloadQueue,
    dest: &Path,
    open_after: bool,
) -> Result<(), DownloadError> {
    queue.open(dest).await?;

    match stream_body(client, url, queue, dest).await {
        Ok(written) => {
            log::info!("Downloaded {written} bytes from {url}");
            queue.close(dest, open_after).await
        }
        Err(e) => {
            queue.abort(dest).await;
            Err(e)
        }
    }
}

async fn stream_body(
    client: &reqwest::Client,
    url: &str,
    queue: &DownloadQueue,
    dest: &Path,
) -> Result<u64, DownloadError> {
    let response = client.get(url).send().await?.error_for_status()?;
    if let Some(total) = response.content_length() {
        queue.report_total(dest, total);
    }

    let mut written = 0u64;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        queue.write_chunk(dest, &chunk).await?;
        written += chunk.len() as u64;
    }
    Ok(written)
}
