use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::error::DownloadError;
use crate::presentation::{Presenter, Progress};

/// Opens a finished file with the desktop's default handler.
pub trait FileOpener: Send + Sync {
    fn open(&self, path: &Path) -> std::io::Result<()>;
}

/// `FileOpener` backed by the `opener` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemOpener;

impl FileOpener for SystemOpener {
    fn open(&self, path: &Path) -> std::io::Result<()> {
        opener::open(path).map_err(std::io::Error::other)
    }
}

/// Snapshot of one open download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadItem {
    pub path: PathBuf,
    pub bytes_written: u64,
    pub total_bytes: Option<u64>,
}

impl DownloadItem {
    fn fraction(&self) -> Option<f64> {
        match self.total_bytes {
            Some(0) => Some(1.0),
            Some(total) => Some((self.bytes_written as f64 / total as f64).min(1.0)),
            None => None,
        }
    }
}

// `None` once the download is closed, aborted or restarted; a write that
// raced with that finds nothing to write to.
type SharedWriter = Arc<tokio::sync::Mutex<Option<BufWriter<File>>>>;

struct Entry {
    item: DownloadItem,
    writer: SharedWriter,
}

/// Path-keyed set of open downloads.
///
/// A path is present exactly while its download is open. Signals for a path
/// that is not open (late chunks, duplicate closes) are ignored. The map lock
/// is never held across file I/O; each entry has its own async writer lock.
pub struct DownloadQueue {
    entries: Mutex<HashMap<PathBuf, Entry>>,
    presenter: Arc<dyn Presenter>,
    opener: Box<dyn FileOpener>,
}

impl DownloadQueue {
    pub fn new(presenter: Arc<dyn Presenter>) -> Self {
        Self::with_opener(presenter, Box::new(SystemOpener))
    }

    pub fn with_opener(presenter: Arc<dyn Presenter>, opener: Box<dyn FileOpener>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            presenter,
            opener,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create the destination file and start tracking it.
    ///
    /// Reopening a path that is already open discards the old download's
    /// unwritten bytes, truncates the file and restarts its counters.
    pub async fn open(&self, path: impl Into<PathBuf>) -> Result<DownloadItem, DownloadError> {
        let path = path.into();
        let previous = self.lock().remove(&path);
        if let Some(previous) = &previous {
            log::warn!("Restarting download: {}", path.display());
            retire(&previous.writer).await;
        }

        let file = match File::create(&path).await {
            Ok(file) => file,
            Err(source) => {
                if previous.is_some() {
                    let progress = progress_of(&self.lock());
                    self.publish(progress);
                }
                return Err(DownloadError::PathUnavailable { path, source });
            }
        };
        let item = DownloadItem {
            path: path.clone(),
            bytes_written: 0,
            total_bytes: None,
        };
        log::info!("Download started: {}", path.display());

        let progress = {
            let mut entries = self.lock();
            entries.insert(
                path,
                Entry {
                    item: item.clone(),
                    writer: Arc::new(tokio::sync::Mutex::new(Some(BufWriter::new(file)))),
                },
            );
            progress_of(&entries)
        };
        self.publish(progress);
        Ok(item)
    }

    /// Record the expected size of an open download.
    pub fn report_total(&self, path: &Path, total_bytes: u64) {
        match self.lock().get_mut(path) {
            Some(entry) => entry.item.total_bytes = Some(total_bytes),
            None => log::debug!("Ignoring size report for {}: not open", path.display()),
        }
    }

    /// Append `bytes` and refresh progress.
    ///
    /// A failed write drops the item and leaves the partial file on disk.
    pub async fn write_chunk(&self, path: &Path, bytes: &[u8]) -> Result<(), DownloadError> {
        let writer = self.lock().get(path).map(|e| Arc::clone(&e.writer));
        let Some(writer) = writer else {
            log::debug!("Ignoring chunk for {}: not open", path.display());
            return Ok(());
        };

        let written = {
            let mut guard = writer.lock().await;
            let Some(out) = guard.as_mut() else {
                log::debug!("Ignoring chunk for {}: closed", path.display());
                return Ok(());
            };
            let written = out.write_all(bytes).await;
            if written.is_err() {
                guard.take();
            }
            written
        };

        let (result, progress) = {
            let mut entries = self.lock();
            // Closed or restarted while this chunk was being written.
            if !entries
                .get(path)
                .is_some_and(|e| Arc::ptr_eq(&e.writer, &writer))
            {
                return Ok(());
            }
            let result = match written {
                Ok(()) => {
                    if let Some(entry) = entries.get_mut(path) {
                        entry.item.bytes_written += bytes.len() as u64;
                    }
                    Ok(())
                }
                Err(source) => {
                    entries.remove(path);
                    Err(DownloadError::Write {
                        path: path.to_path_buf(),
                        source,
                    })
                }
            };
            (result, progress_of(&entries))
        };
        self.publish(progress);
        if let Err(e) = &result {
            log::error!("Download aborted: {e}");
        }
        result
    }

    /// Finish a download, optionally opening the file afterwards.
    pub async fn close(&self, path: &Path, open_after: bool) -> Result<(), DownloadError> {
        let (entry, progress) = {
            let mut entries = self.lock();
            let entry = entries.remove(path);
            (entry, progress_of(&entries))
        };
        let Some(entry) = entry else {
            log::debug!("Ignoring close for {}: not open", path.display());
            return Ok(());
        };

        let writer = entry.writer.lock().await.take();
        let flushed = match writer {
            Some(mut writer) => writer.flush().await,
            None => Ok(()),
        };
        self.publish(progress);
        flushed.map_err(|source| DownloadError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("Download finished: {}", path.display());

        if open_after {
            self.opener
                .open(path)
                .map_err(|source| DownloadError::Open {
                    path: path.to_path_buf(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Stop tracking a download without opening it.
    ///
    /// Bytes still buffered are dropped; the partial file stays on disk.
    pub async fn abort(&self, path: &Path) {
        let (removed, progress) = {
            let mut entries = self.lock();
            let removed = entries.remove(path);
            (removed, progress_of(&entries))
        };
        if let Some(entry) = removed {
            retire(&entry.writer).await;
            log::warn!("Download aborted: {}", path.display());
            self.publish(progress);
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.lock().contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn item(&self, path: &Path) -> Option<DownloadItem> {
        self.lock().get(path).map(|e| e.item.clone())
    }

    /// Aggregate progress over everything currently open.
    pub fn progress(&self) -> Progress {
        progress_of(&self.lock()).1
    }

    fn publish(&self, (count, progress): (usize, Progress)) {
        if count == 0 {
            self.presenter.clear_progress();
            self.presenter.clear_badge();
        } else {
            self.presenter.set_badge(count);
            self.presenter.set_progress(progress);
        }
    }
}

// Drop buffered bytes, then wait out any write the file still has in flight
// so nothing lands after the path is reused.
async fn retire(writer: &SharedWriter) {
    let Some(writer) = writer.lock().await.take() else {
        return;
    };
    let mut file = writer.into_inner();
    if let Err(e) = file.flush().await {
        log::debug!("Discarding download writer: {e}");
    }
}

fn progress_of(entries: &HashMap<PathBuf, Entry>) -> (usize, Progress) {
    (
        entries.len(),
        aggregate_progress(entries.values().map(|e| &e.item)),
    )
}

/// Mean completion of `items`; indeterminate if any total is unknown.
pub fn aggregate_progress<'a>(items: impl IntoIterator<Item = &'a DownloadItem>) -> Progress {
    let mut sum = 0.0;
    let mut count = 0usize;
    for item in items {
        match item.fraction() {
            Some(f) => sum += f,
            None => return Progress::Indeterminate,
        }
        count += 1;
    }
    if count == 0 {
        Progress::None
    } else {
        Progress::Fraction(sum / count as f64)
    }
}
