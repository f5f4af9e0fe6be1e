//! Bounded, atomic artifact downloads
//!
//! [`DownloadManager::fetch_all`] runs a batch of [`DownloadTask`]s through a
//! worker pool of at most `max_concurrent_downloads` transfers. Every transfer
//! writes to `<destination>.part` and is renamed into place only once the
//! bytes are flushed, so an interrupted run never leaves a truncated file under
//! the final name. A destination that already exists is skipped; this is the
//! whole idempotency story, existing files are recognized by name only.
//!
//! Failures are isolated: one task failing never stops its siblings, and the
//! returned [`DownloadReport`] lists every failure.

use crate::cancel::CancelToken;
use crate::error::DownloadFailure;
use crate::progress::{emit, ProgressCallback, ProgressEvent};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Suffix of in-flight download files
pub const PART_EXTENSION: &str = "part";

/// Longest wait for the next bytes of a transfer
pub const READ_TIMEOUT: Duration = Duration::from_secs(60);

/// One artifact to store at `destination`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub url: String,
    pub destination: PathBuf,
    /// Name used in logs and progress events
    pub file_name: String,
}

impl DownloadTask {
    /// Task storing `url` as `dir/file_name`
    pub fn new(url: impl Into<String>, dir: &Path, file_name: impl Into<String>) -> Self {
        let file_name = file_name.into();
        Self {
            url: url.into(),
            destination: dir.join(&file_name),
            file_name,
        }
    }
}

/// File name of a download URL: its last path segment, percent-decoded
///
/// Returns `None` for URLs without a usable final segment, including
/// segments that decode to something containing a path separator.
pub fn url_file_name(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.last()?;
    let name = urlencoding::decode(segment).ok()?.into_owned();

    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return None;
    }
    Some(name)
}

/// Path of the temporary file a download is written to
pub fn part_path(destination: &Path) -> PathBuf {
    let mut name = destination.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(PART_EXTENSION);
    destination.with_file_name(name)
}

/// Moves the bytes of one artifact
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    /// Stream `url` into `out`, reporting `(transferred, total)` as bytes
    /// arrive; returns the number of bytes written
    async fn fetch(
        &self,
        url: &str,
        out: &mut (dyn AsyncWrite + Unpin + Send),
        progress: &(dyn Fn(u64, Option<u64>) + Send + Sync),
    ) -> Result<u64>;
}

/// [`ArtifactFetcher`] over HTTP(S)
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str) -> Result<Self> {
        Self::with_read_timeout(user_agent, READ_TIMEOUT)
    }

    /// Fetcher that fails a transfer once no bytes arrive for `read_timeout`
    pub fn with_read_timeout(user_agent: &str, read_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .connect_timeout(Duration::from_secs(15))
            .read_timeout(read_timeout)
            .build()
            .map_err(|e| Error::transport("Failed to build HTTP client", e))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ArtifactFetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        out: &mut (dyn AsyncWrite + Unpin + Send),
        progress: &(dyn Fn(u64, Option<u64>) + Send + Sync),
    ) -> Result<u64> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::transport(&format!("GET {}", url), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Transport(format!("GET {}: HTTP {}", url, status.as_u16())));
        }

        let total = response.content_length();
        let mut transferred = 0u64;

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Error::transport(&format!("GET {}", url), e))?
        {
            out.write_all(&chunk).await?;
            transferred += chunk.len() as u64;
            progress(transferred, total);
        }

        Ok(transferred)
    }
}

/// Outcome of a batch
#[derive(Debug, Default)]
pub struct DownloadReport {
    /// Tasks whose destination now exists, including skipped ones
    pub completed: Vec<DownloadTask>,
    /// How many of `completed` were already present
    pub skipped: usize,
    pub failed: Vec<(DownloadTask, Error)>,
}

impl DownloadReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Turn failures into [`Error::DownloadsFailed`] naming every artifact, or
    /// [`Error::Cancelled`] if the batch was cancelled
    pub fn into_result(self) -> Result<Vec<DownloadTask>> {
        if self.failed.is_empty() {
            return Ok(self.completed);
        }
        if self.failed.iter().any(|(_, e)| e.is_cancelled()) {
            return Err(Error::Cancelled);
        }

        Err(Error::DownloadsFailed(
            self.failed
                .into_iter()
                .map(|(task, err)| DownloadFailure {
                    file_name: task.file_name,
                    url: task.url,
                    reason: err.to_string(),
                })
                .collect(),
        ))
    }
}

/// Worker pool for artifact downloads
pub struct DownloadManager {
    fetcher: Arc<dyn ArtifactFetcher>,
    max_concurrent_downloads: usize,
    cancel: CancelToken,
}

impl DownloadManager {
    /// Create a pool; a bound of zero is treated as one
    pub fn new(fetcher: Arc<dyn ArtifactFetcher>, max_concurrent_downloads: usize) -> Self {
        Self {
            fetcher,
            max_concurrent_downloads: max_concurrent_downloads.max(1),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn max_concurrent_downloads(&self) -> usize {
        self.max_concurrent_downloads
    }

    /// Download every task not already present
    ///
    /// Tasks are dispatched in the given order. Tasks sharing a destination are
    /// collapsed to the first one.
    pub async fn fetch_all(
        &self,
        tasks: Vec<DownloadTask>,
        progress: Option<ProgressCallback>,
    ) -> DownloadReport {
        let mut seen = HashSet::new();
        let tasks: Vec<DownloadTask> = tasks
            .into_iter()
            .filter(|task| seen.insert(task.destination.clone()))
            .collect();

        let total = tasks.len();
        let mut finished = 0;
        let mut report = DownloadReport::default();
        let mut queue = VecDeque::with_capacity(total);

        for task in tasks {
            if is_file(&task.destination).await {
                debug!("Skipping {}: already present", task.file_name);
                emit(
                    progress.as_ref(),
                    ProgressEvent::TaskSkipped {
                        file_name: task.file_name.clone(),
                    },
                );
                report.completed.push(task);
                report.skipped += 1;
                finished += 1;
                emit(progress.as_ref(), ProgressEvent::Overall { finished, total });
            } else {
                queue.push_back(task);
            }
        }

        if !queue.is_empty() {
            info!(
                "Downloading {} file(s), {} at a time",
                queue.len(),
                self.max_concurrent_downloads
            );
        }

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_downloads));
        let mut join_set = JoinSet::new();
        let mut in_flight: HashMap<usize, DownloadTask> = HashMap::new();
        let mut next_index = 0usize;

        while !queue.is_empty() || !join_set.is_empty() {
            tokio::select! {
                biased;

                Some(joined) = join_set.join_next(), if !join_set.is_empty() => {
                    let (index, result): (usize, Result<u64>) = match joined {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            warn!("Download worker stopped unexpectedly: {}", e);
                            continue;
                        }
                    };
                    let Some(task) = in_flight.remove(&index) else {
                        continue;
                    };
                    self.record(task, result, progress.as_ref(), &mut report);
                    finished += 1;
                    emit(progress.as_ref(), ProgressEvent::Overall { finished, total });
                }

                permit = Arc::clone(&semaphore).acquire_owned(), if !queue.is_empty() => {
                    let Some(task) = queue.pop_front() else {
                        continue;
                    };
                    let permit = match permit {
                        Ok(permit) => permit,
                        Err(_) => {
                            report.failed.push((task, Error::Other("download pool closed".to_string())));
                            continue;
                        }
                    };

                    let index = next_index;
                    next_index += 1;

                    let fetcher = Arc::clone(&self.fetcher);
                    let cancel = self.cancel.clone();
                    let progress = progress.clone();
                    let worker_task = task.clone();
                    in_flight.insert(index, task);

                    join_set.spawn(async move {
                        let _permit = permit;
                        let result =
                            download_one(fetcher.as_ref(), &worker_task, progress.as_ref(), &cancel).await;
                        (index, result)
                    });
                }
            }
        }

        // Workers that panicked never reported back
        for (_, task) in in_flight.drain() {
            report
                .failed
                .push((task, Error::Other("download worker panicked".to_string())));
        }

        report
    }

    fn record(
        &self,
        task: DownloadTask,
        result: Result<u64>,
        progress: Option<&ProgressCallback>,
        report: &mut DownloadReport,
    ) {
        match result {
            Ok(bytes) => {
                info!("Downloaded {} ({} bytes)", task.file_name, bytes);
                emit(
                    progress,
                    ProgressEvent::TaskFinished {
                        file_name: task.file_name.clone(),
                        bytes,
                    },
                );
                report.completed.push(task);
            }
            Err(e) => {
                if !e.is_cancelled() {
                    warn!("Failed to download {} from {}: {}", task.file_name, task.url, e);
                }
                emit(
                    progress,
                    ProgressEvent::TaskFailed {
                        file_name: task.file_name.clone(),
                        reason: e.to_string(),
                    },
                );
                report.failed.push((task, e));
            }
        }
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

async fn download_one(
    fetcher: &dyn ArtifactFetcher,
    task: &DownloadTask,
    progress: Option<&ProgressCallback>,
    cancel: &CancelToken,
) -> Result<u64> {
    cancel.check()?;

    if let Some(parent) = task.destination.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let part = part_path(&task.destination);
    debug!("Fetching {} -> {}", task.url, part.display());
    emit(
        progress,
        ProgressEvent::TaskStarted {
            file_name: task.file_name.clone(),
            total: None,
        },
    );

    let on_progress = |transferred: u64, total: Option<u64>| {
        emit(
            progress,
            ProgressEvent::TaskProgress {
                file_name: task.file_name.clone(),
                transferred,
                total,
            },
        );
    };

    let result: Result<u64> = async {
        let mut file = tokio::fs::File::create(&part).await?;

        let bytes = tokio::select! {
            fetched = fetcher.fetch(&task.url, &mut file, &on_progress) => fetched?,
            _ = cancel.cancelled() => return Err(Error::Cancelled),
        };

        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&part, &task.destination).await?;
        Ok(bytes)
    }
    .await;

    if result.is_err() {
        if let Err(e) = tokio::fs::remove_file(&part).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Could not remove {}: {}", part.display(), e);
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_url_file_name() {
        assert_eq!(
            url_file_name("https://example.com/files/Custom%20Mod-1.0.jar").as_deref(),
            Some("Custom Mod-1.0.jar")
        );
        assert_eq!(
            url_file_name("https://example.com/a/b/forge-installer.jar?token=x").as_deref(),
            Some("forge-installer.jar")
        );
        assert_eq!(url_file_name("https://example.com/"), None);
        assert_eq!(url_file_name("https://example.com/evil%2F..%2Fx.jar"), None);
        assert_eq!(url_file_name("not a url"), None);
    }

    #[test]
    fn test_part_path() {
        assert_eq!(
            part_path(Path::new("/tmp/mods/jei.jar")),
            PathBuf::from("/tmp/mods/jei.jar.part")
        );
    }

    #[tokio::test]
    async fn test_http_fetcher_streams_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/files/jei.jar")
            .with_body(vec![7u8; 4096])
            .create_async()
            .await;

        let fetcher = HttpFetcher::new("modpack-builder-test").unwrap();
        let mut out: Vec<u8> = Vec::new();
        let bytes = fetcher
            .fetch(&format!("{}/files/jei.jar", server.url()), &mut out, &|_: u64, _: Option<u64>| {})
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(bytes, 4096);
        assert_eq!(out.len(), 4096);
    }

    #[tokio::test]
    async fn test_http_fetcher_stalled_transfer_times_out() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/files/stalled.jar")
            .with_chunked_body(|w| {
                w.write_all(b"first bytes")?;
                w.flush()?;
                std::thread::sleep(Duration::from_secs(3));
                w.write_all(b"too late")
            })
            .create_async()
            .await;

        let fetcher = HttpFetcher::with_read_timeout("test", Duration::from_millis(200)).unwrap();
        let mut out: Vec<u8> = Vec::new();
        let started = std::time::Instant::now();
        let result = fetcher
            .fetch(&format!("{}/files/stalled.jar", server.url()), &mut out, &|_: u64, _: Option<u64>| {})
            .await;

        assert!(matches!(result, Err(Error::Transport(_))), "got {:?}", result);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_http_status_failure_leaves_no_file() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/missing.jar")
            .with_status(503)
            .create_async()
            .await;

        let temp_dir = TempDir::new().unwrap();
        let manager = DownloadManager::new(Arc::new(HttpFetcher::new("test").unwrap()), 2);
        let task = DownloadTask::new(
            format!("{}/missing.jar", server.url()),
            temp_dir.path(),
            "missing.jar",
        );

        let report = manager.fetch_all(vec![task.clone()], None).await;
        assert_eq!(report.failed.len(), 1);
        assert!(!task.destination.exists());
        assert!(!part_path(&task.destination).exists());

        let err = report.into_result().unwrap_err();
        assert!(matches!(err, Error::DownloadsFailed(ref f) if f[0].file_name == "missing.jar"));
    }

    #[tokio::test]
    async fn test_duplicate_destinations_collapsed() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/a.jar")
            .with_body("a")
            .expect(1)
            .create_async()
            .await;

        let temp_dir = TempDir::new().unwrap();
        let manager = DownloadManager::new(Arc::new(HttpFetcher::new("test").unwrap()), 4);
        let url = format!("{}/a.jar", server.url());
        let tasks = vec![
            DownloadTask::new(&url, temp_dir.path(), "a.jar"),
            DownloadTask::new(&url, temp_dir.path(), "a.jar"),
        ];

        let report = manager.fetch_all(tasks, None).await;
        mock.assert_async().await;
        assert_eq!(report.completed.len(), 1);
        assert!(report.is_success());
    }
}
