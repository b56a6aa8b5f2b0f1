use std::fs::Metadata;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::classify::LineParser;
use super::state::{ActiveTailGuard, LogTailState};
use crate::error::AgentError;

/// Control handle of a running log tailer.
///
/// The tailer follows whichever file it was last told about. Dropping every
/// handle stops the tailer (and its worker) for good.
#[derive(Clone)]
pub struct LogTailer {
    control: mpsc::Sender<PathBuf>,
}

impl LogTailer {
    /// Start the control loop. Nothing is tailed until the first [`notify`](Self::notify).
    pub fn spawn(
        state: Arc<LogTailState>,
        parser: Arc<LineParser>,
        poll_interval: Duration,
        shutdown: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        // Capacity 1: a notifying scrape waits until the loop has taken the path.
        let (control, rx) = mpsc::channel(1);
        let handle = tokio::spawn(control_loop(rx, state, parser, poll_interval, shutdown));
        (Self { control }, handle)
    }

    /// Point the tailer at `path`. Notifying the file already tailed is a no-op.
    pub async fn notify(&self, path: PathBuf) -> anyhow::Result<()> {
        self.control
            .send(path)
            .await
            .map_err(|e| anyhow::anyhow!("log tailer stopped, dropped {}", e.0.display()))
    }
}

struct ActiveTail {
    path: PathBuf,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl ActiveTail {
    /// Cancel the worker and wait until it has fully stopped
    async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            tracing::error!(path = %self.path.display(), error = %e, "log tail worker failed");
        }
        tracing::debug!(path = %self.path.display(), "log tail stopped");
    }
}

async fn control_loop(
    mut rx: mpsc::Receiver<PathBuf>,
    state: Arc<LogTailState>,
    parser: Arc<LineParser>,
    poll_interval: Duration,
    shutdown: CancellationToken,
) {
    let mut last_notified: Option<PathBuf> = None;
    let mut active: Option<ActiveTail> = None;

    loop {
        let path = tokio::select! {
            _ = shutdown.cancelled() => break,
            msg = rx.recv() => match msg {
                Some(path) => path,
                None => break,
            },
        };

        if last_notified.as_ref() == Some(&path) {
            continue;
        }

        // Only the very first file starts at its end; a freshly started agent
        // must not replay an old log, but a rotated-in file is read in full.
        let from_end = last_notified.is_none();
        last_notified = Some(path.clone());

        if let Some(tail) = active.take() {
            tracing::info!(from = %tail.path.display(), to = %path.display(), "log file changed, switching");
            tail.stop().await;
        }

        match open_log(&path, from_end).await {
            Ok(log) => {
                let cancel = shutdown.child_token();
                let guard = state.tail_guard();
                let handle = tokio::spawn(follow(
                    log,
                    path.clone(),
                    Arc::clone(&parser),
                    Arc::clone(&state),
                    poll_interval,
                    cancel.clone(),
                    guard,
                ));
                state.set_current_logfile(Some(&path)).await;
                tracing::info!(path = %path.display(), from_end, "log tail started");
                active = Some(ActiveTail { path, cancel, handle });
            }
            Err(e) => {
                state.set_current_logfile(None).await;
                tracing::error!(error = %e, "cannot tail log file, waiting for the next one");
            }
        }
    }

    if let Some(tail) = active.take() {
        tail.stop().await;
    }
    state.set_current_logfile(None).await;
    tracing::debug!("log tailer stopped");
}

/// Identity of an open file, so a replaced path is told apart from a truncated one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileId {
    dev: u64,
    ino: u64,
}

#[cfg(unix)]
fn file_id(meta: &Metadata) -> Option<FileId> {
    use std::os::unix::fs::MetadataExt;
    Some(FileId {
        dev: meta.dev(),
        ino: meta.ino(),
    })
}

#[cfg(not(unix))]
fn file_id(_meta: &Metadata) -> Option<FileId> {
    None
}

struct OpenLog {
    reader: BufReader<File>,
    position: u64,
    id: Option<FileId>,
}

async fn open_log(path: &Path, from_end: bool) -> Result<OpenLog, AgentError> {
    let tail_error = |source| AgentError::Tail {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).await.map_err(tail_error)?;
    let id = file_id(&file.metadata().await.map_err(tail_error)?);
    let position = if from_end {
        file.seek(SeekFrom::End(0)).await.map_err(tail_error)?
    } else {
        0
    };

    Ok(OpenLog {
        reader: BufReader::new(file),
        position,
        id,
    })
}

/// What an idle worker should do about the file at its path
#[derive(Debug, PartialEq, Eq)]
enum IdleCheck {
    Unchanged,
    Truncated,
    Replaced,
}

fn check_idle(meta: &Metadata, open_id: Option<FileId>, position: u64) -> IdleCheck {
    match (file_id(meta), open_id) {
        (Some(current), Some(open)) if current != open => IdleCheck::Replaced,
        _ if meta.len() < position => IdleCheck::Truncated,
        _ => IdleCheck::Unchanged,
    }
}

async fn follow(
    mut log: OpenLog,
    path: PathBuf,
    parser: Arc<LineParser>,
    state: Arc<LogTailState>,
    poll_interval: Duration,
    cancel: CancellationToken,
    _guard: ActiveTailGuard,
) {
    // Bytes of the line being read; kept across EOF until its newline arrives.
    let mut line = Vec::new();

    while !cancel.is_cancelled() {
        match log.reader.read_until(b'\n', &mut line).await {
            Ok(0) => {
                // A missing path (mid-rotation) is retried on the next poll.
                if let Ok(meta) = tokio::fs::metadata(&path).await {
                    match check_idle(&meta, log.id, log.position) {
                        IdleCheck::Unchanged => {}
                        IdleCheck::Truncated => {
                            tracing::info!(path = %path.display(), "log file truncated, reading from start");
                            if let Err(e) = log.reader.seek(SeekFrom::Start(0)).await {
                                let e = AgentError::Tail { path: path.clone(), source: e };
                                tracing::error!(error = %e, "log tail aborted");
                                break;
                            }
                            log.position = 0;
                            line.clear();
                        }
                        IdleCheck::Replaced => match open_log(&path, false).await {
                            Ok(reopened) => {
                                tracing::info!(path = %path.display(), "log file replaced, reopening from start");
                                log = reopened;
                                line.clear();
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "log file replaced but not readable yet");
                            }
                        },
                    }
                }

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
            Ok(n) => {
                log.position += n as u64;
                if line.last() == Some(&b'\n') {
                    let text = String::from_utf8_lossy(&line);
                    if let Some(entry) = parser.parse(&text) {
                        state.record(entry).await;
                    }
                    line.clear();
                }
            }
            Err(e) => {
                let e = AgentError::Tail { path: path.clone(), source: e };
                tracing::error!(error = %e, "log tail aborted");
                break;
            }
        }
    }
}
