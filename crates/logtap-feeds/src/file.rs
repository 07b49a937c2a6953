//! File feed reader.
//!
//! Reads a file from the beginning and keeps following it. Growth is picked
//! up on a polling tick; a filesystem watcher on the parent directory, when
//! available, only wakes the tick early. On every tick the path is checked
//! against the open handle:
//!
//! - a different file at the path (rotation): finish reading the old handle,
//!   then reopen the path from offset zero,
//! - the same file but shorter than what was read (truncation): reopen from
//!   offset zero.

use crate::reader::{ErrorSink, ReaderCore, RecordSink};
use crate::LogReader;
use async_trait::async_trait;
use chrono::Utc;
use logtap_core::{normalize_line, FeedError, Record, Result, SourceKind};
use notify::{RecursiveMode, Watcher};
use std::fs::Metadata;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, Notify};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Tails a file on disk.
pub struct FileReader {
    core: ReaderCore,
    path: PathBuf,
    poll_interval: Duration,
}

impl FileReader {
    pub fn new(path: impl Into<PathBuf>, tx: mpsc::Sender<Record>) -> Self {
        Self {
            core: ReaderCore::new(SourceKind::File, tx),
            path: path.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl LogReader for FileReader {
    fn kind(&self) -> SourceKind {
        SourceKind::File
    }

    fn on_error(&mut self, sink: ErrorSink) {
        self.core.set_error_sink(sink);
    }

    async fn stream_into(&mut self) -> Result<()> {
        let file = File::open(&self.path)
            .await
            .map_err(|e| FeedError::file(&self.path, e))?;
        let meta = file
            .metadata()
            .await
            .map_err(|e| FeedError::file(&self.path, e))?;
        tracing::info!(path = %self.path.display(), size = meta.len(), "file reader opened");

        let follower = Follower {
            path: self.path.clone(),
            poll_interval: self.poll_interval,
            reader: BufReader::new(file),
            identity: FileIdentity::of(&meta),
            offset: 0,
            partial: Vec::new(),
            wake: ChangeHint::watch(&self.path),
        };
        self.core.start(move |sink| follower.run(sink))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.core.close().await
    }
}

/// What makes "the file at this path" the same file across ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileIdentity {
    #[cfg(unix)]
    dev: u64,
    #[cfg(unix)]
    ino: u64,
    #[cfg(not(unix))]
    created: Option<std::time::SystemTime>,
}

impl FileIdentity {
    #[cfg(unix)]
    fn of(meta: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            dev: meta.dev(),
            ino: meta.ino(),
        }
    }

    #[cfg(not(unix))]
    fn of(meta: &Metadata) -> Self {
        Self {
            created: meta.created().ok(),
        }
    }
}

/// Wakes the follower early when something in the parent directory changes.
struct ChangeHint {
    notify: Arc<Notify>,
    // dropping the watcher stops the notifications
    _watcher: notify::RecommendedWatcher,
}

impl ChangeHint {
    fn watch(path: &Path) -> Option<Self> {
        let target = path.file_name()?.to_os_string();
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let notify = Arc::new(Notify::new());
        let wake = notify.clone();
        let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                if event
                    .paths
                    .iter()
                    .any(|p| p.file_name() == Some(target.as_os_str()))
                {
                    wake.notify_one();
                }
            }
        });
        let mut watcher = match watcher {
            Ok(w) => w,
            Err(e) => {
                tracing::warn!(error = %e, "file watcher unavailable, polling only");
                return None;
            }
        };
        if let Err(e) = watcher.watch(&dir, RecursiveMode::NonRecursive) {
            tracing::warn!(dir = %dir.display(), error = %e, "cannot watch directory, polling only");
            return None;
        }
        Some(Self {
            notify,
            _watcher: watcher,
        })
    }
}

struct Follower {
    path: PathBuf,
    poll_interval: Duration,
    reader: BufReader<File>,
    identity: FileIdentity,
    /// Bytes consumed from the current handle.
    offset: u64,
    /// Tail of the file that has no newline yet.
    partial: Vec<u8>,
    wake: Option<ChangeHint>,
}

impl Follower {
    async fn run(mut self, sink: RecordSink) -> Result<()> {
        loop {
            if !self.drain(&sink).await? {
                return Ok(());
            }
            if !self.wait(&sink).await {
                return Ok(());
            }
            if !self.follow_path(&sink).await? {
                return Ok(());
            }
        }
    }

    /// Sleep until the next tick, an early wake, or close. False on close.
    async fn wait(&self, sink: &RecordSink) -> bool {
        let tick = tokio::time::sleep(self.poll_interval);
        match &self.wake {
            Some(hint) => tokio::select! {
                biased;
                _ = sink.stopped() => false,
                _ = tick => true,
                _ = hint.notify.notified() => true,
            },
            None => tokio::select! {
                biased;
                _ = sink.stopped() => false,
                _ = tick => true,
            },
        }
    }

    /// Deliver every complete line available on the current handle.
    /// False once the sink stops accepting records.
    async fn drain(&mut self, sink: &RecordSink) -> Result<bool> {
        let mut buf = Vec::new();
        loop {
            if sink.is_stopped() {
                return Ok(false);
            }
            buf.clear();
            let n = self
                .reader
                .read_until(b'\n', &mut buf)
                .await
                .map_err(|e| FeedError::file(&self.path, e))?;
            if n == 0 {
                return Ok(true);
            }
            self.offset += n as u64;
            if buf.last() != Some(&b'\n') {
                self.partial.extend_from_slice(&buf);
                continue;
            }
            let line = if self.partial.is_empty() {
                std::mem::take(&mut buf)
            } else {
                let mut line = std::mem::take(&mut self.partial);
                line.extend_from_slice(&buf);
                line
            };
            if !emit(&line, sink).await {
                return Ok(false);
            }
        }
    }

    /// Reconcile the open handle with whatever is at the path now.
    async fn follow_path(&mut self, sink: &RecordSink) -> Result<bool> {
        let current = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                // mid-rotation: keep the old handle until a new file appears
                tracing::trace!(path = %self.path.display(), "path missing");
                return Ok(true);
            }
            Err(e) => return Err(FeedError::file(&self.path, e)),
        };

        let replaced = FileIdentity::of(&current) != self.identity;
        if replaced {
            if !self.drain(sink).await? {
                return Ok(false);
            }
            if !self.partial.is_empty() {
                let rest = std::mem::take(&mut self.partial);
                if !emit(&rest, sink).await {
                    return Ok(false);
                }
            }
            tracing::info!(path = %self.path.display(), "rotation detected, reopening");
        } else if current.len() < self.offset {
            tracing::info!(
                path = %self.path.display(),
                size = current.len(),
                offset = self.offset,
                "truncation detected, reading from start"
            );
            self.partial.clear();
        } else {
            return Ok(true);
        }

        let file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(FeedError::file(&self.path, e)),
        };
        let meta = file
            .metadata()
            .await
            .map_err(|e| FeedError::file(&self.path, e))?;
        self.identity = FileIdentity::of(&meta);
        self.reader = BufReader::new(file);
        self.offset = 0;
        Ok(true)
    }
}

async fn emit(line: &[u8], sink: &RecordSink) -> bool {
    let text = String::from_utf8_lossy(line);
    sink.deliver(normalize_line(&text, Utc::now())).await
}
