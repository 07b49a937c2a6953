//! logtap-feeds: log feed readers for logtap.
//!
//! Each reader connects to one source, turns what it reads into canonical
//! [`Record`]s and pushes them onto a bounded channel drained by the consumer.
//! All readers share one lifecycle, expressed by [`LogReader`]:
//!
//! 1. build the reader with its source settings and the channel's sender,
//! 2. [`LogReader::stream_into`] checks preconditions, spawns the producer
//!    task and returns immediately,
//! 3. [`LogReader::close`] stops the producer, waits for it and reports how
//!    it ended.
//!
//! ```text
//! FileReader ─┐
//! StdinReader ├─► RecordSink ──► mpsc(1) ──► consumer
//! RemoteReader┘
//! ```

pub mod auth;
pub mod file;
pub mod reader;
pub mod remote;
pub mod stdin;

use async_trait::async_trait;
use logtap_core::config::Config;
use logtap_core::{Record, Result, SourceKind, TimeRange};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

pub use file::FileReader;
pub use reader::{ErrorSink, ReaderCore, RecordSink};
pub use remote::{LoggingApi, RemoteReader, StreamMode};
pub use stdin::StdinReader;

/// Capacity used when the caller does not pick one: every send waits for the
/// consumer to take the previous record.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1;

/// Allocate a record channel. A capacity of zero is raised to one.
pub fn record_channel(capacity: usize) -> (mpsc::Sender<Record>, mpsc::Receiver<Record>) {
    mpsc::channel(capacity.max(1))
}

/// The lifecycle shared by every source.
#[async_trait]
pub trait LogReader: Send {
    /// Which kind of source this reader pulls from.
    fn kind(&self) -> SourceKind;

    /// Register the callback invoked once when the producer fails.
    fn on_error(&mut self, sink: ErrorSink);

    /// Validate the source and start producing in the background.
    ///
    /// Returns once the producer task is spawned. Only setup failures (the
    /// file cannot be opened, the backend cannot be reached) are returned
    /// here; later failures go to the error sink and to [`LogReader::close`].
    async fn stream_into(&mut self) -> Result<()>;

    /// Stop the producer, wait for it to finish and return its outcome.
    ///
    /// The record channel is closed once the producer has returned, so no
    /// record is ever sent after `close` resolves.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// What a reader should read from.
pub enum SourceSpec {
    /// Tail a file, following rotation and truncation.
    File(PathBuf),
    /// Read standard input until end of input.
    Stdin,
    /// Replay and then tail a remote logging API.
    Remote {
        api: Arc<dyn LoggingApi>,
        project: String,
        filter: Option<String>,
        range: TimeRange,
    },
}

impl SourceSpec {
    /// A file when a path is given, standard input otherwise.
    pub fn from_file_arg(path: Option<PathBuf>) -> Self {
        match path {
            Some(path) if !path.as_os_str().is_empty() => SourceSpec::File(path),
            _ => SourceSpec::Stdin,
        }
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            SourceSpec::File(_) => SourceKind::File,
            SourceSpec::Stdin => SourceKind::Stdin,
            SourceSpec::Remote { .. } => SourceKind::RemoteApi,
        }
    }
}

/// Build the reader for `spec`, writing into `tx`.
pub fn open_reader(
    spec: SourceSpec,
    config: &Config,
    tx: mpsc::Sender<Record>,
) -> Box<dyn LogReader> {
    match spec {
        SourceSpec::File(path) => Box::new(
            FileReader::new(path, tx).with_poll_interval(config.stream.poll_interval()),
        ),
        SourceSpec::Stdin => Box::new(StdinReader::new(tx)),
        SourceSpec::Remote {
            api,
            project,
            filter,
            range,
        } => Box::new(
            RemoteReader::new(api, project, filter, range, tx)
                .with_page_size(config.remote.page_size),
        ),
    }
}
