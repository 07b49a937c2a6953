//! Producer plumbing shared by every reader.
//!
//! [`ReaderCore`] owns the channel sender until the producer starts, the stop
//! token and the producer's join handle. The producer itself only ever sees a
//! [`RecordSink`], whose sends race against the stop token so that a producer
//! blocked on a full channel still notices `close`.

use futures::FutureExt;
use logtap_core::{FeedError, Record, Result, SourceKind};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Callback invoked once with the error that ended a producer.
pub type ErrorSink = Box<dyn Fn(&FeedError) + Send + Sync>;

/// The producer's handle on the record channel.
#[derive(Clone)]
pub struct RecordSink {
    tx: mpsc::Sender<Record>,
    stop: CancellationToken,
}

impl RecordSink {
    pub fn new(tx: mpsc::Sender<Record>, stop: CancellationToken) -> Self {
        Self { tx, stop }
    }

    /// Send one record, waiting for channel space.
    ///
    /// Returns `false` when the reader was closed or the consumer went away;
    /// the producer should return without error in that case.
    pub async fn deliver(&self, record: Record) -> bool {
        if self.stop.is_cancelled() {
            return false;
        }
        tokio::select! {
            biased;
            _ = self.stop.cancelled() => false,
            sent = self.tx.send(record) => sent.is_ok(),
        }
    }

    /// True once the reader is closing or nobody is listening any more.
    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled() || self.tx.is_closed()
    }

    /// Resolves when `close` has been requested.
    pub async fn stopped(&self) {
        self.stop.cancelled().await
    }
}

/// Lifecycle state shared by the concrete readers.
pub struct ReaderCore {
    kind: SourceKind,
    tx: Option<mpsc::Sender<Record>>,
    stop: CancellationToken,
    on_error: Option<Arc<ErrorSink>>,
    task: Option<JoinHandle<Result<()>>>,
}

impl ReaderCore {
    pub fn new(kind: SourceKind, tx: mpsc::Sender<Record>) -> Self {
        Self {
            kind,
            tx: Some(tx),
            stop: CancellationToken::new(),
            on_error: None,
            task: None,
        }
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn set_error_sink(&mut self, sink: ErrorSink) {
        self.on_error = Some(Arc::new(sink));
    }

    /// True while the producer task is running.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Hand the sender to `produce` and run it on its own task.
    ///
    /// Errors and panics from the producer are reported to the error sink
    /// exactly once and kept for [`ReaderCore::close`].
    pub fn start<F, Fut>(&mut self, produce: F) -> Result<()>
    where
        F: FnOnce(RecordSink) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let Some(tx) = self.tx.take() else {
            return Err(FeedError::transport(
                "stream_into",
                format!("{} reader was already started or closed", self.kind),
            ));
        };
        let sink = RecordSink::new(tx, self.stop.clone());
        let producer = produce(sink);
        tracing::debug!(source = %self.kind, "producer starting");
        self.task = Some(tokio::spawn(supervise(
            self.kind,
            producer,
            self.on_error.clone(),
        )));
        Ok(())
    }

    /// Stop the producer and wait for it.
    ///
    /// The sender is released only after the producer returns, so the
    /// consumer observes end-of-stream strictly after the last record.
    pub async fn close(mut self) -> Result<()> {
        self.stop.cancel();
        // never started: dropping the unused sender closes the channel
        self.tx.take();
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        match task.await {
            Ok(outcome) => {
                tracing::debug!(source = %self.kind, ok = outcome.is_ok(), "producer joined");
                outcome
            }
            Err(join) => Err(FeedError::fault(join)),
        }
    }
}

impl Drop for ReaderCore {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

async fn supervise<Fut>(
    kind: SourceKind,
    producer: Fut,
    on_error: Option<Arc<ErrorSink>>,
) -> Result<()>
where
    Fut: Future<Output = Result<()>> + Send,
{
    let outcome = match AssertUnwindSafe(producer).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(panic) => Err(FeedError::fault(panic_message(panic.as_ref()))),
    };
    match &outcome {
        Ok(()) => tracing::debug!(source = %kind, "producer finished"),
        Err(err) => {
            tracing::warn!(source = %kind, error = %err, "producer failed");
            if let Some(sink) = on_error {
                sink(err);
            }
        }
    }
    outcome
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "producer panicked".to_string()
    }
}
