//! Remote logging API reader.
//!
//! With a `Since` range the reader first replays history in pages, oldest
//! first, moving a watermark forward on each entry's own timestamp and
//! re-querying from it until a round finds nothing new. It then opens a live
//! tail exactly once. A `Tail` range goes straight to tailing.
//!
//! ```text
//! Idle ──stream_into──► Historical ──exhausted──► Tail ──► Finished
//!   └──────────── range = tail ────────────────────┘
//! ```

pub mod api;
pub mod cursor;
pub mod framing;
pub mod http;

pub use api::{project_resource, EntryPage, ListEntriesRequest, LoggingApi, TailRequest, TailResponse, TailSession};
pub use cursor::HistoryCursor;
pub use http::HttpLoggingApi;

use crate::reader::{ErrorSink, ReaderCore, RecordSink};
use crate::LogReader;
use async_trait::async_trait;
use logtap_core::{normalize_entry, RawEntry, Record, Result, SourceKind, TimeRange, Watermark};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Where the remote reader is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    Idle,
    Historical,
    Tail,
    Finished,
}

pub struct RemoteReader {
    core: ReaderCore,
    api: Arc<dyn LoggingApi>,
    project: String,
    filter: Option<String>,
    range: TimeRange,
    page_size: u32,
    mode: Arc<watch::Sender<StreamMode>>,
}

impl RemoteReader {
    pub fn new(
        api: Arc<dyn LoggingApi>,
        project: impl Into<String>,
        filter: Option<String>,
        range: TimeRange,
        tx: mpsc::Sender<Record>,
    ) -> Self {
        let (mode, _) = watch::channel(StreamMode::Idle);
        Self {
            core: ReaderCore::new(SourceKind::RemoteApi, tx),
            api,
            project: project.into(),
            filter: filter.filter(|f| !f.trim().is_empty()),
            range,
            page_size: DEFAULT_PAGE_SIZE,
            mode: Arc::new(mode),
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Observe mode changes.
    pub fn mode(&self) -> watch::Receiver<StreamMode> {
        self.mode.subscribe()
    }
}

#[async_trait]
impl LogReader for RemoteReader {
    fn kind(&self) -> SourceKind {
        SourceKind::RemoteApi
    }

    fn on_error(&mut self, sink: ErrorSink) {
        self.core.set_error_sink(sink);
    }

    async fn stream_into(&mut self) -> Result<()> {
        self.api.connect(&project_resource(&self.project)).await?;
        tracing::info!(
            project = %self.project,
            range = %self.range,
            filter = ?self.filter,
            "remote reader starting"
        );
        let session = Session {
            api: self.api.clone(),
            resource: project_resource(&self.project),
            filter: self.filter.clone(),
            range: self.range,
            page_size: self.page_size,
            mode: self.mode.clone(),
        };
        self.core.start(move |sink| session.run(sink))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.core.close().await
    }
}

/// Marks the stream finished however the producer exits.
struct FinishOnDrop(Arc<watch::Sender<StreamMode>>);

impl Drop for FinishOnDrop {
    fn drop(&mut self) {
        self.0.send_replace(StreamMode::Finished);
    }
}

struct Session {
    api: Arc<dyn LoggingApi>,
    resource: String,
    filter: Option<String>,
    range: TimeRange,
    page_size: u32,
    mode: Arc<watch::Sender<StreamMode>>,
}

impl Session {
    async fn run(self, sink: RecordSink) -> Result<()> {
        let _finish = FinishOnDrop(self.mode.clone());
        if let Some(start) = self.range.watermark() {
            self.mode.send_replace(StreamMode::Historical);
            if !self.replay(start, &sink).await? {
                return Ok(());
            }
        }
        self.mode.send_replace(StreamMode::Tail);
        self.tail(&sink).await
    }

    /// Page through history until a round adds nothing. False if stopped.
    async fn replay(&self, start: Watermark, sink: &RecordSink) -> Result<bool> {
        let mut cursor = HistoryCursor::new(start, self.filter.clone());
        while let Some(filter) = cursor.next_filter() {
            tracing::debug!(filter = %filter, "historical query");
            let mut page_token = None;
            loop {
                if sink.is_stopped() {
                    return Ok(false);
                }
                let request = ListEntriesRequest {
                    resource_names: vec![self.resource.clone()],
                    filter: filter.clone(),
                    order_by: api::ORDER_BY_TIMESTAMP_ASC.to_string(),
                    page_size: self.page_size,
                    page_token: page_token.take(),
                };
                let page = self.api.list_entries(&request).await?;
                let next = page.next_token().map(str::to_string);
                tracing::trace!(entries = page.entries.len(), more = next.is_some(), "historical page");
                for entry in page.entries {
                    let normalized = normalize_entry(&RawEntry::from_value(entry));
                    if !sink.deliver(normalized.record).await {
                        return Ok(false);
                    }
                    if let Some(at) = normalized.entry_time {
                        cursor.observe(at);
                    }
                }
                match next {
                    Some(token) => page_token = Some(token),
                    None => break,
                }
            }
        }
        tracing::info!(watermark = %cursor.watermark().to_rfc3339(), "history exhausted, switching to tail");
        Ok(true)
    }

    async fn tail(&self, sink: &RecordSink) -> Result<()> {
        if sink.is_stopped() {
            return Ok(());
        }
        let mut session = self.api.tail_entries().await?;
        session
            .send(TailRequest {
                resource_names: vec![self.resource.clone()],
                filter: self.filter.clone().unwrap_or_default(),
            })
            .await?;
        tracing::info!(resource = %self.resource, "tail session open");

        let outcome = self.pump(session.as_mut(), sink).await;
        if let Err(e) = session.close_send().await {
            tracing::debug!(error = %e, "tail close_send failed");
        }
        outcome
    }

    async fn pump(&self, session: &mut dyn TailSession, sink: &RecordSink) -> Result<()> {
        loop {
            let batch = tokio::select! {
                biased;
                _ = sink.stopped() => return Ok(()),
                batch = session.recv() => batch?,
            };
            let Some(batch) = batch else {
                tracing::info!("tail stream ended by server");
                return Ok(());
            };
            if !batch.suppression_info.is_empty() {
                tracing::debug!(info = ?batch.suppression_info, "tail entries suppressed");
            }
            if !deliver_all(batch.entries, sink).await {
                return Ok(());
            }
        }
    }
}

async fn deliver_all(entries: Vec<Value>, sink: &RecordSink) -> bool {
    for entry in entries {
        let normalized = normalize_entry(&RawEntry::from_value(entry));
        if !sink.deliver(normalized.record).await {
            return false;
        }
    }
    true
}
