//! In-memory [`LoggingApi`] with scripted history and a controllable tail.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use logtap_core::{FeedError, Result};
use logtap_feeds::remote::{
    EntryPage, ListEntriesRequest, LoggingApi, TailRequest, TailResponse, TailSession,
};
use regex::Regex;
use serde_json::Value;
use std::sync::{Arc, LazyLock, Mutex};
use tokio::sync::mpsc;

static BOUND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"timestamp > "([^"]+)""#).expect("bound pattern"));

/// One scripted message on the tail stream.
pub enum TailEvent {
    Batch(Vec<Value>),
    Fail(String),
}

fn entry_time(entry: &Value) -> Option<DateTime<FixedOffset>> {
    entry
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
}

/// Answer a list request from `history` the way the backend would: entries
/// strictly after the filter's bound, oldest first, paged by offset tokens.
pub fn page_of(history: &[Value], filter: &str, page_size: u32, page_token: Option<&str>) -> EntryPage {
    let bound = BOUND
        .captures(filter)
        .and_then(|c| DateTime::parse_from_rfc3339(&c[1]).ok());
    let mut matching: Vec<&Value> = history
        .iter()
        .filter(|e| match (bound, entry_time(e)) {
            (Some(bound), Some(at)) => at > bound,
            (None, _) => true,
            (Some(_), None) => false,
        })
        .collect();
    matching.sort_by_key(|e| entry_time(e));

    let offset: usize = page_token.and_then(|t| t.parse().ok()).unwrap_or(0);
    let size = page_size.max(1) as usize;
    let end = (offset + size).min(matching.len());
    let entries = matching
        .get(offset..end)
        .unwrap_or_default()
        .iter()
        .map(|e| (*e).clone())
        .collect();
    EntryPage {
        entries,
        next_page_token: (end < matching.len()).then(|| end.to_string()),
    }
}

#[derive(Default)]
struct State {
    history: Vec<Value>,
    list_requests: Vec<ListEntriesRequest>,
    tail_requests: Vec<TailRequest>,
    probes: usize,
    tail_opens: usize,
    tail_batches_taken: usize,
    probe_error: Option<String>,
    connect_error: Option<String>,
    list_error: Option<String>,
    panic_on_list: bool,
    tail_rx: Option<mpsc::UnboundedReceiver<TailEvent>>,
}

#[derive(Clone)]
pub struct FakeLoggingApi {
    state: Arc<Mutex<State>>,
    tail_tx: Arc<Mutex<Option<mpsc::UnboundedSender<TailEvent>>>>,
}

impl FakeLoggingApi {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = State {
            tail_rx: Some(rx),
            ..State::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            tail_tx: Arc::new(Mutex::new(Some(tx))),
        }
    }

    pub fn with_history(entries: impl IntoIterator<Item = Value>) -> Self {
        let api = Self::new();
        api.add_history(entries);
        api
    }

    pub fn add_history(&self, entries: impl IntoIterator<Item = Value>) {
        self.state.lock().unwrap().history.extend(entries);
    }

    pub fn deny_probe(&self, message: &str) {
        self.state.lock().unwrap().probe_error = Some(message.to_string());
    }

    pub fn allow_probe(&self) {
        self.state.lock().unwrap().probe_error = None;
    }

    pub fn fail_connect(&self, message: &str) {
        self.state.lock().unwrap().connect_error = Some(message.to_string());
    }

    pub fn fail_list(&self, message: &str) {
        self.state.lock().unwrap().list_error = Some(message.to_string());
    }

    pub fn panic_on_list(&self) {
        self.state.lock().unwrap().panic_on_list = true;
    }

    pub fn push_tail(&self, entries: Vec<Value>) {
        if let Some(tx) = self.tail_tx.lock().unwrap().as_ref() {
            let _ = tx.send(TailEvent::Batch(entries));
        }
    }

    pub fn fail_tail(&self, message: &str) {
        if let Some(tx) = self.tail_tx.lock().unwrap().as_ref() {
            let _ = tx.send(TailEvent::Fail(message.to_string()));
        }
    }

    /// End the tail stream cleanly, as a server closing it would.
    pub fn end_tail(&self) {
        self.tail_tx.lock().unwrap().take();
    }

    pub fn list_requests(&self) -> Vec<ListEntriesRequest> {
        self.state.lock().unwrap().list_requests.clone()
    }

    pub fn tail_requests(&self) -> Vec<TailRequest> {
        self.state.lock().unwrap().tail_requests.clone()
    }

    pub fn probes(&self) -> usize {
        self.state.lock().unwrap().probes
    }

    pub fn tail_opens(&self) -> usize {
        self.state.lock().unwrap().tail_opens
    }

    pub fn tail_batches_taken(&self) -> usize {
        self.state.lock().unwrap().tail_batches_taken
    }
}

#[async_trait]
impl LoggingApi for FakeLoggingApi {
    async fn connect(&self, _resource: &str) -> Result<()> {
        match &self.state.lock().unwrap().connect_error {
            Some(message) => Err(FeedError::transport("connect", message)),
            None => Ok(()),
        }
    }

    async fn list_logs(&self, resource: &str, _page_size: u32) -> Result<Vec<String>> {
        let mut state = self.state.lock().unwrap();
        state.probes += 1;
        match &state.probe_error {
            Some(message) => Err(FeedError::access(message)),
            None => Ok(vec![format!("{resource}/logs/app")]),
        }
    }

    async fn list_entries(&self, request: &ListEntriesRequest) -> Result<EntryPage> {
        let (should_panic, outcome) = {
            let mut state = self.state.lock().unwrap();
            state.list_requests.push(request.clone());
            let outcome = match &state.list_error {
                Some(message) => Err(FeedError::transport("list entries", message)),
                None => Ok(page_of(
                    &state.history,
                    &request.filter,
                    request.page_size,
                    request.page_token.as_deref(),
                )),
            };
            (state.panic_on_list, outcome)
        };
        if should_panic {
            panic!("fake backend blew up");
        }
        outcome
    }

    async fn tail_entries(&self) -> Result<Box<dyn TailSession>> {
        let mut state = self.state.lock().unwrap();
        let Some(rx) = state.tail_rx.take() else {
            return Err(FeedError::transport("tail", "tail already opened"));
        };
        state.tail_opens += 1;
        Ok(Box::new(FakeTailSession {
            rx,
            state: self.state.clone(),
        }))
    }
}

struct FakeTailSession {
    rx: mpsc::UnboundedReceiver<TailEvent>,
    state: Arc<Mutex<State>>,
}

#[async_trait]
impl TailSession for FakeTailSession {
    async fn send(&mut self, request: TailRequest) -> Result<()> {
        self.state.lock().unwrap().tail_requests.push(request);
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<TailResponse>> {
        let event = self.rx.recv().await;
        self.state.lock().unwrap().tail_batches_taken += 1;
        match event {
            Some(TailEvent::Batch(entries)) => Ok(Some(TailResponse {
                entries,
                suppression_info: Vec::new(),
            })),
            Some(TailEvent::Fail(message)) => Err(FeedError::transport("tail recv", message)),
            None => Ok(None),
        }
    }
}
