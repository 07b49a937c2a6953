//! Standard-input feed reader. Reads until end of input.

use crate::reader::{ErrorSink, ReaderCore};
use crate::LogReader;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use logtap_core::{normalize_line, FeedError, Record, Result, SourceKind};
use std::io::Read;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio_util::io::StreamReader;

const CHUNK: usize = 8 * 1024;

type BoxedInput = Box<dyn AsyncRead + Send + Unpin>;

enum Input {
    /// The process's stdin, opened by `stream_into`.
    Process,
    Stream(BoxedInput),
}

pub struct StdinReader {
    core: ReaderCore,
    input: Option<Input>,
}

impl StdinReader {
    pub fn new(tx: mpsc::Sender<Record>) -> Self {
        Self {
            core: ReaderCore::new(SourceKind::Stdin, tx),
            input: Some(Input::Process),
        }
    }

    /// Read from any byte stream instead of the process's stdin.
    pub fn from_input(input: impl AsyncRead + Send + Unpin + 'static, tx: mpsc::Sender<Record>) -> Self {
        Self {
            core: ReaderCore::new(SourceKind::Stdin, tx),
            input: Some(Input::Stream(Box::new(input))),
        }
    }
}

/// Reads stdin on its own OS thread and hands chunks to the runtime.
///
/// A read parked on tokio's blocking pool cannot be abandoned and holds up
/// runtime shutdown until input ends; a detached thread does not. The thread
/// exits at end of input or on its next read after the reader is gone.
fn spawn_stdin_thread() -> std::io::Result<BoxedInput> {
    let (tx, mut rx) = mpsc::channel::<std::io::Result<Bytes>>(1);
    std::thread::Builder::new()
        .name("logtap-stdin".into())
        .spawn(move || {
            let mut stdin = std::io::stdin().lock();
            let mut buf = vec![0u8; CHUNK];
            loop {
                let chunk = match stdin.read(&mut buf) {
                    Ok(0) => return,
                    Ok(n) => Ok(Bytes::copy_from_slice(&buf[..n])),
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => Err(e),
                };
                let last = chunk.is_err();
                if tx.blocking_send(chunk).is_err() || last {
                    return;
                }
            }
        })?;
    let chunks = futures::stream::poll_fn(move |cx| rx.poll_recv(cx));
    Ok(Box::new(StreamReader::new(chunks)))
}

#[async_trait]
impl LogReader for StdinReader {
    fn kind(&self) -> SourceKind {
        SourceKind::Stdin
    }

    fn on_error(&mut self, sink: ErrorSink) {
        self.core.set_error_sink(sink);
    }

    async fn stream_into(&mut self) -> Result<()> {
        let input = match self.input.take() {
            None => return Err(FeedError::transport("stream_into", "stdin reader was already started")),
            Some(Input::Process) => {
                spawn_stdin_thread().map_err(|e| FeedError::transport("start stdin thread", e))?
            }
            Some(Input::Stream(input)) => input,
        };
        self.core.start(move |sink| async move {
            let mut input = BufReader::new(input);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                let read = tokio::select! {
                    biased;
                    _ = sink.stopped() => return Ok(()),
                    read = input.read_until(b'\n', &mut buf) => read,
                };
                match read {
                    Ok(0) => {
                        tracing::debug!("stdin reached end of input");
                        return Ok(());
                    }
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buf);
                        if !sink.deliver(normalize_line(&line, Utc::now())).await {
                            return Ok(());
                        }
                    }
                    Err(e) => return Err(FeedError::transport("read stdin", e)),
                }
            }
        })
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.core.close().await
    }
}
