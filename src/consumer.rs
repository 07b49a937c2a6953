//! Drains the record channel into a writer.

use anyhow::Context;
use logtap_core::Record;
use logtap_feeds::LogReader;
use std::future::Future;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

/// Why [`pump`] stopped reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The reader closed the channel.
    EndOfStream,
    /// The shutdown future fired.
    Shutdown,
    /// Nobody is reading our output any more.
    OutputClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub records: u64,
    pub reason: StopReason,
}

/// Write every record from `rx` to `out`, one per line, until the stream
/// ends or `shutdown` resolves. The reader is always closed before
/// returning; a producer failure is returned as the error.
pub async fn pump<W, S>(
    reader: Box<dyn LogReader>,
    mut rx: mpsc::Receiver<Record>,
    mut out: W,
    shutdown: S,
) -> anyhow::Result<Summary>
where
    W: AsyncWrite + Unpin,
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let kind = reader.kind();
    let mut records = 0u64;
    let reason = loop {
        let record = tokio::select! {
            _ = &mut shutdown => break StopReason::Shutdown,
            record = rx.recv() => record,
        };
        let Some(record) = record else {
            break StopReason::EndOfStream;
        };
        match write_record(&mut out, &record).await {
            Ok(()) => records += 1,
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => break StopReason::OutputClosed,
            Err(e) => {
                // still close the reader before surfacing the write error
                let _ = reader.close().await;
                return Err(e).context("writing record");
            }
        }
    };
    tracing::debug!(source = %kind, records, reason = ?reason, "consumer stopping");

    // unblock a producer waiting on a full channel before joining it
    drop(rx);
    reader
        .close()
        .await
        .with_context(|| format!("{kind} reader failed"))?;
    Ok(Summary { records, reason })
}

async fn write_record<W: AsyncWrite + Unpin>(out: &mut W, record: &Record) -> std::io::Result<()> {
    out.write_all(record.as_str().as_bytes()).await?;
    out.write_all(b"\n").await?;
    out.flush().await
}
