//! Companion stdout decoding.
//!
//! The driver prints one JSON object per inbound message and free-form
//! diagnostics (QR codes, "ready" notices) on everything else. Only lines that
//! start with `{` are candidates; the rest is noise.

use log::{debug, info, warn};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use replybot_protocol::InboundEvent;

/// A candidate line that was not a valid event.
#[derive(Debug, Error)]
#[error("invalid event line {line:?}: {source}")]
pub struct DecodeError {
    pub line: String,
    #[source]
    pub source: serde_json::Error,
}

/// What a single stdout line turned out to be.
#[derive(Debug)]
pub enum CompanionLine {
    Event(InboundEvent),
    Malformed(DecodeError),
    Noise,
}

/// Classify one line of driver output.
pub fn classify_line(line: &str) -> CompanionLine {
    let trimmed = line.trim();
    if !trimmed.starts_with('{') {
        return CompanionLine::Noise;
    }
    match serde_json::from_str::<InboundEvent>(trimmed) {
        Ok(event) => CompanionLine::Event(event),
        Err(source) => CompanionLine::Malformed(DecodeError {
            line: trimmed.to_string(),
            source,
        }),
    }
}

/// Item delivered by an [`EventStream`].
pub type StreamItem = Result<InboundEvent, DecodeError>;

/// Result of one poll of an event source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourcePoll {
    /// An allow-listed event.
    Event(InboundEvent),
    /// Nothing actionable arrived within the wait.
    Idle,
    /// The source is gone and will never produce again.
    Closed,
}

/// Only the configured conversation partner gets through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowList {
    target: String,
}

impl AllowList {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn permits(&self, sender_id: &str) -> bool {
        sender_id == self.target
    }
}

/// Typed channel of decoded events fed by a line reader task.
///
/// Lazy and non-restartable: it closes when the underlying reader hits EOF
/// and never reopens.
pub struct EventStream {
    rx: mpsc::Receiver<StreamItem>,
    reader: JoinHandle<()>,
}

impl EventStream {
    /// Start reading lines from `reader` in a background task.
    pub fn spawn<R>(reader: R, buffer: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let reader = tokio::spawn(Self::reader_task(reader, tx));
        Self { rx, reader }
    }

    /// Next decoded item, or `None` once the stream is closed.
    pub async fn next(&mut self) -> Option<StreamItem> {
        self.rx.recv().await
    }

    /// Wait up to `wait` for one item and filter it through `allow`.
    ///
    /// Decode failures and foreign senders are logged and reported as
    /// [`SourcePoll::Idle`].
    pub async fn poll(&mut self, allow: &AllowList, wait: Duration) -> SourcePoll {
        match tokio::time::timeout(wait, self.rx.recv()).await {
            Err(_) => SourcePoll::Idle,
            Ok(None) => SourcePoll::Closed,
            Ok(Some(Err(e))) => {
                warn!("Error decoding message: {}", e);
                SourcePoll::Idle
            }
            Ok(Some(Ok(event))) => {
                if allow.permits(&event.sender_id) {
                    SourcePoll::Event(event)
                } else {
                    info!(
                        "Ignoring message from {} - not the target",
                        event.sender_id
                    );
                    SourcePoll::Idle
                }
            }
        }
    }

    async fn reader_task<R>(reader: R, tx: mpsc::Sender<StreamItem>)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!("Failed to read companion output: {:?}", e);
                    break;
                }
            }

            let line = String::from_utf8_lossy(&buf);
            if line.trim().is_empty() {
                continue;
            }
            let display_line: String = line.trim_end().chars().take(200).collect();

            let item = match classify_line(&line) {
                CompanionLine::Noise => {
                    debug!("companion: {}", display_line);
                    continue;
                }
                CompanionLine::Event(event) => Ok(event),
                CompanionLine::Malformed(e) => Err(e),
            };
            if tx.send(item).await.is_err() {
                break;
            }
        }
        debug!("Companion stdout reader task ended");
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
