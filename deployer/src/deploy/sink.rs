//! Live log of a deployment session
//!
//! Every chunk goes two ways: into a bounded in-memory buffer kept with the
//! session, and down a channel read by the HTTP response writer. The channel
//! side is best-effort; once the reader is gone chunks are only retained.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

/// Chunks retained per session
pub const LOG_RETENTION: usize = 600;

/// Channel capacity between a session and its response body
pub const STREAM_BUFFER: usize = 256;

#[derive(Debug, Clone)]
pub struct LogSink {
    tx: mpsc::Sender<String>,
    retained: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl LogSink {
    /// Create a sink and the receiving end of its stream
    pub fn channel(buffer: usize, capacity: usize) -> (LogSink, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let sink = LogSink {
            tx,
            retained: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(64)))),
            capacity: capacity.max(1),
        };
        (sink, rx)
    }

    /// Emit a raw chunk
    pub async fn emit(&self, chunk: impl Into<String>) {
        let chunk = chunk.into();
        {
            let mut retained = self.retained.lock().unwrap_or_else(|e| e.into_inner());
            if retained.len() == self.capacity {
                retained.pop_front();
            }
            retained.push_back(chunk.clone());
        }
        // A closed receiver means the client left; the session notices
        // through its cancellation token, not here.
        let _ = self.tx.send(chunk).await;
    }

    /// Emit one line, newline appended
    pub async fn line(&self, line: impl AsRef<str>) {
        self.emit(format!("{}\n", line.as_ref())).await;
    }

    /// Retained chunks, oldest first
    pub fn snapshot(&self) -> Vec<String> {
        let retained = self.retained.lock().unwrap_or_else(|e| e.into_inner());
        retained.iter().cloned().collect()
    }

    /// Resolves once the stream reader has been dropped
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
