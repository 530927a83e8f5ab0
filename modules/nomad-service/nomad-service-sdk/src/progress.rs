//! Progress reporting for long-running operations
//!
//! Handlers write human-readable lines into a [`ProgressSink`]. A streaming
//! sink forwards them to the HTTP response body as they are produced; a
//! log-only sink (used when nobody is listening, e.g. SNS deliveries) sends
//! them to tracing instead.

use std::fmt::Display;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

/// One unit of a progress stream. `Err` ends the stream abnormally.
pub type ProgressChunk = Result<Bytes, StreamAborted>;

/// Marker error that terminates a progress stream without the final chunk,
/// so clients observe a failed transfer.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{operation} failed")]
pub struct StreamAborted {
    /// Name of the operation that failed.
    pub operation: String,
}

/// Destination for progress lines of a single request.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    operation: Arc<str>,
    tx: Option<mpsc::Sender<ProgressChunk>>,
}

impl ProgressSink {
    /// Create a streaming sink and the receiving half feeding the response body.
    #[must_use]
    pub fn channel(operation: &str, capacity: usize) -> (Self, mpsc::Receiver<ProgressChunk>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                operation: Arc::from(operation),
                tx: Some(tx),
            },
            rx,
        )
    }

    /// Create a sink that only logs.
    #[must_use]
    pub fn log_only(operation: &str) -> Self {
        Self {
            operation: Arc::from(operation),
            tx: None,
        }
    }

    /// Emit a chunk of progress output. Callers include the trailing newline.
    ///
    /// A closed stream (client went away) is not an error: the operation keeps
    /// running and only its output is lost.
    pub async fn line(&self, text: impl Into<Bytes>) {
        let chunk: Bytes = text.into();
        match &self.tx {
            Some(tx) => {
                tracing::debug!(
                    operation = %self.operation,
                    "{}",
                    String::from_utf8_lossy(&chunk).trim_end()
                );
                if tx.send(Ok(chunk)).await.is_err() {
                    tracing::trace!(operation = %self.operation, "Client disconnected, output dropped");
                }
            }
            None => {
                let text = String::from_utf8_lossy(&chunk);
                let text = text.trim();
                if !text.is_empty() {
                    tracing::info!(operation = %self.operation, "{text}");
                }
            }
        }
    }

    /// Emit a terminal `ERROR:` line and end the stream abnormally.
    pub async fn fail(&self, message: impl Display) {
        let text = format!("ERROR: {message}\n");
        match &self.tx {
            Some(tx) => {
                tracing::debug!(operation = %self.operation, "{}", text.trim_end());
                if tx.send(Ok(Bytes::from(text))).await.is_ok() {
                    _ = tx
                        .send(Err(StreamAborted {
                            operation: self.operation.to_string(),
                        }))
                        .await;
                }
            }
            None => {
                tracing::error!(operation = %self.operation, "{}", text.trim_end());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lines_reach_receiver_in_order() {
        let (sink, mut rx) = ProgressSink::channel("deploy", 8);
        sink.line("first\n").await;
        sink.line(Bytes::from_static(b"second\n")).await;
        drop(sink);

        let mut collected = Vec::new();
        while let Some(chunk) = rx.recv().await {
            collected.push(chunk.unwrap());
        }
        assert_eq!(collected, vec![Bytes::from("first\n"), Bytes::from("second\n")]);
    }

    #[tokio::test]
    async fn fail_writes_error_line_then_aborts() {
        let (sink, mut rx) = ProgressSink::channel("deploy", 8);
        sink.fail("Setting new version failed.").await;
        drop(sink);

        let first = rx.recv().await.unwrap().unwrap();
        assert_eq!(first, Bytes::from("ERROR: Setting new version failed.\n"));
        let second = rx.recv().await.unwrap();
        assert!(second.is_err());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn closed_receiver_does_not_block_writer() {
        let (sink, rx) = ProgressSink::channel("reload", 1);
        drop(rx);
        sink.line("ignored\n").await;
        sink.fail("still fine").await;
    }

    #[tokio::test]
    async fn log_only_sink_accepts_output() {
        let sink = ProgressSink::log_only("autoscaling");
        sink.line("Draining node\n").await;
        sink.fail("Draining node failed").await;
    }
}
