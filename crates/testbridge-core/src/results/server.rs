//! Local socket the unittest launcher streams results to.
//!
//! The launcher connects to `127.0.0.1:<port>` and writes one JSON object
//! per line, `{"event": "<name>", "body": {...}}`. Decoded events are
//! delivered in arrival order through [`ResultServer::next_event`].

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, warn};

/// Result server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to start result server: {0}")]
    Bind(#[from] std::io::Error),
}

/// One result reported by the launcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResultData {
    pub test: String,
    pub outcome: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub traceback: String,
}

/// Events observed on the result socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "body", rename_all = "lowercase")]
pub enum ServerEvent {
    /// A launcher connected. Emitted by the server itself on accept.
    Connect,
    Start,
    Result(TestResultData),
    Log {
        message: String,
        #[serde(default)]
        data: Vec<String>,
    },
    Error {
        message: String,
        #[serde(default)]
        data: Vec<String>,
    },
}

/// A listening result socket.
///
/// The listener and every connection reader stop when the server is
/// stopped or dropped.
#[derive(Debug)]
pub struct ResultServer {
    port: u16,
    events: mpsc::UnboundedReceiver<ServerEvent>,
    accept_task: JoinHandle<()>,
}

impl ResultServer {
    /// Binds an ephemeral local port and starts accepting.
    pub async fn start() -> Result<Self, ServerError> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
        let port = listener.local_addr()?.port();
        let (tx, events) = mpsc::unbounded_channel();
        let accept_task = tokio::spawn(accept_connections(listener, tx));
        debug!(port, "Result server listening");

        Ok(Self {
            port,
            events,
            accept_task,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The next decoded event, or `None` once stopped.
    pub async fn next_event(&mut self) -> Option<ServerEvent> {
        self.events.recv().await
    }

    pub fn stop(&mut self) {
        self.accept_task.abort();
        self.events.close();
        debug!(port = self.port, "Result server stopped");
    }
}

impl Drop for ResultServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn accept_connections(listener: TcpListener, tx: mpsc::UnboundedSender<ServerEvent>) {
    // Readers are aborted with this set when the accept task is aborted.
    let mut readers = JoinSet::new();
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!(%peer, "Result connection accepted");
                if tx.send(ServerEvent::Connect).is_err() {
                    break;
                }
                readers.spawn(read_events(stream, tx.clone()));
            }
            Err(e) => {
                warn!(error = %e, "Failed to accept result connection");
                break;
            }
        }
    }
}

async fn read_events(stream: TcpStream, tx: mpsc::UnboundedSender<ServerEvent>) {
    let mut lines = BufReader::new(stream).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Result connection failed");
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<ServerEvent>(line) {
            Ok(event) => {
                if tx.send(event).is_err() {
                    break;
                }
            }
            Err(e) => warn!(error = %e, line, "Skipping malformed result event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn test_event_wire_format() {
        let event: ServerEvent = serde_json::from_str(
            r#"{"event": "result", "body": {"test": "test_math.MathTest.test_add", "outcome": "failed", "message": "boom", "traceback": "tb"}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            ServerEvent::Result(TestResultData {
                test: "test_math.MathTest.test_add".to_string(),
                outcome: "failed".to_string(),
                message: "boom".to_string(),
                traceback: "tb".to_string(),
            })
        );

        let start: ServerEvent = serde_json::from_str(r#"{"event": "start"}"#).unwrap();
        assert_eq!(start, ServerEvent::Start);

        let log: ServerEvent =
            serde_json::from_str(r#"{"event": "log", "body": {"message": "hi"}}"#).unwrap();
        assert_eq!(
            log,
            ServerEvent::Log {
                message: "hi".to_string(),
                data: vec![]
            }
        );
    }

    #[tokio::test]
    async fn test_streams_events_in_order_and_skips_garbage() {
        let mut server = ResultServer::start().await.unwrap();
        let mut stream = TcpStream::connect((Ipv4Addr::LOCALHOST, server.port()))
            .await
            .unwrap();
        stream
            .write_all(
                b"{\"event\": \"start\"}\nnot json\n\n{\"event\": \"result\", \"body\": {\"test\": \"a.b\", \"outcome\": \"passed\"}}\n",
            )
            .await
            .unwrap();

        assert_eq!(server.next_event().await, Some(ServerEvent::Connect));
        assert_eq!(server.next_event().await, Some(ServerEvent::Start));
        match server.next_event().await {
            Some(ServerEvent::Result(data)) => {
                assert_eq!(data.test, "a.b");
                assert_eq!(data.outcome, "passed");
                assert!(data.message.is_empty());
            }
            other => panic!("unexpected event: {other:?}"),
        }

        server.stop();
        assert_eq!(server.next_event().await, None);
    }
}
