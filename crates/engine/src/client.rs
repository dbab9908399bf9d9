//! WebSocket push-channel client.
//!
//! [`PushClient`] holds the connection configuration; call
//! [`PushClient::subscribe`] to open a per-task [`TaskSubscription`]
//! that yields typed [`TaskUpdate`]s. Frames that fail to parse are
//! logged and skipped so that a noisy channel never stops the monitor's
//! poll fallback.

use futures::StreamExt;
use pixelgraph_core::types::TaskId;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::messages::{parse_update, TaskUpdate};

/// Errors from the push-channel client.
#[derive(Debug, thiserror::Error)]
pub enum PushClientError {
    /// Failed to establish the WebSocket connection.
    #[error("connection error: {0}")]
    Connection(String),
}

/// Configuration handle for the engine's push channel.
#[derive(Debug, Clone)]
pub struct PushClient {
    ws_url: String,
}

impl PushClient {
    /// Create a client targeting the engine's WebSocket endpoint.
    ///
    /// * `ws_url` - WebSocket base URL, e.g. `ws://host:8080`.
    pub fn new(ws_url: String) -> Self {
        Self { ws_url }
    }

    /// WebSocket base URL.
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Subscribe to updates for one task.
    ///
    /// Generates a unique `clientId` (UUID v4) and appends it as a query
    /// parameter so the engine can address frames back to this
    /// subscriber.
    pub async fn subscribe(&self, task_id: TaskId) -> Result<TaskSubscription, PushClientError> {
        let client_id = uuid::Uuid::new_v4().to_string();
        let url = format!("{}/ws/task/{}?clientId={}", self.ws_url, task_id, client_id);

        let (ws_stream, _response) = connect_async(&url).await.map_err(|e| {
            PushClientError::Connection(format!(
                "failed to connect to push channel at {}: {e}",
                self.ws_url
            ))
        })?;

        tracing::info!(task_id, client_id = %client_id, "Subscribed to push channel");

        Ok(TaskSubscription { task_id, ws_stream })
    }
}

/// A live push subscription for one task.
pub struct TaskSubscription {
    task_id: TaskId,
    ws_stream: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
}

impl TaskSubscription {
    /// Next parseable update, or `None` once the channel closes.
    ///
    /// Binary frames and pings are skipped; malformed text frames are
    /// logged and skipped.
    pub async fn next_update(&mut self) -> Option<TaskUpdate> {
        while let Some(frame) = self.ws_stream.next().await {
            match frame {
                Ok(Message::Text(text)) => match parse_update(&text) {
                    Ok(update) => return Some(update),
                    Err(e) => {
                        tracing::warn!(
                            task_id = self.task_id,
                            error = %e,
                            raw_message = %text,
                            "Discarding malformed push message",
                        );
                    }
                },
                Ok(Message::Binary(_)) => {
                    tracing::trace!(task_id = self.task_id, "Ignoring binary frame");
                }
                Ok(Message::Ping(_) | Message::Pong(_)) => {
                    // Handled automatically by tungstenite.
                }
                Ok(Message::Close(frame)) => {
                    tracing::info!(task_id = self.task_id, ?frame, "Push channel closed");
                    return None;
                }
                Ok(Message::Frame(_)) => {}
                Err(e) => {
                    tracing::error!(task_id = self.task_id, error = %e, "Push channel receive error");
                    return None;
                }
            }
        }
        None
    }
}
