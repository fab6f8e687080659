//! JSON-RPC connection over a pair of byte streams.
//!
//! Requests are matched to responses by id. A background task reads the
//! server's output line by line and completes the matching waiter; lines
//! that are not JSON-RPC (servers sometimes log to stdout) are skipped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex as AsyncMutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::protocol::{
    Incoming, JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    METHOD_NOT_FOUND, parse_incoming,
};

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
type SharedWriter = Arc<AsyncMutex<Option<BoxedWriter>>>;
type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

#[derive(Debug, Error)]
pub enum McpError {
    #[error("JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("request '{method}' timed out after {limit:?}")]
    Timeout { method: String, limit: Duration },

    #[error("connection closed")]
    Closed,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected response to '{method}': {reason}")]
    Protocol { method: String, reason: String },
}

impl From<JsonRpcError> for McpError {
    fn from(e: JsonRpcError) -> Self {
        McpError::Rpc {
            code: e.code,
            message: e.message,
        }
    }
}

/// A live JSON-RPC session with one MCP server.
pub struct McpConnection {
    name: String,
    writer: SharedWriter,
    pending: PendingMap,
    next_id: AtomicU64,
    request_timeout: Duration,
    reader_task: Mutex<Option<JoinHandle<()>>>,
}

impl McpConnection {
    /// Start a session over `reader` (server output) and `writer` (server input).
    pub fn new<R, W>(name: impl Into<String>, reader: R, writer: W, request_timeout: Duration) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let name = name.into();
        let writer: SharedWriter = Arc::new(AsyncMutex::new(Some(Box::new(writer))));
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        let task = tokio::spawn(read_loop(
            name.clone(),
            BufReader::new(reader),
            pending.clone(),
            writer.clone(),
        ));

        Self {
            name,
            writer,
            pending,
            next_id: AtomicU64::new(1),
            request_timeout,
            reader_task: Mutex::new(Some(task)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Send a request and wait for its response.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        // Register before sending so a fast reply cannot race the insert.
        self.lock_pending().insert(id, tx);

        let message = serde_json::to_value(JsonRpcRequest::new(id, method, params))
            .map_err(|e| McpError::Transport(e.to_string()))?;
        if let Err(e) = write_line(&self.writer, &message).await {
            self.lock_pending().remove(&id);
            return Err(e);
        }

        trace!(server = %self.name, id, method, "Request sent");

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => match response.error {
                Some(err) => Err(err.into()),
                None => Ok(response.result.unwrap_or(Value::Null)),
            },
            Ok(Err(_)) => Err(McpError::Closed),
            Err(_) => {
                self.lock_pending().remove(&id);
                Err(McpError::Timeout {
                    method: method.to_string(),
                    limit: self.request_timeout,
                })
            }
        }
    }

    /// Send a notification (no response expected).
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        let message = serde_json::to_value(JsonRpcNotification::new(method, params))
            .map_err(|e| McpError::Transport(e.to_string()))?;
        write_line(&self.writer, &message).await
    }

    /// Close the server's input and stop reading its output.
    ///
    /// Outstanding requests fail with [`McpError::Closed`].
    pub async fn shutdown(&self) {
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        if let Some(task) = self.reader_task.lock().unwrap_or_else(|p| p.into_inner()).take() {
            task.abort();
        }
        self.lock_pending().clear();
    }

    fn lock_pending(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<u64, oneshot::Sender<JsonRpcResponse>>> {
        self.pending.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Drop for McpConnection {
    fn drop(&mut self) {
        if let Some(task) = self.reader_task.lock().unwrap_or_else(|p| p.into_inner()).take() {
            task.abort();
        }
    }
}

async fn write_line(writer: &SharedWriter, message: &Value) -> Result<(), McpError> {
    let mut line = serde_json::to_vec(message).map_err(|e| McpError::Transport(e.to_string()))?;
    line.push(b'\n');

    let mut guard = writer.lock().await;
    let w = guard.as_mut().ok_or(McpError::Closed)?;
    w.write_all(&line)
        .await
        .map_err(|e| McpError::Transport(e.to_string()))?;
    w.flush().await.map_err(|e| McpError::Transport(e.to_string()))
}

async fn read_loop<R>(name: String, reader: BufReader<R>, pending: PendingMap, writer: SharedWriter)
where
    R: AsyncRead + Unpin,
{
    let mut lines = reader.lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!(server = %name, "Server output closed");
                break;
            }
            Err(e) => {
                warn!(server = %name, error = %e, "Failed reading server output");
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match parse_incoming(line) {
            Ok(Incoming::Response(response)) => {
                let waiter = response
                    .id
                    .as_u64()
                    .and_then(|id| pending.lock().unwrap_or_else(|p| p.into_inner()).remove(&id));
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(response);
                    }
                    None => warn!(server = %name, id = %response.id, "Response for unknown request"),
                }
            }
            Ok(Incoming::Request { id, method }) => {
                // The server may ping us; everything else is unsupported.
                let reply = if method == "ping" {
                    serde_json::json!({ "jsonrpc": "2.0", "id": id, "result": {} })
                } else {
                    debug!(server = %name, method = %method, "Rejecting server request");
                    serde_json::json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "error": { "code": METHOD_NOT_FOUND, "message": format!("method not supported: {method}") }
                    })
                };
                if let Err(e) = write_line(&writer, &reply).await {
                    debug!(server = %name, error = %e, "Could not answer server request");
                }
            }
            Ok(Incoming::Notification { method }) => {
                debug!(server = %name, method = %method, "Server notification");
            }
            Err(_) => {
                trace!(server = %name, line = %line, "Ignoring non JSON-RPC output");
            }
        }
    }

    // Dropping the senders wakes every waiter with `Closed`.
    pending.lock().unwrap_or_else(|p| p.into_inner()).clear();
}
