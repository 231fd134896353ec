//! Outgoing half of the RPC channel: responses/notifications to requests
//! already received, plus runtime→client requests (`ui.*`) that need a
//! correlated reply. Grounded on `mcp-server/src/outgoing_message.rs`'s
//! `OutgoingMessageSender` (`AtomicI64`-keyed pending-request map, one
//! `oneshot` per outstanding request, removed on every exit path).

use std::collections::HashMap;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;

use mcp_types::JSONRPC_VERSION;
use mcp_types::JSONRPCError;
use mcp_types::JSONRPCErrorError;
use mcp_types::JSONRPCMessage;
use mcp_types::JSONRPCNotification;
use mcp_types::JSONRPCRequest;
use mcp_types::JSONRPCResponse;
use mcp_types::RequestId;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tracing::warn;

pub struct OutgoingSender {
    next_request_id: AtomicI64,
    sender: mpsc::Sender<JSONRPCMessage>,
    pending: Mutex<HashMap<RequestId, oneshot::Sender<Value>>>,
}

impl OutgoingSender {
    pub fn new(sender: mpsc::Sender<JSONRPCMessage>) -> Self {
        Self {
            next_request_id: AtomicI64::new(0),
            sender,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Sends a runtime→client request (e.g. `ui.confirm`) and returns a
    /// receiver that resolves once `resolve_pending` is called for its id.
    pub async fn send_request(&self, method: &str, params: Value) -> oneshot::Receiver<Value> {
        let id = RequestId::Integer(self.next_request_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);

        let msg = JSONRPCMessage::Request(JSONRPCRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.to_string(),
            params: Some(params),
        });
        let _ = self.sender.send(msg).await;
        rx
    }

    /// Resolves a pending `send_request` call with the client's response.
    pub async fn resolve_pending(&self, id: RequestId, result: Value) {
        let entry = self.pending.lock().await.remove(&id);
        match entry {
            Some(tx) => {
                if tx.send(result).is_err() {
                    warn!("no one was waiting on response {id}");
                }
            }
            None => warn!("no pending request for response id {id}"),
        }
    }

    pub async fn send_response(&self, id: RequestId, result: Value) {
        let msg = JSONRPCMessage::Response(JSONRPCResponse {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result,
        });
        let _ = self.sender.send(msg).await;
    }

    pub async fn send_error(&self, id: RequestId, code: i64, message: impl Into<String>) {
        let msg = JSONRPCMessage::Error(JSONRPCError {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            error: JSONRPCErrorError {
                code,
                message: message.into(),
                data: None,
            },
        });
        let _ = self.sender.send(msg).await;
    }

    pub async fn send_notification(&self, method: &str, params: Value) {
        let msg = JSONRPCMessage::Notification(JSONRPCNotification {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.to_string(),
            params: Some(params),
        });
        let _ = self.sender.send(msg).await;
    }
}
