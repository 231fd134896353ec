//! Shared pending-request bookkeeping for both transports.
//!
//! Grounded on `codex-mcp-server`'s `OutgoingMessageSender` (an
//! `AtomicI64`-keyed `id -> oneshot::Sender` map), generalized so a single
//! call site (`wait_for`) owns removing the entry on *every* exit path —
//! completion, timeout, or cancellation — which is the fix for the
//! "stdio abort listener" leak the design notes call out: a pending entry
//! must never outlive the call that registered it.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use mcp_types::RequestId;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::McpClientError;
use crate::error::Result;

type ReplySender = oneshot::Sender<std::result::Result<Value, McpClientError>>;

pub(crate) struct PendingRequests {
    next_id: AtomicI64,
    inner: Mutex<HashMap<RequestId, ReplySender>>,
}

impl PendingRequests {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn next_id(&self) -> RequestId {
        RequestId::Integer(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    #[allow(clippy::unwrap_used)]
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<RequestId, ReplySender>> {
        // A poisoned lock means a prior holder panicked mid-mutation; there is
        // no partial state worth preserving so we just keep going with
        // whatever is left rather than poisoning every future call too.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn register(&self, id: RequestId) -> oneshot::Receiver<std::result::Result<Value, McpClientError>> {
        let (tx, rx) = oneshot::channel();
        self.lock().insert(id, tx);
        rx
    }

    /// Deliver a response (or RPC error) for `id`, if anyone is still
    /// waiting on it. Returns `false` when the id is unknown (late or
    /// duplicate reply).
    pub(crate) fn complete(&self, id: &RequestId, result: std::result::Result<Value, McpClientError>) -> bool {
        let sender = self.lock().remove(id);
        match sender {
            Some(tx) => {
                let _ = tx.send(result);
                true
            }
            None => false,
        }
    }

    /// Fail every outstanding request, e.g. because the transport died.
    pub(crate) fn fail_all(&self, make_err: impl Fn() -> McpClientError) {
        let mut map = self.lock();
        for (_, tx) in map.drain() {
            let _ = tx.send(Err(make_err()));
        }
    }

    fn forget(&self, id: &RequestId) {
        self.lock().remove(id);
    }

    /// Wait for the response to `id`, racing the per-call timeout and the
    /// caller's cancellation token. The pending-map entry is guaranteed to be
    /// gone by the time this returns, on every branch.
    pub(crate) async fn wait_for(
        &self,
        id: RequestId,
        timeout: Duration,
        cancel: Option<&CancellationToken>,
    ) -> Result<Value> {
        let rx = self.register(id.clone());

        let outcome = match cancel {
            Some(cancel) => {
                tokio::select! {
                    res = tokio::time::timeout(timeout, rx) => Outcome::Replied(res),
                    _ = cancel.cancelled() => Outcome::Cancelled,
                }
            }
            None => Outcome::Replied(tokio::time::timeout(timeout, rx).await),
        };

        match outcome {
            Outcome::Replied(Ok(Ok(Ok(value)))) => Ok(value),
            Outcome::Replied(Ok(Ok(Err(err)))) => Err(err),
            Outcome::Replied(Ok(Err(_recv_closed))) => {
                self.forget(&id);
                Err(McpClientError::ServerExited(id))
            }
            Outcome::Replied(Err(_elapsed)) => {
                self.forget(&id);
                Err(McpClientError::Timeout(id, timeout))
            }
            Outcome::Cancelled => {
                self.forget(&id);
                Err(McpClientError::Aborted)
            }
        }
    }
}

enum Outcome {
    Replied(std::result::Result<std::result::Result<std::result::Result<Value, McpClientError>, oneshot::error::RecvError>, tokio::time::error::Elapsed>),
    Cancelled,
}
