//! Concrete [`UiChannel`] wired to the `ui.confirm` runtime→client request
//! (spec §6). Keeps the agent loop decoupled from the RPC transport; this is
//! the one piece of glue between them.

use std::sync::Arc;

use async_trait::async_trait;
use codelia_core::agent_loop::RememberScope;
use codelia_core::agent_loop::UiChannel;
use codelia_core::agent_loop::UiConfirmRequest;
use codelia_core::agent_loop::UiConfirmResponse;
use serde_json::json;

use crate::outgoing::OutgoingSender;

pub struct RpcUiChannel {
    outgoing: Arc<OutgoingSender>,
}

impl RpcUiChannel {
    pub fn new(outgoing: Arc<OutgoingSender>) -> Self {
        Self { outgoing }
    }
}

#[async_trait]
impl UiChannel for RpcUiChannel {
    async fn confirm(&self, request: UiConfirmRequest) -> UiConfirmResponse {
        let rx = self
            .outgoing
            .send_request(
                "ui.confirm",
                json!({
                    "run_id": request.run_id,
                    "tool": request.tool,
                    "summary": request.summary,
                    "diff": request.diff,
                }),
            )
            .await;

        // A dropped channel (client disconnected mid-confirm) defaults to a
        // denial rather than leaving the tool call hanging indefinitely.
        let Ok(value) = rx.await else {
            return UiConfirmResponse {
                approved: false,
                remember: None,
            };
        };

        let approved = value.get("approved").and_then(|v| v.as_bool()).unwrap_or(false);
        let remember = match value.get("remember").and_then(|v| v.as_str()) {
            Some("session") => Some(RememberScope::Session),
            Some("project") => Some(RememberScope::Project),
            _ => None,
        };
        UiConfirmResponse { approved, remember }
    }
}
