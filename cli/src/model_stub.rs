//! Placeholder [`ChatModel`]. Model-provider HTTP clients are explicitly out
//! of scope for this runtime (spec §1: "the model-provider HTTP clients
//! themselves ... treated as a generic chat model interface"); this is the
//! seam a real provider plugs into. Until one is wired up, every run fails
//! fast with a clear `ProviderError` instead of silently hanging.

use async_trait::async_trait;
use codelia_core::chat_model::ChatDelta;
use codelia_core::chat_model::ChatModel;
use codelia_core::chat_model::ChatModelError;
use codelia_core::chat_model::ChatRequest;
use codelia_core::chat_model::ChatTurn;
use tokio_util::sync::CancellationToken;

pub struct NullChatModel {
    model_id: String,
}

impl NullChatModel {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
        }
    }
}

#[async_trait]
impl ChatModel for NullChatModel {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn run_turn(
        &self,
        _request: ChatRequest,
        _on_delta: &(dyn Fn(ChatDelta) + Send + Sync),
        _cancel: &CancellationToken,
    ) -> Result<ChatTurn, ChatModelError> {
        Err(ChatModelError::Provider(
            "no chat model provider configured; plug a concrete ChatModel in at startup".to_string(),
        ))
    }
}
