//! Generic "chat model" abstraction (spec §1: "the model-provider HTTP
//! clients themselves ... treated as a generic chat model interface").
//! Nothing in this module talks to a network; it is the seam a concrete
//! provider client plugs into from outside this crate.

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { url: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub parts: Vec<ContentPart>,
    /// Set on `Role::Tool` messages: the `tool_call_id` this message answers.
    #[serde(default)]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![ContentPart::Text { text: text.into() }],
            tool_call_id: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            parts: vec![ContentPart::Text { text: text.into() }],
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// One requested tool invocation in a model's response batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub tool_call_id: String,
    pub tool: String,
    pub raw_args: String,
    pub args: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    /// `{name, description, input_schema}` JSON, as produced by
    /// [`crate::tools::ToolRegistry::schemas`].
    pub tool_schemas: Vec<Value>,
}

/// Incremental output emitted while a turn is still in flight.
#[derive(Debug, Clone)]
pub enum ChatDelta {
    Text(String),
    Reasoning(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageDelta {
    pub input: u64,
    pub cached_input: u64,
    pub cache_creation: u64,
    pub output: u64,
    pub total: u64,
}

impl UsageDelta {
    pub fn accumulate(&mut self, other: &UsageDelta) {
        self.input += other.input;
        self.cached_input += other.cached_input;
        self.cache_creation += other.cache_creation;
        self.output += other.output;
        self.total += other.total;
    }
}

/// The settled result of one model turn: either the assistant is done
/// talking, or it wants to call tools.
#[derive(Debug, Clone)]
pub enum Completion {
    Text(String),
    ToolCalls(Vec<ToolCallRequest>),
}

#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub completion: Completion,
    pub usage: UsageDelta,
    /// Remaining context window as a percentage, when the provider reports
    /// it; drives the compaction threshold check (spec §4.4).
    pub context_left_percent: Option<u8>,
}

#[derive(Debug, Error)]
pub enum ChatModelError {
    #[error("model call cancelled")]
    Cancelled,
    #[error("model call failed: {0}")]
    Provider(String),
}

/// Implemented by whatever sits between the runtime and an actual provider.
/// `on_delta` is invoked synchronously for every streamed chunk so the
/// caller can translate it into `AgentEvent::Text` / `AgentEvent::Reasoning`
/// without this trait depending on the event types directly.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_id(&self) -> &str;

    async fn run_turn(
        &self,
        request: ChatRequest,
        on_delta: &(dyn Fn(ChatDelta) + Send + Sync),
        cancel: &CancellationToken,
    ) -> Result<ChatTurn, ChatModelError>;
}
