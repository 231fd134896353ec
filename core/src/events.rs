//! `AgentEvent` and `RunStatus` (spec §3). A tagged sum type, matched
//! exhaustively at every consumer (spec §9: "string-discriminated tagged
//! objects -> explicit sum types"), with JSON codecs derived rather than
//! hand-written.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Running,
    AwaitingUi,
    Completed,
    Error,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    Text {
        content: String,
    },
    Reasoning {
        content: String,
    },
    ToolCall {
        tool: String,
        args: Value,
        tool_call_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        raw_args: Option<String>,
    },
    ToolResult {
        tool: String,
        result: Value,
        tool_call_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
    #[serde(rename = "permission.preview")]
    PermissionPreview {
        tool: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_path: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        diff: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        truncated: Option<bool>,
    },
    #[serde(rename = "permission.ready")]
    PermissionReady {
        tool: String,
    },
    StepStart,
    StepComplete {
        status: String,
        duration_ms: u64,
    },
    CompactionStart,
    CompactionComplete {
        compacted: bool,
    },
    HiddenUserMessage {
        content: String,
    },
    Final {
        content: String,
    },
}

impl AgentEvent {
    pub fn is_final(&self) -> bool {
        matches!(self, AgentEvent::Final { .. })
    }

    pub fn tool_call_id(&self) -> Option<&str> {
        match self {
            AgentEvent::ToolCall { tool_call_id, .. } => Some(tool_call_id),
            AgentEvent::ToolResult { tool_call_id, .. } => Some(tool_call_id),
            _ => None,
        }
    }
}

/// Validates the ordering invariant (spec §3): every `tool_result` is
/// preceded by a `tool_call` with the same id, and `final` (if present) is
/// last. Used by tests and by the session-replay reader's sanity checks.
pub fn validate_ordering(events: &[AgentEvent]) -> Result<(), String> {
    let mut open_calls: std::collections::HashSet<&str> = std::collections::HashSet::new();
    for (idx, event) in events.iter().enumerate() {
        match event {
            AgentEvent::ToolCall { tool_call_id, .. } => {
                open_calls.insert(tool_call_id);
            }
            AgentEvent::ToolResult { tool_call_id, .. } => {
                if !open_calls.remove(tool_call_id.as_str()) {
                    return Err(format!(
                        "tool_result for {tool_call_id} at index {idx} has no preceding tool_call"
                    ));
                }
            }
            AgentEvent::Final { .. } => {
                if idx != events.len() - 1 {
                    return Err("final event is not last".to_string());
                }
            }
            _ => {}
        }
    }
    Ok(())
}
