//! `todo` tool: does nothing useful on its own, it just gives the model a
//! structured way to record its plan so a client can render it. Progress
//! narration rides on `AgentEvent::Text` instead of a side channel, so there
//! is no `explanation` field here, only the step/status list.

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;

use super::Tool;
use super::ToolContext;
use super::ToolOutput;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoItem {
    pub step: String,
    pub status: StepStatus,
}

#[derive(Debug, Deserialize)]
struct TodoInput {
    todos: Vec<TodoItem>,
}

#[derive(Default)]
pub struct TodoTool;

#[async_trait]
impl Tool for TodoTool {
    fn name(&self) -> &str {
        "todo"
    }

    fn description(&self) -> &str {
        "Record the current step-by-step plan so the client can render it. \
Call it again whenever a step completes or the plan changes; exactly one \
step should be in_progress until everything is completed."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "todos": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "step": {"type": "string"},
                            "status": {"type": "string", "enum": ["pending", "in_progress", "completed"]}
                        },
                        "required": ["step", "status"]
                    }
                }
            },
            "required": ["todos"]
        })
    }

    async fn execute(&self, input: Value, _ctx: &ToolContext) -> ToolOutput {
        let input: TodoInput = match serde_json::from_value(input) {
            Ok(v) => v,
            Err(e) => return ToolOutput::Text(format!("Error: invalid todo input: {e}")),
        };
        ToolOutput::Structured(json!({ "todos": input.todos, "accepted": true }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp_manager::McpConnectionManager;
    use crate::sandbox::Sandbox;
    use crate::skills::SkillsCatalog;
    use crate::tool_output_cache::ToolOutputCache;
    use crate::tool_output_cache::ToolOutputCacheConfig;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    async fn ctx_in(tmp: &tempfile::TempDir) -> ToolContext {
        let sandbox = Sandbox::new(tmp.path().to_path_buf(), tmp.path().to_path_buf()).expect("sandbox");
        let skills = SkillsCatalog::build(tmp.path(), tmp.path(), None).await.expect("skills");
        ToolContext {
            sandbox: Arc::new(sandbox),
            cache: Arc::new(ToolOutputCache::new(ToolOutputCacheConfig::default())),
            cancel: CancellationToken::new(),
            mcp: Arc::new(McpConnectionManager::default()),
            skills: Arc::new(tokio::sync::Mutex::new(skills)),
        }
    }

    #[tokio::test]
    async fn accepts_a_well_formed_plan() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let ctx = ctx_in(&tmp).await;
        let tool = TodoTool::default();
        let output = tool
            .execute(
                json!({"todos": [{"step": "explore", "status": "in_progress"}]}),
                &ctx,
            )
            .await;
        assert!(!output.is_error());
    }
}
