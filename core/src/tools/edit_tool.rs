//! `edit` tool: thin adapter over [`crate::edit::apply_edit`].

use async_trait::async_trait;
use serde_json::Value;
use serde_json::json;

use crate::edit::EditRequest;
use crate::edit::apply_edit;
use crate::error::tool_failure_text;
use crate::error::RuntimeError;

use super::Tool;
use super::ToolContext;
use super::ToolOutput;

#[derive(Default)]
pub struct EditTool;

#[async_trait]
impl Tool for EditTool {
    fn name(&self) -> &str {
        "edit"
    }

    fn description(&self) -> &str {
        "Replace text in a sandboxed file using exact, line-trimmed, or block-anchor matching."
    }

    fn is_write_sensitive(&self) -> bool {
        true
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {"type": "string"},
                "old_string": {"type": "string"},
                "new_string": {"type": "string"},
                "replace_all": {"type": "boolean"},
                "match_mode": {"type": "string", "enum": ["exact", "line_trimmed", "block_anchor", "auto"]},
                "expected_replacements": {"type": "integer"},
                "dry_run": {"type": "boolean"},
                "expected_hash": {"type": "string"}
            },
            "required": ["file_path", "old_string", "new_string"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolOutput {
        let req: EditRequest = match serde_json::from_value(input) {
            Ok(v) => v,
            Err(e) => return ToolOutput::Text(format!("Error: invalid edit input: {e}")),
        };

        match apply_edit(&ctx.sandbox, req).await {
            Ok(result) => ToolOutput::Structured(json!({
                "summary": result.summary,
                "replacements": result.replacements,
                "match_mode": result.match_mode,
                "diff": result.diff,
            })),
            Err(e) => ToolOutput::Text(tool_failure_text(&RuntimeError::from(e))),
        }
    }
}
