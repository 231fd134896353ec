//! `write` tool: creates or overwrites a sandboxed file atomically.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use serde_json::json;

use crate::storage::atomic_write;

use super::Tool;
use super::ToolContext;
use super::ToolOutput;

#[derive(Debug, Deserialize)]
struct WriteInput {
    file_path: String,
    content: String,
}

#[derive(Default)]
pub struct WriteTool;

#[async_trait]
impl Tool for WriteTool {
    fn name(&self) -> &str {
        "write"
    }

    fn description(&self) -> &str {
        "Create or overwrite a file under the sandbox."
    }

    fn is_write_sensitive(&self) -> bool {
        true
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {"type": "string"},
                "content": {"type": "string"}
            },
            "required": ["file_path", "content"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolOutput {
        let input: WriteInput = match serde_json::from_value(input) {
            Ok(v) => v,
            Err(e) => return ToolOutput::Text(format!("Error: invalid write input: {e}")),
        };

        let path = match ctx.sandbox.resolve(&input.file_path) {
            Ok(p) => p,
            Err(e) => return ToolOutput::Text(format!("Security error: {e}")),
        };

        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return ToolOutput::Text(format!("Error: {e}"));
            }
        }

        match atomic_write(&path, input.content.as_bytes()).await {
            Ok(()) => ToolOutput::Structured(json!({
                "file_path": input.file_path,
                "bytes_written": input.content.len(),
            })),
            Err(e) => ToolOutput::Text(format!("Error: {e}")),
        }
    }
}
