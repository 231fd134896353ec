//! `read` tool: reads a sandboxed file, optionally by line range.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use serde_json::json;

use super::Tool;
use super::ToolContext;
use super::ToolOutput;

#[derive(Debug, Deserialize)]
struct ReadInput {
    file_path: String,
    #[serde(default)]
    offset: Option<usize>,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Default)]
pub struct ReadTool;

#[async_trait]
impl Tool for ReadTool {
    fn name(&self) -> &str {
        "read"
    }

    fn description(&self) -> &str {
        "Read a file under the sandbox, optionally by 0-based line offset and limit."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {"type": "string"},
                "offset": {"type": "integer"},
                "limit": {"type": "integer"}
            },
            "required": ["file_path"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolOutput {
        let input: ReadInput = match serde_json::from_value(input) {
            Ok(v) => v,
            Err(e) => return ToolOutput::Text(format!("Error: invalid read input: {e}")),
        };

        let path = match ctx.sandbox.resolve(&input.file_path) {
            Ok(p) => p,
            Err(e) => return ToolOutput::Text(format!("Security error: {e}")),
        };

        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) => return ToolOutput::Text(format!("Error: {e}")),
        };

        let lines: Vec<&str> = contents.lines().collect();
        let offset = input.offset.unwrap_or(0);
        let end = match input.limit {
            Some(limit) => (offset + limit).min(lines.len()),
            None => lines.len(),
        };
        let slice = if offset >= lines.len() {
            String::new()
        } else {
            lines[offset..end].join("\n")
        };

        ToolOutput::Structured(json!({
            "content": slice,
            "total_lines": lines.len(),
        }))
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
    async fn reads_a_line_range() {
        let tmp = tempfile::tempdir().expect("tempdir");
        std::fs::write(tmp.path().join("f.txt"), "a\nb\nc\nd\n").expect("write fixture");
        let ctx = ctx_in(&tmp).await;
        let tool = ReadTool::default();
        let output = tool
            .execute(json!({"file_path": "f.txt", "offset": 1, "limit": 2}), &ctx)
            .await;
        match output {
            ToolOutput::Structured(v) => {
                assert_eq!(v["content"], "b\nc");
                assert_eq!(v["total_lines"], 4);
            }
            ToolOutput::Text(t) => panic!("expected structured output, got {t}"),
        }
    }

    #[tokio::test]
    async fn rejects_paths_outside_the_sandbox() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let ctx = ctx_in(&tmp).await;
        let tool = ReadTool::default();
        let output = tool.execute(json!({"file_path": "../outside.txt"}), &ctx).await;
        match output {
            ToolOutput::Text(t) => assert!(t.starts_with("Security error:")),
            ToolOutput::Structured(_) => panic!("expected a security error"),
        }
    }
}
