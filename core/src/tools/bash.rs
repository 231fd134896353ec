//! `bash` tool. Grounded on `exec.rs`'s spawn/stream/timeout/kill shape,
//! simplified to the generic (non-sandbox-escalated) execution path: the
//! runtime's own [`crate::sandbox::Sandbox`] and
//! [`crate::permissions::PermissionEngine`] do the confinement spec §4.1/4.5
//! call for, rather than the teacher's OS-level seatbelt/seccomp sandbox
//! (out of scope here -- see SPEC_FULL.md's non-goals).

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use serde_json::json;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use super::Tool;
use super::ToolContext;
use super::ToolOutput;

const DEFAULT_TIMEOUT_MS: u64 = 10_000;
const MAX_INLINE_OUTPUT_BYTES: usize = 10 * 1024;

#[derive(Debug, Deserialize)]
struct BashInput {
    command: String,
    #[serde(default)]
    cwd: Option<String>,
    #[serde(default)]
    timeout_ms: Option<u64>,
}

#[derive(Default)]
pub struct BashTool;

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Run a shell command under the sandbox working directory."
    }

    fn is_write_sensitive(&self) -> bool {
        true
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {"type": "string"},
                "cwd": {"type": "string"},
                "timeout_ms": {"type": "integer"}
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolOutput {
        let input: BashInput = match serde_json::from_value(input) {
            Ok(v) => v,
            Err(e) => return ToolOutput::Text(format!("Error: invalid bash input: {e}")),
        };

        let cwd = match &input.cwd {
            Some(c) => match ctx.sandbox.resolve(c) {
                Ok(p) => p,
                Err(e) => return ToolOutput::Text(format!("Security error: {e}")),
            },
            None => ctx.sandbox.working_dir().to_path_buf(),
        };

        let timeout = Duration::from_millis(input.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS));

        let mut child = match Command::new("bash")
            .arg("-lc")
            .arg(&input.command)
            .current_dir(&cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(c) => c,
            Err(e) => return ToolOutput::Text(format!("Error: failed to spawn command: {e}")),
        };

        let Some(mut stdout) = child.stdout.take() else {
            let _ = child.start_kill();
            return ToolOutput::Text("Error: child process stdout was not piped".to_string());
        };
        let Some(mut stderr) = child.stderr.take() else {
            let _ = child.start_kill();
            return ToolOutput::Text("Error: child process stderr was not piped".to_string());
        };

        let run = async {
            let mut out_buf = Vec::new();
            let mut err_buf = Vec::new();
            let (_, _, status) = tokio::join!(
                stdout.read_to_end(&mut out_buf),
                stderr.read_to_end(&mut err_buf),
                child.wait(),
            );
            (out_buf, err_buf, status)
        };

        let result = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => {
                let _ = child.start_kill();
                return ToolOutput::Text("Error: cancelled".to_string());
            }
            res = tokio::time::timeout(timeout, run) => res,
        };

        let (out_buf, err_buf, status) = match result {
            Ok(v) => v,
            Err(_) => {
                let _ = child.start_kill();
                return ToolOutput::Text("Error: command timed out".to_string());
            }
        };

        let status = match status {
            Ok(s) => s,
            Err(e) => return ToolOutput::Text(format!("Error: failed to wait for command: {e}")),
        };

        let stdout_text = String::from_utf8_lossy(&out_buf).to_string();
        let stderr_text = String::from_utf8_lossy(&err_buf).to_string();

        let (stdout_field, stdout_ref) = offload_if_large(&stdout_text, ctx).await;
        let (stderr_field, stderr_ref) = offload_if_large(&stderr_text, ctx).await;

        ToolOutput::Structured(json!({
            "exit_code": status.code(),
            "stdout": stdout_field,
            "stderr": stderr_field,
            "stdout_ref": stdout_ref,
            "stderr_ref": stderr_ref,
        }))
    }
}

/// Tool output exceeding a threshold is off-loaded to the tool-output cache
/// and replaced inline by a `ref=<id>` marker (spec §4.4 step 4d).
async fn offload_if_large(text: &str, ctx: &ToolContext) -> (String, Option<String>) {
    if text.len() <= MAX_INLINE_OUTPUT_BYTES {
        return (text.to_string(), None);
    }
    let ref_id = ctx.cache.store(text).await;
    let truncated: String = text.chars().take(MAX_INLINE_OUTPUT_BYTES).collect();
    (truncated, Some(format!("ref={ref_id}")))
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
    async fn runs_simple_command_and_captures_stdout() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let ctx = ctx_in(&tmp).await;
        let tool = BashTool::default();
        let output = tool
            .execute(json!({"command": "echo hi"}), &ctx)
            .await;
        match output {
            ToolOutput::Structured(v) => {
                assert_eq!(v["stdout"], "hi\n");
                assert_eq!(v["exit_code"], 0);
            }
            ToolOutput::Text(t) => panic!("expected structured output, got {t}"),
        }
    }

    #[tokio::test]
    async fn cancellation_stops_the_command() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let ctx = ctx_in(&tmp).await;
        ctx.cancel.cancel();
        let tool = BashTool::default();
        let output = tool.execute(json!({"command": "sleep 5"}), &ctx).await;
        match output {
            ToolOutput::Text(t) => assert!(t.contains("cancelled")),
            ToolOutput::Structured(_) => panic!("expected a cancellation error"),
        }
    }
}
