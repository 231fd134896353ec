//! `glob` tool (spec §6 glob semantics): anchored full-path matching via
//! `globset`, whose glob syntax already matches the spec's `*`/`?`/`**`
//! semantics. Walks the sandbox root with `ignore::WalkBuilder`, the same
//! symlink-safe enumerator used by the skills resolver.

use async_trait::async_trait;
use globset::Glob;
use serde::Deserialize;
use serde_json::Value;
use serde_json::json;

use super::Tool;
use super::ToolContext;
use super::ToolOutput;

const MAX_RESULTS: usize = 1000;

#[derive(Debug, Deserialize)]
struct GlobInput {
    pattern: String,
    #[serde(default)]
    path: Option<String>,
}

#[derive(Default)]
pub struct GlobTool;

#[async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &str {
        "glob"
    }

    fn description(&self) -> &str {
        "Find files under the sandbox whose path matches an anchored glob pattern."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {"type": "string"},
                "path": {"type": "string"}
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolOutput {
        let input: GlobInput = match serde_json::from_value(input) {
            Ok(v) => v,
            Err(e) => return ToolOutput::Text(format!("Error: invalid glob input: {e}")),
        };

        let base = match &input.path {
            Some(p) => match ctx.sandbox.resolve(p) {
                Ok(p) => p,
                Err(e) => return ToolOutput::Text(format!("Security error: {e}")),
            },
            None => ctx.sandbox.working_dir().to_path_buf(),
        };

        let matcher = match Glob::new(&input.pattern) {
            Ok(g) => g.compile_matcher(),
            Err(e) => return ToolOutput::Text(format!("Error: invalid glob pattern: {e}")),
        };

        let base_for_walk = base.clone();
        let pattern = input.pattern.clone();
        let matched = tokio::task::spawn_blocking(move || {
            let mut out = Vec::new();
            for entry in ignore::WalkBuilder::new(&base_for_walk).hidden(false).build() {
                let Ok(entry) = entry else { continue };
                if !entry.file_type().is_some_and(|t| t.is_file()) {
                    continue;
                }
                let Ok(relative) = entry.path().strip_prefix(&base_for_walk) else {
                    continue;
                };
                if matcher.is_match(relative) {
                    out.push(relative.to_string_lossy().to_string());
                }
                if out.len() >= MAX_RESULTS {
                    break;
                }
            }
            out.sort();
            let _ = &pattern;
            out
        })
        .await;

        match matched {
            Ok(paths) => ToolOutput::Structured(json!({ "paths": paths })),
            Err(e) => ToolOutput::Text(format!("Error: glob walk failed: {e}")),
        }
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
    async fn matches_nested_rust_files() {
        let tmp = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(tmp.path().join("src/inner")).expect("mkdir");
        std::fs::write(tmp.path().join("src/inner/a.rs"), "").expect("write a");
        std::fs::write(tmp.path().join("src/b.txt"), "").expect("write b");
        let ctx = ctx_in(&tmp).await;
        let tool = GlobTool::default();
        let output = tool.execute(json!({"pattern": "**/*.rs"}), &ctx).await;
        match output {
            ToolOutput::Structured(v) => {
                let paths = v["paths"].as_array().expect("paths array");
                assert_eq!(paths.len(), 1);
                assert!(paths[0].as_str().expect("str").ends_with("a.rs"));
            }
            ToolOutput::Text(t) => panic!("expected structured output, got {t}"),
        }
    }
}
