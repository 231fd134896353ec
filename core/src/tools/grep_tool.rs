//! `grep` tool: content search across sandboxed files. Large result sets
//! are offloaded to the tool-output cache the same way bash output is
//! (spec §4.8), so the agent can page through matches with `ref=<id>`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use serde_json::json;

use super::Tool;
use super::ToolContext;
use super::ToolOutput;

const MAX_FILES: usize = 5000;
const MAX_INLINE_BYTES: usize = 10 * 1024;

#[derive(Debug, Deserialize)]
struct GrepInput {
    pattern: String,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    regex: bool,
    #[serde(default)]
    before: usize,
    #[serde(default)]
    after: usize,
    #[serde(default)]
    max_matches: Option<usize>,
}

#[derive(Default)]
pub struct GrepTool;

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        "grep"
    }

    fn description(&self) -> &str {
        "Search file contents under the sandbox for a literal or regex pattern."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {"type": "string"},
                "path": {"type": "string"},
                "regex": {"type": "boolean"},
                "before": {"type": "integer"},
                "after": {"type": "integer"},
                "max_matches": {"type": "integer"}
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolOutput {
        let input: GrepInput = match serde_json::from_value(input) {
            Ok(v) => v,
            Err(e) => return ToolOutput::Text(format!("Error: invalid grep input: {e}")),
        };

        let base = match &input.path {
            Some(p) => match ctx.sandbox.resolve(p) {
                Ok(p) => p,
                Err(e) => return ToolOutput::Text(format!("Security error: {e}")),
            },
            None => ctx.sandbox.working_dir().to_path_buf(),
        };

        let matcher = if input.regex {
            match regex::Regex::new(&input.pattern) {
                Ok(re) => Some(re),
                Err(e) => return ToolOutput::Text(format!("Error: invalid regex: {e}")),
            }
        } else {
            None
        };

        let base_for_walk = base.clone();
        let pattern = input.pattern.clone();
        let before = input.before;
        let after = input.after;
        let max_matches = input.max_matches;

        let report = tokio::task::spawn_blocking(move || {
            let mut report = String::new();
            let mut match_count = 0usize;
            let mut files_seen = 0usize;

            'walk: for entry in ignore::WalkBuilder::new(&base_for_walk).hidden(false).build() {
                let Ok(entry) = entry else { continue };
                if !entry.file_type().is_some_and(|t| t.is_file()) {
                    continue;
                }
                files_seen += 1;
                if files_seen > MAX_FILES {
                    break;
                }

                let Ok(contents) = std::fs::read_to_string(entry.path()) else {
                    continue;
                };
                let lines: Vec<&str> = contents.lines().collect();
                let relative = entry
                    .path()
                    .strip_prefix(&base_for_walk)
                    .unwrap_or(entry.path())
                    .to_string_lossy()
                    .to_string();

                for (idx, line) in lines.iter().enumerate() {
                    let is_match = match &matcher {
                        Some(re) => re.is_match(line),
                        None => line.contains(&pattern),
                    };
                    if !is_match {
                        continue;
                    }

                    let start = idx.saturating_sub(before);
                    let end = (idx + after + 1).min(lines.len());
                    report.push_str(&format!("{relative}:{}\n", idx + 1));
                    for context_line in &lines[start..end] {
                        report.push_str(context_line);
                        report.push('\n');
                    }
                    report.push('\n');

                    match_count += 1;
                    if let Some(max) = max_matches
                        && match_count >= max
                    {
                        break 'walk;
                    }
                }
            }
            report
        })
        .await;

        let report = match report {
            Ok(r) => r,
            Err(e) => return ToolOutput::Text(format!("Error: grep walk failed: {e}")),
        };

        if report.is_empty() {
            return ToolOutput::Structured(json!({ "matches": "", "ref": Value::Null }));
        }

        if report.len() <= MAX_INLINE_BYTES {
            return ToolOutput::Structured(json!({ "matches": report, "ref": Value::Null }));
        }

        let ref_id = ctx.cache.store(&report).await;
        let truncated: String = report.chars().take(MAX_INLINE_BYTES).collect();
        ToolOutput::Structured(json!({ "matches": truncated, "ref": ref_id }))
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
    async fn finds_literal_matches_with_context() {
        let tmp = tempfile::tempdir().expect("tempdir");
        std::fs::write(tmp.path().join("a.txt"), "one\ntwo needle\nthree\n").expect("write");
        let ctx = ctx_in(&tmp).await;
        let tool = GrepTool::default();
        let output = tool
            .execute(json!({"pattern": "needle", "before": 1, "after": 1}), &ctx)
            .await;
        match output {
            ToolOutput::Structured(v) => {
                let matches = v["matches"].as_str().expect("matches string");
                assert!(matches.contains("two needle"));
                assert!(matches.contains("one"));
                assert!(matches.contains("three"));
            }
            ToolOutput::Text(t) => panic!("expected structured output, got {t}"),
        }
    }

    #[tokio::test]
    async fn no_matches_yields_empty_report() {
        let tmp = tempfile::tempdir().expect("tempdir");
        std::fs::write(tmp.path().join("a.txt"), "nothing here\n").expect("write");
        let ctx = ctx_in(&tmp).await;
        let tool = GrepTool::default();
        let output = tool.execute(json!({"pattern": "absent"}), &ctx).await;
        match output {
            ToolOutput::Structured(v) => assert_eq!(v["matches"], ""),
            ToolOutput::Text(t) => panic!("expected structured output, got {t}"),
        }
    }
}
