//! `skill_search` / `skill_load` tools: thin adapters over
//! [`crate::skills::SkillsCatalog`] (spec §4.7).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use serde_json::json;

use crate::skills::SkillLoadResult;

use super::Tool;
use super::ToolContext;
use super::ToolOutput;

#[derive(Debug, Deserialize)]
struct SkillSearchInput {
    query: String,
}

#[derive(Default)]
pub struct SkillSearchTool;

#[async_trait]
impl Tool for SkillSearchTool {
    fn name(&self) -> &str {
        "skill_search"
    }

    fn description(&self) -> &str {
        "Search the skill catalog by name, description, or path."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "query": {"type": "string"} },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolOutput {
        let input: SkillSearchInput = match serde_json::from_value(input) {
            Ok(v) => v,
            Err(e) => return ToolOutput::Text(format!("Error: invalid skill_search input: {e}")),
        };

        let catalog = ctx.skills.lock().await;
        let results: Vec<Value> = catalog
            .search(&input.query)
            .into_iter()
            .map(|(entry, score)| {
                json!({
                    "name": entry.name,
                    "description": entry.description,
                    "scope": format!("{:?}", entry.scope).to_lowercase(),
                    "score": score,
                })
            })
            .collect();

        ToolOutput::Structured(json!({ "results": results }))
    }
}

#[derive(Debug, Deserialize)]
struct SkillLoadInput {
    name: String,
}

#[derive(Default)]
pub struct SkillLoadTool;

#[async_trait]
impl Tool for SkillLoadTool {
    fn name(&self) -> &str {
        "skill_load"
    }

    fn description(&self) -> &str {
        "Load a skill's SKILL.md body into context, along with its sibling files."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "name": {"type": "string"} },
            "required": ["name"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolOutput {
        let input: SkillLoadInput = match serde_json::from_value(input) {
            Ok(v) => v,
            Err(e) => return ToolOutput::Text(format!("Error: invalid skill_load input: {e}")),
        };

        let mut catalog = ctx.skills.lock().await;
        match catalog.load(&input.name).await {
            Ok(SkillLoadResult::Loaded { envelope, siblings }) => ToolOutput::Structured(json!({
                "envelope": envelope,
                "siblings": siblings
                    .iter()
                    .map(|p| p.to_string_lossy().to_string())
                    .collect::<Vec<_>>(),
            })),
            Ok(SkillLoadResult::AlreadyLoaded { name }) => {
                ToolOutput::Text(format!("Skill \"{name}\" is already loaded; no changes since last load."))
            }
            Err(e) => ToolOutput::Text(format!("Error: {e}")),
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

    async fn ctx_with_skill(tmp: &tempfile::TempDir) -> ToolContext {
        let skill_dir = tmp.path().join(".agents/skills/greeting");
        std::fs::create_dir_all(&skill_dir).expect("mkdir");
        std::fs::write(
            skill_dir.join("SKILL.md"),
            "---\nname: greeting\ndescription: say hello\n---\nHello there.\n",
        )
        .expect("write skill");

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
    async fn search_finds_skill_by_name() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let ctx = ctx_with_skill(&tmp).await;
        let tool = SkillSearchTool::default();
        let output = tool.execute(json!({"query": "greeting"}), &ctx).await;
        match output {
            ToolOutput::Structured(v) => {
                let results = v["results"].as_array().expect("results array");
                assert_eq!(results[0]["name"], "greeting");
            }
            ToolOutput::Text(t) => panic!("expected structured output, got {t}"),
        }
    }

    #[tokio::test]
    async fn load_twice_returns_already_loaded_second_time() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let ctx = ctx_with_skill(&tmp).await;
        let tool = SkillLoadTool::default();

        let first = tool.execute(json!({"name": "greeting"}), &ctx).await;
        assert!(matches!(first, ToolOutput::Structured(_)));

        let second = tool.execute(json!({"name": "greeting"}), &ctx).await;
        match second {
            ToolOutput::Text(t) => assert!(t.contains("already loaded")),
            ToolOutput::Structured(_) => panic!("expected already-loaded text reminder"),
        }
    }
}
