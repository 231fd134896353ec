//! The tool set (spec §3 `Tool`, component table "Tool set"). Grounded on
//! spec §9's "dynamic tool registry -> trait/interface `Tool` with a schema
//! validator; registry is a `name -> Tool` map owned by the orchestrator;
//! MCP tools wrap a shared MCP client behind the same trait and are marked
//! `strict=false`".

mod bash;
mod edit_tool;
mod glob_tool;
mod grep_tool;
mod mcp_tool;
mod read_tool;
mod skill_tools;
mod todo_tool;
mod write_tool;

pub use bash::BashTool;
pub use edit_tool::EditTool;
pub use glob_tool::GlobTool;
pub use grep_tool::GrepTool;
pub use mcp_tool::McpTool;
pub use read_tool::ReadTool;
pub use skill_tools::SkillLoadTool;
pub use skill_tools::SkillSearchTool;
pub use todo_tool::TodoTool;
pub use write_tool::WriteTool;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::mcp_manager::McpConnectionManager;
use crate::sandbox::Sandbox;
use crate::skills::SkillsCatalog;
use crate::tool_output_cache::ToolOutputCache;

/// Threaded into every tool call; no component owns the loop (spec §9:
/// "cyclic back-pointers -> pass a `ToolContext` value at call time").
pub struct ToolContext {
    pub sandbox: Arc<Sandbox>,
    pub cache: Arc<ToolOutputCache>,
    pub cancel: CancellationToken,
    pub mcp: Arc<McpConnectionManager>,
    pub skills: Arc<tokio::sync::Mutex<SkillsCatalog>>,
}

/// A tool's outcome. The text variant's `"Error: …"` / `"Security error: …"`
/// prefixes signal a non-fatal failure the agent may retry on (spec §3).
#[derive(Debug, Clone)]
pub enum ToolOutput {
    Structured(Value),
    Text(String),
}

impl ToolOutput {
    pub fn is_error(&self) -> bool {
        match self {
            ToolOutput::Text(t) => t.starts_with("Error:") || t.starts_with("Security error:"),
            ToolOutput::Structured(_) => false,
        }
    }

    pub fn into_json(self) -> Value {
        match self {
            ToolOutput::Structured(v) => v,
            ToolOutput::Text(t) => Value::String(t),
        }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;
    /// Whether this tool is write-sensitive and therefore subject to the
    /// permission preview/approval flow (spec §4.4 step 4b).
    fn is_write_sensitive(&self) -> bool {
        false
    }
    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolOutput;
}

/// `name -> Tool` map owned by the orchestrator (spec §9).
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Tool>> {
        self.tools.values()
    }

    pub fn schemas(&self) -> Vec<Value> {
        self.tools
            .values()
            .map(|t| {
                serde_json::json!({
                    "name": t.name(),
                    "description": t.description(),
                    "input_schema": t.input_schema(),
                })
            })
            .collect()
    }

    pub fn with_builtins(sandbox: Arc<Sandbox>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(BashTool::default()));
        registry.register(Arc::new(ReadTool::default()));
        registry.register(Arc::new(WriteTool::default()));
        registry.register(Arc::new(EditTool::default()));
        registry.register(Arc::new(GlobTool::default()));
        registry.register(Arc::new(GrepTool::default()));
        registry.register(Arc::new(TodoTool::default()));
        registry.register(Arc::new(SkillSearchTool::default()));
        registry.register(Arc::new(SkillLoadTool::default()));
        let _ = sandbox;
        registry
    }

    /// Adapts every currently-known MCP tool into the internal `Tool` trait,
    /// keyed by its fully-qualified name (spec §9: "MCP tools wrap a shared
    /// MCP client behind the same trait").
    pub fn sync_mcp_tools(&mut self, mcp: &McpConnectionManager) {
        for (fq_name, tool) in mcp.list_all_tools() {
            self.register(Arc::new(McpTool::new(fq_name, tool)));
        }
    }
}
