//! Adapts a single MCP server tool into the internal [`Tool`] trait (spec
//! §9: "MCP tools wrap a shared MCP client behind the same trait and are
//! marked strict=false"). The fully-qualified name
//! (`<server>__mcp__<tool>`) is split back apart at call time so the call
//! can be routed to the right client.

use async_trait::async_trait;
use mcp_types::ContentBlock;
use mcp_types::Tool as McpWireTool;
use serde_json::Value;
use serde_json::json;

use crate::mcp_manager::split_fully_qualified_tool_name;

use super::Tool;
use super::ToolContext;
use super::ToolOutput;

pub struct McpTool {
    fq_name: String,
    server: String,
    tool: String,
    description: String,
    input_schema: Value,
}

impl McpTool {
    pub fn new(fq_name: String, wire: McpWireTool) -> Self {
        let (server, tool) = split_fully_qualified_tool_name(&fq_name)
            .unwrap_or_else(|| ("unknown".to_string(), wire.name.clone()));
        Self {
            description: wire
                .description
                .clone()
                .unwrap_or_else(|| format!("MCP tool `{}` on server `{server}`", wire.name)),
            input_schema: wire.input_schema.clone(),
            fq_name,
            server,
            tool,
        }
    }
}

#[async_trait]
impl Tool for McpTool {
    fn name(&self) -> &str {
        &self.fq_name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> Value {
        self.input_schema.clone()
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolOutput {
        let arguments = if input.is_null() { None } else { Some(input) };
        match ctx.mcp.call_tool(&self.server, &self.tool, arguments).await {
            Ok(result) => {
                let is_error = result.is_error.unwrap_or(false);
                let text = result
                    .content
                    .iter()
                    .filter_map(|block| match block {
                        ContentBlock::Text { text } => Some(text.clone()),
                        ContentBlock::Image { mime_type, .. } => {
                            Some(format!("[image omitted: {mime_type}]"))
                        }
                        ContentBlock::Resource { resource } => Some(resource.to_string()),
                    })
                    .collect::<Vec<_>>()
                    .join("\n");

                if is_error {
                    ToolOutput::Text(format!("Error: {text}"))
                } else {
                    ToolOutput::Structured(json!({
                        "content": text,
                        "structured_content": result.structured_content,
                    }))
                }
            }
            Err(e) => ToolOutput::Text(format!("Error: {e}")),
        }
    }
}
