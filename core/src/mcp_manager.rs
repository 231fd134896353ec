//! MCP connection manager (spec §4.4 component table "MCP manager").
//! Grounded on `mcp_connection_manager.rs`: one [`McpClient`] per configured
//! server keyed by server name, fully-qualified tool names, concurrent
//! `tools/list` fan-out. Generalized to dispatch to either transport the
//! client crate exposes (stdio or HTTP+SSE) instead of stdio-only, and to
//! adapt MCP tools to the internal [`crate::tools::Tool`] trait (spec §9:
//! "MCP tools wrap a shared MCP client behind the same trait and are marked
//! strict=false").

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use anyhow::anyhow;
use codelia_mcp_client::McpClient;
use mcp_types::Tool as McpTool;
use tokio::task::JoinSet;
use tracing::info;

use crate::mcp_server_config::McpServerConfig;

/// OpenAI-style tool names require `^[a-zA-Z0-9_-]+$`; this delimiter stays
/// inside that charset.
const TOOL_NAME_DELIMITER: &str = "__mcp__";

pub fn fully_qualified_tool_name(server: &str, tool: &str) -> String {
    format!("{server}{TOOL_NAME_DELIMITER}{tool}")
}

pub fn split_fully_qualified_tool_name(fq_name: &str) -> Option<(String, String)> {
    let (server, tool) = fq_name.split_once(TOOL_NAME_DELIMITER)?;
    if server.is_empty() || tool.is_empty() {
        return None;
    }
    Some((server.to_string(), tool.to_string()))
}

pub type ClientStartErrors = HashMap<String, anyhow::Error>;

#[derive(Default)]
pub struct McpConnectionManager {
    clients: HashMap<String, Arc<McpClient>>,
    tools: HashMap<String, McpTool>,
}

impl McpConnectionManager {
    /// Spawns (and initializes) a client for each configured server
    /// concurrently; servers that fail to start are reported in
    /// `ClientStartErrors` rather than failing the whole manager.
    pub async fn new(
        mcp_servers: HashMap<String, McpServerConfig>,
    ) -> Result<(Self, ClientStartErrors)> {
        if mcp_servers.is_empty() {
            return Ok((Self::default(), ClientStartErrors::default()));
        }

        let mut join_set = JoinSet::new();
        for (server_name, cfg) in mcp_servers {
            join_set.spawn(async move {
                let res = connect_and_initialize(&server_name, &cfg).await;
                (server_name, res)
            });
        }

        let mut clients = HashMap::with_capacity(join_set.len());
        let mut errors = ClientStartErrors::new();

        while let Some(res) = join_set.join_next().await {
            let (server_name, client_res) = res?;
            match client_res {
                Ok(client) => {
                    clients.insert(server_name, Arc::new(client));
                }
                Err(e) => {
                    errors.insert(server_name, e);
                }
            }
        }

        let tools = list_all_tools(&clients).await?;
        Ok((Self { clients, tools }, errors))
    }

    pub fn list_all_tools(&self) -> HashMap<String, McpTool> {
        self.tools.clone()
    }

    pub fn server_names(&self) -> Vec<String> {
        self.clients.keys().cloned().collect()
    }

    pub async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: Option<serde_json::Value>,
    ) -> Result<mcp_types::CallToolResult> {
        let client = self
            .clients
            .get(server)
            .ok_or_else(|| anyhow!("unknown MCP server '{server}'"))?
            .clone();

        client
            .call_tool(tool.to_string(), arguments, None)
            .await
            .with_context(|| format!("tool call failed for `{server}/{tool}`"))
    }

    pub async fn close_all(&self) {
        for client in self.clients.values() {
            client.close().await;
        }
    }
}

async fn connect_and_initialize(server_name: &str, cfg: &McpServerConfig) -> Result<McpClient> {
    let timeout = cfg.request_timeout_ms().map(Duration::from_millis);

    let client = match cfg {
        McpServerConfig::Stdio { command, args, env, .. } => {
            let env_pairs: Vec<(String, String)> = env
                .clone()
                .unwrap_or_default()
                .into_iter()
                .collect();
            McpClient::new_stdio(command, args, &env_pairs, timeout).await?
        }
        McpServerConfig::Http { url, headers, .. } => {
            let extra_headers: Vec<(String, String)> =
                headers.clone().unwrap_or_default().into_iter().collect();
            McpClient::new_http(url.clone(), extra_headers, None, None, timeout)?
        }
    };

    client
        .initialize("codelia", env!("CARGO_PKG_VERSION"))
        .await
        .with_context(|| format!("failed to initialize MCP server '{server_name}'"))?;

    Ok(client)
}

async fn list_all_tools(
    clients: &HashMap<String, Arc<McpClient>>,
) -> Result<HashMap<String, McpTool>> {
    let mut join_set = JoinSet::new();
    for (server_name, client) in clients {
        let server_name = server_name.clone();
        let client = client.clone();
        join_set.spawn(async move {
            let res = client.list_tools().await;
            (server_name, res)
        });
    }

    let mut aggregated = HashMap::with_capacity(join_set.len());
    while let Some(res) = join_set.join_next().await {
        let (server_name, list_result) = res?;
        let tools = list_result?;
        for tool in tools {
            let fq_name = fully_qualified_tool_name(&server_name, &tool.name);
            aggregated.insert(fq_name, tool);
        }
    }

    info!(
        "aggregated {} tools from {} MCP servers",
        aggregated.len(),
        clients.len()
    );
    Ok(aggregated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fully_qualified_tool_name_round_trips() {
        let fq = fully_qualified_tool_name("github", "create_issue");
        let (server, tool) = split_fully_qualified_tool_name(&fq).expect("split");
        assert_eq!(server, "github");
        assert_eq!(tool, "create_issue");
    }

    #[test]
    fn malformed_fully_qualified_name_does_not_split() {
        assert!(split_fully_qualified_tool_name("no-delimiter-here").is_none());
    }

    #[tokio::test]
    async fn empty_server_map_yields_empty_manager() {
        let (manager, errors) = McpConnectionManager::new(HashMap::new()).await.expect("new");
        assert!(manager.list_all_tools().is_empty());
        assert!(errors.is_empty());
    }
}
