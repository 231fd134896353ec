//! A single [`McpClient`] owns one transport (stdio or streamable-HTTP) for
//! one configured MCP server and carries it through the
//! initialize -> tools/list -> tools/call -> close lifecycle (spec §4.3).
//!
//! Grounded on `mcp_connection_manager.rs`'s per-server client plus the
//! handshake/state-machine shape of the `rmcp`-based reference client,
//! minus the `rmcp` SDK itself: this client speaks the wire protocol
//! directly so the SSE chunking and refresh-once behavior stay under test.

use std::sync::Arc;
use std::time::Duration;

use mcp_types::CallToolRequestParams;
use mcp_types::CallToolResult;
use mcp_types::ClientCapabilities;
use mcp_types::Implementation;
use mcp_types::InitializeRequestParams;
use mcp_types::InitializeResult;
use mcp_types::ListToolsRequestParams;
use mcp_types::ListToolsResult;
use mcp_types::MCP_COMPATIBLE_PROTOCOL_VERSIONS;
use mcp_types::MCP_PROTOCOL_VERSION;
use mcp_types::Tool;
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

use crate::error::McpClientError;
use crate::error::Result;
use crate::http::HttpTransport;
use crate::http::OAuthRefresher;
use crate::pending::PendingRequests;
use crate::stdio::StdioTransport;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

enum Transport {
    Stdio(StdioTransport),
    Http {
        transport: HttpTransport,
        pending: PendingRequests,
    },
}

/// Handshake state. `tools/list`/`tools/call` before `initialize` is a
/// programming error in the caller, not a recoverable condition.
enum State {
    Connecting,
    Ready { server_info: Implementation },
}

pub struct McpClient {
    transport: Transport,
    request_timeout: Duration,
    state: AsyncMutex<State>,
}

impl McpClient {
    pub async fn new_stdio(
        command: &str,
        args: &[String],
        env: &[(String, String)],
        request_timeout: Option<Duration>,
    ) -> Result<Self> {
        let transport = StdioTransport::spawn(command, args, env).await?;
        Ok(Self {
            transport: Transport::Stdio(transport),
            request_timeout: request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            state: AsyncMutex::new(State::Connecting),
        })
    }

    pub fn new_http(
        url: String,
        extra_headers: Vec<(String, String)>,
        bearer: Option<String>,
        refresher: Option<OAuthRefresher>,
        request_timeout: Option<Duration>,
    ) -> Result<Self> {
        let transport = HttpTransport::new(url, extra_headers, bearer, refresher)?;
        Ok(Self {
            transport: Transport::Http {
                transport,
                pending: PendingRequests::new(),
            },
            request_timeout: request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            state: AsyncMutex::new(State::Connecting),
        })
    }

    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        cancel: Option<&CancellationToken>,
    ) -> Result<Value> {
        match &self.transport {
            Transport::Stdio(t) => {
                t.send_request(method, params, self.request_timeout, cancel)
                    .await
            }
            Transport::Http { transport, pending } => {
                transport
                    .send_request(method, params, pending, self.request_timeout)
                    .await
            }
        }
    }

    pub async fn initialize(
        &self,
        client_name: &str,
        client_version: &str,
    ) -> Result<InitializeResult> {
        let params = InitializeRequestParams {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: ClientCapabilities::default(),
            client_info: Implementation {
                name: client_name.to_string(),
                version: client_version.to_string(),
            },
        };
        let value = self
            .request(
                "initialize",
                Some(serde_json::to_value(params).map_err(McpClientError::Malformed)?),
                None,
            )
            .await?;
        let result: InitializeResult =
            serde_json::from_value(value).map_err(McpClientError::Malformed)?;

        if !MCP_COMPATIBLE_PROTOCOL_VERSIONS.contains(&result.protocol_version.as_str()) {
            return Err(McpClientError::ProtocolVersion(result.protocol_version));
        }

        if let Transport::Stdio(t) = &self.transport {
            t.send_notification("notifications/initialized", None)?;
        }

        *self.state.lock().await = State::Ready {
            server_info: result.server_info.clone(),
        };
        Ok(result)
    }

    async fn require_ready(&self) -> Result<()> {
        match &*self.state.lock().await {
            State::Ready { .. } => Ok(()),
            State::Connecting => Err(McpClientError::Closed),
        }
    }

    /// The server's self-reported name/version from `initialize`, once
    /// the handshake has completed.
    pub async fn server_info(&self) -> Option<Implementation> {
        match &*self.state.lock().await {
            State::Ready { server_info } => Some(server_info.clone()),
            State::Connecting => None,
        }
    }

    /// Pages through `tools/list` until the server stops returning a
    /// `nextCursor`, per spec §4.3.
    pub async fn list_tools(&self) -> Result<Vec<Tool>> {
        self.require_ready().await?;
        let mut tools = Vec::new();
        let mut cursor = None;
        loop {
            let params = ListToolsRequestParams { cursor };
            let value = self
                .request(
                    "tools/list",
                    Some(serde_json::to_value(params).map_err(McpClientError::Malformed)?),
                    None,
                )
                .await?;
            let page: ListToolsResult =
                serde_json::from_value(value).map_err(McpClientError::Malformed)?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(tools)
    }

    pub async fn call_tool(
        &self,
        name: String,
        arguments: Option<Value>,
        cancel: Option<&CancellationToken>,
    ) -> Result<CallToolResult> {
        self.require_ready().await?;
        let params = CallToolRequestParams { name, arguments };
        let value = self
            .request(
                "tools/call",
                Some(serde_json::to_value(params).map_err(McpClientError::Malformed)?),
                cancel,
            )
            .await?;
        serde_json::from_value(value).map_err(McpClientError::Malformed)
    }

    pub async fn close(&self) {
        match &self.transport {
            Transport::Stdio(t) => t.close().await,
            Transport::Http { transport, pending } => {
                transport.close().await;
                pending.fail_all(|| McpClientError::Closed);
            }
        }
    }
}

pub type SharedMcpClient = Arc<McpClient>;
