use mcp_types::RequestId;

/// Errors surfaced by either transport. Tool-call-shaped failures never stop
/// at this layer (spec §4.3's "per-call timeout ... explicit `RPC <code>:
/// <message>`"); everything here is meant to be wrapped into a
/// `tool_result{is_error:true}` by the caller, not treated as fatal.
#[derive(Debug, thiserror::Error)]
pub enum McpClientError {
    #[error("failed to spawn MCP server process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("I/O error talking to MCP server: {0}")]
    Io(#[source] std::io::Error),

    #[error("MCP server exited before responding to request {0}")]
    ServerExited(RequestId),

    #[error("request {0} timed out after {1:?}")]
    Timeout(RequestId, std::time::Duration),

    #[error("request aborted")]
    Aborted,

    #[error("RPC {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("malformed JSON-RPC message: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("unsupported protocol version returned by server: {0}")]
    ProtocolVersion(String),

    #[error("http transport error: {0}")]
    Http(#[source] reqwest::Error),

    #[error("more than one OAuth refresh was attempted for a single call")]
    DoubleRefresh,

    #[error("server returned 401 and no OAuth refresh is configured")]
    Unauthorized,

    #[error("client already closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, McpClientError>;
