//! Wire types for the runtime's two JSON-RPC surfaces:
//!
//! - the outer RPC envelope the runtime speaks to its own client (spec §6);
//! - the Model Context Protocol (MCP) messages exchanged with tool servers
//!   over the stdio and streamable-HTTP transports (spec §4.3).
//!
//! Both surfaces share the same JSON-RPC 2.0 envelope shape, so one set of
//! envelope types is defined here and reused by `codelia-mcp-client` and
//! `codelia-cli`.

use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// Protocol versions this runtime's MCP client understands. The first is
/// sent on `initialize`; any other `protocolVersion` coming back from a
/// server is a fatal `McpProtocol` error (spec §4.3).
pub const MCP_PROTOCOL_VERSION: &str = "2025-11-25";
pub const MCP_COMPATIBLE_PROTOCOL_VERSIONS: &[&str] = &["2025-11-25", "2025-06-18"];

pub const MCP_PROTOCOL_VERSION_HEADER: &str = "MCP-Protocol-Version";
pub const MCP_SESSION_ID_HEADER: &str = "MCP-Session-Id";

/// A JSON-RPC request id: either a number or a string, per the spec.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Integer(i64),
    String(String),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::Integer(n) => write!(f, "{n}"),
            RequestId::String(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JSONRPCRequest {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JSONRPCNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JSONRPCResponse {
    pub jsonrpc: String,
    pub id: RequestId,
    pub result: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JSONRPCErrorError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JSONRPCError {
    pub jsonrpc: String,
    pub id: RequestId,
    pub error: JSONRPCErrorError,
}

/// Any one message that can appear on the wire, request or response side.
/// The untagged representation matches JSON-RPC 2.0: requests carry
/// `method`+`id`, responses carry `id`+`result` (xor `error`), notifications
/// carry `method` with no `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JSONRPCMessage {
    Request(JSONRPCRequest),
    Notification(JSONRPCNotification),
    Response(JSONRPCResponse),
    Error(JSONRPCError),
    BatchRequest(Vec<JSONRPCMessage>),
    BatchResponse(Vec<JSONRPCMessage>),
}

/// Standard JSON-RPC / runtime error codes (spec §6).
pub mod error_codes {
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const RUNTIME_INTERNAL: i64 = -32000;
    pub const RUNTIME_BUSY: i64 = -32001;
    pub const RUN_NOT_FOUND: i64 = -32002;
    pub const USER_CANCELLED: i64 = -32003;
    pub const SESSION_NOT_FOUND: i64 = -32004;
    pub const SESSION_LOAD_FAILED: i64 = -32005;
    pub const SESSION_LIST_FAILED: i64 = -32006;
}

// ---------------------------------------------------------------------
// MCP method payloads
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Implementation {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientCapabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roots: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeRequestParams {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    pub capabilities: ClientCapabilities,
    #[serde(rename = "clientInfo")]
    pub client_info: Implementation,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerCapabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    #[serde(rename = "serverInfo")]
    pub server_info: Implementation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListToolsRequestParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListToolsResult {
    pub tools: Vec<Tool>,
    #[serde(rename = "nextCursor", default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolRequestParams {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Image { data: String, #[serde(rename = "mimeType")] mime_type: String },
    Resource { resource: Value },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallToolResult {
    pub content: Vec<ContentBlock>,
    #[serde(rename = "isError", default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
}

/// Headers carried by the HTTP transport across a logical MCP session.
#[derive(Debug, Clone, Default)]
pub struct HttpSessionState {
    pub session_id: Option<String>,
    pub extra_headers: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_round_trips_both_variants() {
        let int_id: RequestId = serde_json::from_str("7").unwrap();
        assert_eq!(int_id, RequestId::Integer(7));
        let str_id: RequestId = serde_json::from_str("\"srv-1\"").unwrap();
        assert_eq!(str_id, RequestId::String("srv-1".to_string()));
    }

    #[test]
    fn jsonrpc_message_untagged_dispatch() {
        let req = r#"{"jsonrpc":"2.0","id":1,"method":"tools/list","params":null}"#;
        match serde_json::from_str::<JSONRPCMessage>(req).unwrap() {
            JSONRPCMessage::Request(r) => assert_eq!(r.method, "tools/list"),
            other => panic!("expected Request, got {other:?}"),
        }

        let resp = r#"{"jsonrpc":"2.0","id":"srv-1","result":{"ok":true}}"#;
        match serde_json::from_str::<JSONRPCMessage>(resp).unwrap() {
            JSONRPCMessage::Response(r) => assert_eq!(r.result["ok"], true),
            other => panic!("expected Response, got {other:?}"),
        }
    }
}
