//! Client-side implementation of the Model Context Protocol (spec §4.3):
//! one state machine per configured server, speaking either newline-delimited
//! JSON-RPC over a child process's stdio or JSON-RPC-over-HTTP with SSE
//! framing, behind a single [`McpClient`] facade.

mod client;
mod error;
mod http;
mod pending;
mod stdio;

pub use client::McpClient;
pub use client::SharedMcpClient;
pub use error::McpClientError;
pub use error::Result;
pub use http::OAuthRefresher;
