//! Streamable-HTTP transport: POST JSON-RPC requests, accept either a
//! single JSON response or an `text/event-stream` of response chunks, and
//! track the `MCP-Session-Id` the server hands back (spec §4.3).
//!
//! The OAuth browser/consent flow itself is explicitly out of scope (spec
//! §1's "OAuth browser flow plumbing" is an external collaborator); what
//! this transport owns is the mechanical "401 -> refresh once -> retry
//! once" rule, so the refresh step is injected as a callback, the same
//! shape as the `SendElicitation` callback the `rmcp`-based reference
//! client threads through for UI-mediated requests.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use eventsource_stream::Eventsource;
use futures::StreamExt;
use futures::future::BoxFuture;
use mcp_types::HttpSessionState;
use mcp_types::JSONRPCMessage;
use mcp_types::JSONRPCRequest;
use mcp_types::MCP_PROTOCOL_VERSION;
use mcp_types::MCP_PROTOCOL_VERSION_HEADER;
use mcp_types::MCP_SESSION_ID_HEADER;
use mcp_types::RequestId;
use reqwest::Client;
use reqwest::StatusCode;
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::McpClientError;
use crate::error::Result;
use crate::pending::PendingRequests;

/// Supplies a fresh bearer token given the previous one (or `None` on the
/// first call). Returns `None` if no refresh is configured for this
/// server, which turns a 401 straight into `Unauthorized`.
pub type OAuthRefresher =
    Arc<dyn Fn(Option<String>) -> BoxFuture<'static, Option<String>> + Send + Sync>;

/// Outcome of pulling one JSON-RPC message out of a response body: either
/// it answers the request we sent, or it's addressed to some other id and
/// the SSE loop should keep reading.
enum Extracted {
    Matched(Result<Value>),
    NotOurs,
}

pub struct HttpTransport {
    client: Client,
    url: String,
    extra_headers: Vec<(String, String)>,
    bearer: AsyncMutex<Option<String>>,
    refresher: Option<OAuthRefresher>,
    session: AsyncMutex<HttpSessionState>,
    closed: AtomicBool,
}

impl HttpTransport {
    pub fn new(
        url: String,
        extra_headers: Vec<(String, String)>,
        bearer: Option<String>,
        refresher: Option<OAuthRefresher>,
    ) -> Result<Self> {
        let client = Client::builder().build().map_err(McpClientError::Http)?;
        Ok(Self {
            client,
            url,
            extra_headers,
            bearer: AsyncMutex::new(bearer),
            refresher,
            session: AsyncMutex::new(HttpSessionState::default()),
            closed: AtomicBool::new(false),
        })
    }

    fn build_request(
        &self,
        body: &str,
        bearer: Option<&str>,
        session_id: Option<&str>,
    ) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json, text/event-stream")
            .header(MCP_PROTOCOL_VERSION_HEADER, MCP_PROTOCOL_VERSION)
            .body(body.to_string());
        for (k, v) in &self.extra_headers {
            builder = builder.header(k, v);
        }
        if let Some(bearer) = bearer {
            builder = builder.bearer_auth(bearer);
        }
        if let Some(session_id) = session_id {
            builder = builder.header(MCP_SESSION_ID_HEADER, session_id);
        }
        builder
    }

    /// Sends one JSON-RPC request and waits for its matching response,
    /// handling both the plain-JSON and SSE response shapes, and the
    /// single allowed OAuth refresh-and-retry.
    pub async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
        id_source: &PendingRequests,
        timeout: Duration,
    ) -> Result<Value> {
        if self.closed.load(Ordering::Acquire) {
            return Err(McpClientError::Closed);
        }
        let id = id_source.next_id();
        let request = JSONRPCRequest {
            jsonrpc: mcp_types::JSONRPC_VERSION.to_string(),
            id: id.clone(),
            method: method.to_string(),
            params,
        };
        let body = serde_json::to_string(&request).map_err(McpClientError::Malformed)?;

        match tokio::time::timeout(timeout, self.attempt(&body, &id, false)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(McpClientError::Timeout(id, timeout)),
        }
    }

    fn attempt<'a>(
        &'a self,
        body: &'a str,
        expected_id: &'a RequestId,
        already_refreshed: bool,
    ) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            let bearer = self.bearer.lock().await.clone();
            let session_id = self.session.lock().await.session_id.clone();

            let response = self
                .build_request(body, bearer.as_deref(), session_id.as_deref())
                .send()
                .await
                .map_err(McpClientError::Http)?;

            if response.status() == StatusCode::UNAUTHORIZED {
                if already_refreshed {
                    return Err(McpClientError::DoubleRefresh);
                }
                let Some(refresher) = self.refresher.clone() else {
                    return Err(McpClientError::Unauthorized);
                };
                let new_token = refresher(bearer.clone()).await;
                let Some(new_token) = new_token else {
                    return Err(McpClientError::Unauthorized);
                };
                *self.bearer.lock().await = Some(new_token);
                return self.attempt(body, expected_id, true).await;
            }

            if let Some(new_session_id) = response
                .headers()
                .get(MCP_SESSION_ID_HEADER)
                .and_then(|v| v.to_str().ok())
            {
                self.session.lock().await.session_id = Some(new_session_id.to_string());
            }

            let status = response.status();
            let content_type = response
                .headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();

            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(McpClientError::Rpc {
                    code: i64::from(status.as_u16()),
                    message: text,
                });
            }

            if content_type.contains("text/event-stream") {
                self.read_sse_for_id(response, expected_id).await
            } else {
                let bytes = response.bytes().await.map_err(McpClientError::Http)?;
                match Self::extract(&bytes, expected_id) {
                    Extracted::Matched(result) => result,
                    Extracted::NotOurs => Err(McpClientError::ServerExited(expected_id.clone())),
                }
            }
        })
    }

    async fn read_sse_for_id(
        &self,
        response: reqwest::Response,
        expected_id: &RequestId,
    ) -> Result<Value> {
        let mut stream = response.bytes_stream().eventsource();
        while let Some(event) = stream.next().await {
            let event = event.map_err(|e| McpClientError::Io(std::io::Error::other(e)))?;
            if event.data.trim().is_empty() {
                continue;
            }
            match Self::extract(event.data.as_bytes(), expected_id) {
                Extracted::Matched(result) => return result,
                Extracted::NotOurs => continue,
            }
        }
        Err(McpClientError::ServerExited(expected_id.clone()))
    }

    fn extract(bytes: &[u8], expected_id: &RequestId) -> Extracted {
        let message: std::result::Result<JSONRPCMessage, _> = serde_json::from_slice(bytes);
        match message {
            Ok(JSONRPCMessage::Response(resp)) if &resp.id == expected_id => {
                Extracted::Matched(Ok(resp.result))
            }
            Ok(JSONRPCMessage::Error(err)) if &err.id == expected_id => {
                Extracted::Matched(Err(McpClientError::Rpc {
                    code: err.error.code,
                    message: err.error.message,
                }))
            }
            Ok(_) => Extracted::NotOurs,
            Err(err) => Extracted::Matched(Err(McpClientError::Malformed(err))),
        }
    }

    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
