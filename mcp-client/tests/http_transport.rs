//! Integration tests for the streamable-HTTP MCP transport: plain-JSON and
//! SSE response shapes, session id propagation, and the refresh-once rule
//! on a 401, mirroring the wiremock harness style used for the chat-model
//! HTTP client tests.

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use codelia_mcp_client::McpClient;
use codelia_mcp_client::McpClientError;
use mcp_types::MCP_PROTOCOL_VERSION;
use serde_json::Value;
use serde_json::json;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::Request;
use wiremock::Respond;
use wiremock::ResponseTemplate;
use wiremock::matchers::method;

fn request_id(req: &Request) -> Value {
    let body: Value = serde_json::from_slice(&req.body).expect("valid JSON-RPC request body");
    body["id"].clone()
}

struct JsonEcho {
    result: Value,
}

impl Respond for JsonEcho {
    fn respond(&self, req: &Request) -> ResponseTemplate {
        let body = json!({"jsonrpc": "2.0", "id": request_id(req), "result": self.result});
        ResponseTemplate::new(200)
            .insert_header("content-type", "application/json")
            .insert_header("mcp-session-id", "sess-123")
            .set_body_json(body)
    }
}

fn init_result() -> Value {
    json!({
        "protocolVersion": MCP_PROTOCOL_VERSION,
        "capabilities": {},
        "serverInfo": {"name": "fixture-server", "version": "0.1.0"}
    })
}

#[tokio::test]
async fn initialize_and_list_tools_over_plain_json() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(JsonEcho {
            result: init_result(),
        })
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let client = McpClient::new_http(server.uri(), Vec::new(), None, None, None)
        .expect("http client builds");
    let initialize = client
        .initialize("codelia-tests", "0.0.0")
        .await
        .expect("initialize succeeds");
    assert_eq!(initialize.server_info.name, "fixture-server");

    server.reset().await;
    Mock::given(method("POST"))
        .respond_with(JsonEcho {
            result: json!({"tools": [{"name": "echo", "inputSchema": {"type": "object"}}]}),
        })
        .mount(&server)
        .await;

    let tools = client.list_tools().await.expect("tools/list succeeds");
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "echo");
}

#[tokio::test]
async fn initialize_over_sse_response() {
    let server = MockServer::start().await;

    struct SseEcho;
    impl Respond for SseEcho {
        fn respond(&self, req: &Request) -> ResponseTemplate {
            let id = request_id(req);
            let body = json!({"jsonrpc": "2.0", "id": id, "result": init_result()});
            let frame = format!("data: {body}\n\n");
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_raw(frame, "text/event-stream")
        }
    }

    Mock::given(method("POST"))
        .respond_with(SseEcho)
        .mount(&server)
        .await;

    let client = McpClient::new_http(server.uri(), Vec::new(), None, None, None)
        .expect("http client builds");
    let result = client
        .initialize("codelia-tests", "0.0.0")
        .await
        .expect("initialize over SSE succeeds");
    assert_eq!(result.server_info.name, "fixture-server");
}

#[tokio::test]
async fn refreshes_once_on_401_then_succeeds() {
    let server = MockServer::start().await;
    let refresh_calls = Arc::new(AtomicUsize::new(0));

    struct UnauthorizedThenOk {
        calls: Arc<AtomicUsize>,
    }
    impl Respond for UnauthorizedThenOk {
        fn respond(&self, req: &Request) -> ResponseTemplate {
            let has_bearer = req.headers.get("authorization").is_some();
            if !has_bearer {
                return ResponseTemplate::new(401);
            }
            let id = request_id(req);
            self.calls.fetch_add(1, Ordering::SeqCst);
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/json")
                .set_body_json(json!({"jsonrpc": "2.0", "id": id, "result": init_result()}))
        }
    }

    Mock::given(method("POST"))
        .respond_with(UnauthorizedThenOk {
            calls: refresh_calls.clone(),
        })
        .mount(&server)
        .await;

    let refresher_calls = Arc::new(AtomicUsize::new(0));
    let refresher_calls_inner = refresher_calls.clone();
    let refresher: codelia_mcp_client::OAuthRefresher = Arc::new(move |_prev| {
        let counter = refresher_calls_inner.clone();
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Some("fresh-token".to_string())
        })
    });

    let client = McpClient::new_http(server.uri(), Vec::new(), None, Some(refresher), None)
        .expect("http client builds");
    let result = client
        .initialize("codelia-tests", "0.0.0")
        .await
        .expect("initialize succeeds after one refresh");
    assert_eq!(result.server_info.name, "fixture-server");
    assert_eq!(refresher_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn no_refresher_on_401_is_unauthorized() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = McpClient::new_http(server.uri(), Vec::new(), None, None, None)
        .expect("http client builds");
    let err = client
        .initialize("codelia-tests", "0.0.0")
        .await
        .unwrap_err();
    assert!(matches!(err, McpClientError::Unauthorized));
}

#[tokio::test]
async fn two_consecutive_401s_surface_as_unauthorized_after_one_refresh() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let refresher_calls = Arc::new(AtomicUsize::new(0));
    let refresher_calls_inner = refresher_calls.clone();
    let refresher: codelia_mcp_client::OAuthRefresher = Arc::new(move |_prev| {
        let counter = refresher_calls_inner.clone();
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Some("still-bad-token".to_string())
        })
    });

    let client = McpClient::new_http(server.uri(), Vec::new(), None, Some(refresher), None)
        .expect("http client builds");
    let err = client
        .initialize("codelia-tests", "0.0.0")
        .await
        .unwrap_err();

    assert!(matches!(err, McpClientError::Unauthorized));
    assert_eq!(refresher_calls.load(Ordering::SeqCst), 1);
}
