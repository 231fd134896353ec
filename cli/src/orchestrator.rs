//! Dispatches client→runtime RPC methods (spec §6) and owns the set of
//! active runs. Grounded on `mcp-server/src/message_processor.rs`'s
//! per-method-name dispatch shape, generalized from MCP tool-call handling
//! to the run-oriented method set this spec names.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use chrono::Utc;
use codelia_core::agent_loop::AgentLoop;
use codelia_core::agent_loop::CompactionPolicy;
use codelia_core::agent_loop::LoopOutcome;
use codelia_core::agent_loop::NoopCompactionPolicy;
use codelia_core::agent_loop::RunRequest;
use codelia_core::agent_loop::UiChannel;
use codelia_core::agents_md::AgentsResolver;
use codelia_core::chat_model::ChatMessage;
use codelia_core::chat_model::ChatModel;
use codelia_core::chat_model::Role;
use codelia_core::events::AgentEvent;
use codelia_core::mcp_auth_store::McpAuthStore;
use codelia_core::mcp_manager::McpConnectionManager;
use codelia_core::permissions::PermissionEngine;
use codelia_core::permissions::PermissionRule;
use codelia_core::permissions::ProjectPolicyStore;
use codelia_core::runtime_env::ModelSelection;
use codelia_core::runtime_env::RuntimeEnv;
use codelia_core::session_store::JournalRecord;
use codelia_core::session_store::SessionStore;
use codelia_core::skills::SkillsCatalog;
use codelia_core::tool_output_cache::ToolOutputCache;
use codelia_core::tools::ToolContext;
use codelia_core::tools::ToolRegistry;
use mcp_types::JSONRPCMessage;
use mcp_types::RequestId;
use mcp_types::error_codes;
use serde_json::Value;
use serde_json::json;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::outgoing::OutgoingSender;
use crate::ui_channel::RpcUiChannel;

pub struct Orchestrator {
    pub runtime_env: Arc<RuntimeEnv>,
    pub permissions: Arc<AsyncMutex<PermissionEngine>>,
    pub tools: Arc<ToolRegistry>,
    pub mcp: Arc<McpConnectionManager>,
    pub skills: Arc<AsyncMutex<SkillsCatalog>>,
    pub session_store: Arc<SessionStore>,
    pub agents_resolver: Arc<AsyncMutex<AgentsResolver>>,
    pub auth_store: Arc<McpAuthStore>,
    pub model: Arc<dyn ChatModel>,
    pub outgoing: Arc<OutgoingSender>,
    /// Process-wide per spec §5 ("the tool-output cache ... [is] process-wide"),
    /// shared by every run and by direct `tool.call` invocations rather than
    /// built fresh each time.
    pub tool_output_cache: Arc<ToolOutputCache>,
    pub project_policy_store: Arc<ProjectPolicyStore>,
    active_runs: AsyncMutex<HashMap<String, CancellationToken>>,
    initialized: AtomicBool,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        runtime_env: Arc<RuntimeEnv>,
        permissions: Arc<AsyncMutex<PermissionEngine>>,
        tools: Arc<ToolRegistry>,
        mcp: Arc<McpConnectionManager>,
        skills: Arc<AsyncMutex<SkillsCatalog>>,
        session_store: Arc<SessionStore>,
        agents_resolver: Arc<AsyncMutex<AgentsResolver>>,
        auth_store: Arc<McpAuthStore>,
        model: Arc<dyn ChatModel>,
        outgoing: Arc<OutgoingSender>,
        tool_output_cache: Arc<ToolOutputCache>,
        project_policy_store: Arc<ProjectPolicyStore>,
    ) -> Self {
        Self {
            runtime_env,
            permissions,
            tools,
            mcp,
            skills,
            session_store,
            agents_resolver,
            auth_store,
            model,
            outgoing,
            tool_output_cache,
            project_policy_store,
            active_runs: AsyncMutex::new(HashMap::new()),
            initialized: AtomicBool::new(false),
        }
    }

    pub async fn handle_message(self: &Arc<Self>, msg: JSONRPCMessage) {
        match msg {
            JSONRPCMessage::Request(request) => {
                let id = request.id.clone();
                let method = request.method.clone();
                let params = request.params.unwrap_or(Value::Null);
                self.dispatch_request(id, &method, params).await;
            }
            JSONRPCMessage::Notification(notification) => {
                warn!("ignoring unsupported notification: {}", notification.method);
            }
            JSONRPCMessage::Response(response) => {
                self.outgoing.resolve_pending(response.id, response.result).await;
            }
            JSONRPCMessage::Error(error) => {
                self.outgoing
                    .resolve_pending(error.id, json!({"approved": false, "error": error.error.message}))
                    .await;
            }
            JSONRPCMessage::BatchRequest(batch) => {
                for inner in batch {
                    Box::pin(self.handle_message(inner)).await;
                }
            }
            JSONRPCMessage::BatchResponse(batch) => {
                for inner in batch {
                    Box::pin(self.handle_message(inner)).await;
                }
            }
        }
    }

    async fn dispatch_request(self: &Arc<Self>, id: RequestId, method: &str, params: Value) {
        let result = match method {
            "initialize" => self.handle_initialize(),
            "run.start" => self.handle_run_start(params).await,
            "run.cancel" => self.handle_run_cancel(params).await,
            "session.list" => self.handle_session_list(params).await,
            "session.history" => self.handle_session_history(params).await,
            "model.list" => self.handle_model_list(),
            "model.set" => self.handle_model_set(params),
            "mcp.list" => self.handle_mcp_list(),
            "skills.list" => self.handle_skills_list().await,
            "context.inspect" => self.handle_context_inspect().await,
            "theme.set" => self.handle_theme_set(params),
            "tool.call" => self.handle_tool_call(params).await,
            "auth.logout" => self.handle_auth_logout(params).await,
            other => Err((error_codes::METHOD_NOT_FOUND, format!("unknown method {other}"))),
        };

        match result {
            Ok(value) => self.outgoing.send_response(id, value).await,
            Err((code, message)) => self.outgoing.send_error(id, code, message).await,
        }
    }

    fn handle_initialize(&self) -> Result<Value, (i64, String)> {
        self.initialized.store(true, Ordering::SeqCst);
        Ok(json!({
            "runtime": "codelia",
            "version": env!("CARGO_PKG_VERSION"),
            "methods": [
                "initialize", "run.start", "run.cancel", "session.list", "session.history",
                "model.list", "model.set", "mcp.list", "skills.list", "context.inspect",
                "theme.set", "tool.call", "auth.logout",
            ],
        }))
    }

    async fn handle_run_start(self: &Arc<Self>, params: Value) -> Result<Value, (i64, String)> {
        let text = params
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| (error_codes::INVALID_PARAMS, "run.start requires a `text` field".to_string()))?
            .to_string();
        let session_id = params
            .get("session_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let run_id = uuid::Uuid::new_v4().to_string();
        let cancel = CancellationToken::new();
        self.active_runs.lock().await.insert(run_id.clone(), cancel.clone());

        let this = self.clone();
        let run_id_for_task = run_id.clone();
        tokio::spawn(async move {
            this.drive_run(run_id_for_task, session_id, text, cancel).await;
        });

        Ok(json!({ "run_id": run_id }))
    }

    async fn drive_run(
        self: Arc<Self>,
        run_id: String,
        session_id: String,
        text: String,
        cancel: CancellationToken,
    ) {
        let started_at = Utc::now();
        self.outgoing
            .send_notification("run.status", json!({"run_id": run_id, "status": "running"}))
            .await;

        let writer = match self.session_store.open_writer(&run_id, started_at).await {
            Ok(w) => Some(w),
            Err(e) => {
                warn!("failed to open run journal for {run_id}: {e}");
                None
            }
        };
        if let Some(writer) = &writer {
            let _ = writer
                .append(JournalRecord::Header {
                    schema_version: 1,
                    run_id: run_id.clone(),
                    session_id: session_id.clone(),
                    started_at,
                    prompt_digest: sha256_digest(&text),
                })
                .await;
            let _ = writer
                .append(JournalRecord::RunStart {
                    run_id: run_id.clone(),
                    input: json!({ "text": text }),
                })
                .await;
        }

        let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel::<AgentEvent>();
        let run_end_writer = writer.clone();
        let forward_handle = tokio::spawn(forward_events(self.outgoing.clone(), writer, run_id.clone(), events_rx));

        let tool_ctx = ToolContext {
            sandbox: Arc::new(self.runtime_env.sandbox.clone()),
            cache: self.tool_output_cache.clone(),
            cancel: cancel.clone(),
            mcp: self.mcp.clone(),
            skills: self.skills.clone(),
        };

        let agent_loop = AgentLoop {
            model: self.model.clone(),
            tools: self.tools.clone(),
            permissions: self.permissions.clone(),
            ui: Arc::new(RpcUiChannel::new(self.outgoing.clone())) as Arc<dyn UiChannel>,
            compaction: Arc::new(NoopCompactionPolicy) as Arc<dyn CompactionPolicy>,
            project_policy_store: self.project_policy_store.clone(),
        };

        let request = RunRequest {
            run_id: run_id.clone(),
            model_id: self.runtime_env.model().model.clone(),
            messages: vec![ChatMessage::text(Role::User, text.clone())],
        };

        let outcome = agent_loop.run(request, tool_ctx, events_tx).await;
        self.active_runs.lock().await.remove(&run_id);
        // Wait for every already-emitted agent.event to land in the journal
        // before appending run.end, so the journal stays in emission order.
        let _ = forward_handle.await;

        let (status, final_text, message) = match outcome {
            LoopOutcome::Completed { final_text } => ("completed".to_string(), Some(final_text), None),
            LoopOutcome::Cancelled => ("cancelled".to_string(), None, None),
            LoopOutcome::Error { message } => ("error".to_string(), None, Some(message)),
        };

        if let Some(writer) = &run_end_writer {
            let _ = writer
                .append(JournalRecord::RunEnd {
                    run_id: run_id.clone(),
                    status: status.clone(),
                    final_text: final_text.clone(),
                })
                .await;
        }

        let _ = self.session_store.update_summary(&session_id, Some(text)).await;
        self.outgoing
            .send_notification(
                "run.status",
                json!({"run_id": run_id, "status": status, "final_text": final_text, "message": message}),
            )
            .await;
    }

    async fn handle_run_cancel(&self, params: Value) -> Result<Value, (i64, String)> {
        let run_id = params
            .get("run_id")
            .and_then(Value::as_str)
            .ok_or_else(|| (error_codes::INVALID_PARAMS, "run.cancel requires `run_id`".to_string()))?;
        let runs = self.active_runs.lock().await;
        match runs.get(run_id) {
            Some(token) => {
                token.cancel();
                Ok(json!({ "cancelled": true }))
            }
            None => Err((error_codes::RUN_NOT_FOUND, format!("no active run {run_id}"))),
        }
    }

    async fn handle_session_list(&self, params: Value) -> Result<Value, (i64, String)> {
        let limit = params.get("limit").and_then(Value::as_u64).unwrap_or(20) as usize;
        self.session_store
            .list(limit)
            .await
            .map(|sessions| json!({ "sessions": sessions }))
            .map_err(|e| (error_codes::SESSION_LIST_FAILED, e.to_string()))
    }

    async fn handle_session_history(&self, params: Value) -> Result<Value, (i64, String)> {
        let session_id = params
            .get("session_id")
            .and_then(Value::as_str)
            .ok_or_else(|| (error_codes::INVALID_PARAMS, "session.history requires `session_id`".to_string()))?;
        let max_runs = params.get("max_runs").and_then(Value::as_u64).unwrap_or(20) as usize;
        let max_events = params.get("max_events").and_then(Value::as_u64).unwrap_or(2000) as usize;

        match self.session_store.session_exists(session_id).await {
            Ok(true) => {}
            Ok(false) => return Err((error_codes::SESSION_NOT_FOUND, format!("no such session {session_id}"))),
            Err(e) => return Err((error_codes::SESSION_LOAD_FAILED, e.to_string())),
        }

        self.session_store
            .history(session_id, max_runs, max_events)
            .await
            .map(|events| json!({ "events": events }))
            .map_err(|e| (error_codes::SESSION_LOAD_FAILED, e.to_string()))
    }

    fn handle_model_list(&self) -> Result<Value, (i64, String)> {
        let current = self.runtime_env.model();
        Ok(json!({
            "current": { "provider": current.provider, "model": current.model },
        }))
    }

    fn handle_model_set(&self, params: Value) -> Result<Value, (i64, String)> {
        let provider = params
            .get("provider")
            .and_then(Value::as_str)
            .ok_or_else(|| (error_codes::INVALID_PARAMS, "model.set requires `provider`".to_string()))?
            .to_string();
        let model = params
            .get("model")
            .and_then(Value::as_str)
            .ok_or_else(|| (error_codes::INVALID_PARAMS, "model.set requires `model`".to_string()))?
            .to_string();
        self.runtime_env.set_model(ModelSelection { provider, model });
        Ok(json!({ "ok": true }))
    }

    fn handle_mcp_list(&self) -> Result<Value, (i64, String)> {
        let servers = self.mcp.server_names();
        let tools: Vec<String> = self.mcp.list_all_tools().into_keys().collect();
        Ok(json!({ "servers": servers, "tools": tools }))
    }

    async fn handle_skills_list(&self) -> Result<Value, (i64, String)> {
        let catalog = self.skills.lock().await;
        let entries: Vec<Value> = catalog
            .entries()
            .iter()
            .map(|e| json!({"name": e.name, "description": e.description, "scope": format!("{:?}", e.scope)}))
            .collect();
        Ok(json!({ "skills": entries }))
    }

    async fn handle_context_inspect(&self) -> Result<Value, (i64, String)> {
        let mut resolver = self.agents_resolver.lock().await;
        let cwd = self.runtime_env.sandbox.working_dir().to_path_buf();
        match resolver.load_chain(&cwd).await {
            Ok(docs) => {
                let files: Vec<Value> = docs
                    .iter()
                    .map(|d| json!({"path": d.path, "bytes": d.contents.len()}))
                    .collect();
                Ok(json!({ "agents_md": files }))
            }
            Err(e) => Err((error_codes::RUNTIME_INTERNAL, e.to_string())),
        }
    }

    fn handle_theme_set(&self, params: Value) -> Result<Value, (i64, String)> {
        let theme = params
            .get("theme")
            .and_then(Value::as_str)
            .ok_or_else(|| (error_codes::INVALID_PARAMS, "theme.set requires `theme`".to_string()))?;
        // Session-scoped only; persisting to config.json is the client's call
        // to make via a future config-write method.
        Ok(json!({ "theme": theme }))
    }

    async fn handle_tool_call(&self, params: Value) -> Result<Value, (i64, String)> {
        let tool_name = params
            .get("tool")
            .and_then(Value::as_str)
            .ok_or_else(|| (error_codes::INVALID_PARAMS, "tool.call requires `tool`".to_string()))?;
        let args = params.get("args").cloned().unwrap_or(Value::Null);

        let Some(tool) = self.tools.get(tool_name) else {
            return Err((error_codes::INVALID_PARAMS, format!("unknown tool {tool_name}")));
        };

        if tool.is_write_sensitive() {
            let argv = args
                .get("command")
                .and_then(Value::as_str)
                .and_then(shlex::split)
                .unwrap_or_default();
            let decision = self.permissions.lock().await.evaluate(tool_name, &argv, None);
            match decision {
                codelia_core::permissions::Decision::Allow => {}
                codelia_core::permissions::Decision::Deny(reason) => {
                    return Err((error_codes::RUNTIME_INTERNAL, format!("permission denied: {reason}")));
                }
                codelia_core::permissions::Decision::AskUser => {
                    let rx = self
                        .outgoing
                        .send_request("ui.confirm", json!({"tool": tool_name, "summary": "direct tool.call"}))
                        .await;
                    let approved = rx
                        .await
                        .ok()
                        .and_then(|v| v.get("approved").and_then(Value::as_bool))
                        .unwrap_or(false);
                    if !approved {
                        return Err((error_codes::USER_CANCELLED, "tool call denied by user".to_string()));
                    }
                }
            }
        }

        let tool_ctx = ToolContext {
            sandbox: Arc::new(self.runtime_env.sandbox.clone()),
            cache: self.tool_output_cache.clone(),
            cancel: CancellationToken::new(),
            mcp: self.mcp.clone(),
            skills: self.skills.clone(),
        };

        let output = tool.execute(args, &tool_ctx).await;
        Ok(json!({ "result": output.into_json() }))
    }

    async fn handle_auth_logout(&self, params: Value) -> Result<Value, (i64, String)> {
        let server = params
            .get("server")
            .and_then(Value::as_str)
            .ok_or_else(|| (error_codes::INVALID_PARAMS, "auth.logout requires `server`".to_string()))?;
        self.auth_store
            .remove(server)
            .await
            .map(|removed| json!({ "removed": removed }))
            .map_err(|e| (error_codes::RUNTIME_INTERNAL, e.to_string()))
    }

    /// Builds an allow rule from a remembered UI confirmation and persists
    /// it to `projects.json` when the scope is project-wide (spec §4.5).
    pub async fn remember_project_rule(&self, rule: PermissionRule) {
        let project_rules = {
            let mut engine = self.permissions.lock().await;
            if !engine.remember_project_rule(rule) {
                return;
            }
            engine.project_rules().to_vec()
        };

        let key = ProjectPolicyStore::canonical_key(self.runtime_env.sandbox.root_dir());
        let mut file = match self.project_policy_store.load().await {
            Ok(file) => file,
            Err(e) => {
                warn!("failed to load projects.json before persisting remembered rule: {e}");
                return;
            }
        };
        file.projects.entry(key).or_default().rules = project_rules;
        if let Err(e) = self.project_policy_store.save(&file).await {
            warn!("failed to persist remembered project rule: {e}");
        }
    }
}

fn sha256_digest(text: &str) -> String {
    use sha2::Digest;
    let mut hasher = sha2::Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

async fn forward_events(
    outgoing: Arc<OutgoingSender>,
    writer: Option<codelia_core::session_store::RunJournalWriter>,
    run_id: String,
    mut events_rx: tokio::sync::mpsc::UnboundedReceiver<AgentEvent>,
) {
    let mut seq: u64 = 0;
    while let Some(event) = events_rx.recv().await {
        seq += 1;
        if let Some(writer) = &writer {
            let _ = writer
                .append(JournalRecord::AgentEventRecord {
                    run_id: run_id.clone(),
                    seq,
                    event: event.clone(),
                })
                .await;
        }
        outgoing
            .send_notification("agent.event", json!({"run_id": run_id, "seq": seq, "event": event}))
            .await;
    }
}
