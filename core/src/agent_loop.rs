//! The agent loop (spec §4.4): alternates chat-model calls and tool
//! executions, emitting `AgentEvent`s, building permission previews,
//! consulting the permission engine, and accumulating token usage.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::chat_model::ChatDelta;
use crate::chat_model::ChatMessage;
use crate::chat_model::ChatModel;
use crate::chat_model::ChatRequest;
use crate::chat_model::Completion;
use crate::chat_model::Role;
use crate::chat_model::UsageDelta;
use crate::events::AgentEvent;
use crate::permissions::Decision;
use crate::permissions::PermissionEngine;
use crate::tools::ToolContext;
use crate::tools::ToolRegistry;

/// The model's plan is complete; the loop converts this into a `final`
/// event rather than treating it as a failure (spec §4.4 "TaskComplete").
pub const DONE_TOOL_NAME: &str = "done";

#[derive(Debug, Default, Clone)]
pub struct RunUsageSummary {
    pub per_model: HashMap<String, UsageDelta>,
}

impl RunUsageSummary {
    pub fn accumulate(&mut self, model_id: &str, delta: &UsageDelta) {
        self.per_model
            .entry(model_id.to_string())
            .or_default()
            .accumulate(delta);
    }
}

/// Pluggable context-compaction strategy (spec §9 open question: resolved
/// as a trait with a no-op default implementation).
pub trait CompactionPolicy: Send + Sync {
    fn should_compact(&self, context_left_percent: u8) -> bool;
    /// Replaces `messages` with a (shorter) summarized history. Returns
    /// `true` if it actually compacted anything.
    fn compact(&self, messages: &mut Vec<ChatMessage>) -> bool;
}

pub struct NoopCompactionPolicy;

impl CompactionPolicy for NoopCompactionPolicy {
    fn should_compact(&self, _context_left_percent: u8) -> bool {
        false
    }

    fn compact(&self, _messages: &mut Vec<ChatMessage>) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RememberScope {
    Session,
    Project,
}

#[derive(Debug, Clone)]
pub struct UiConfirmRequest {
    pub run_id: String,
    pub tool: String,
    pub summary: Option<String>,
    pub diff: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UiConfirmResponse {
    pub approved: bool,
    pub remember: Option<RememberScope>,
}

/// The runtime→client `ui.confirm` request (spec §6). A concrete
/// implementation lives in the orchestrator, over the JSON-RPC channel.
#[async_trait::async_trait]
pub trait UiChannel: Send + Sync {
    async fn confirm(&self, request: UiConfirmRequest) -> UiConfirmResponse;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopOutcome {
    Completed { final_text: String },
    Cancelled,
    Error { message: String },
}

pub struct RunRequest {
    pub run_id: String,
    pub model_id: String,
    pub messages: Vec<ChatMessage>,
}

/// Drives one run to completion or cancellation, emitting every event on
/// `events` in order (spec §3 ordering invariant).
pub struct AgentLoop {
    pub model: Arc<dyn ChatModel>,
    pub tools: Arc<ToolRegistry>,
    pub permissions: Arc<AsyncMutex<PermissionEngine>>,
    pub ui: Arc<dyn UiChannel>,
    pub compaction: Arc<dyn CompactionPolicy>,
    /// Backs `remember=true` project-scoped approvals (spec §4.5: "persisted
    /// per-project decisions"); session-scoped remembers stay in memory only.
    pub project_policy_store: Arc<crate::permissions::ProjectPolicyStore>,
}

impl AgentLoop {
    pub async fn run(
        &self,
        request: RunRequest,
        tool_ctx: ToolContext,
        events: UnboundedSender<AgentEvent>,
    ) -> LoopOutcome {
        let cancel = tool_ctx.cancel.clone();
        let mut messages = request.messages;
        let mut usage = RunUsageSummary::default();

        loop {
            if cancel.is_cancelled() {
                return LoopOutcome::Cancelled;
            }

            let _ = events.send(AgentEvent::StepStart);
            let step_started = Instant::now();

            let tool_schemas = self.tools.schemas();
            let chat_request = ChatRequest {
                model: request.model_id.clone(),
                messages: messages.clone(),
                tool_schemas,
            };

            let events_for_delta = events.clone();
            let on_delta = move |delta: ChatDelta| {
                let event = match delta {
                    ChatDelta::Text(content) => AgentEvent::Text { content },
                    ChatDelta::Reasoning(content) => AgentEvent::Reasoning { content },
                };
                let _ = events_for_delta.send(event);
            };

            let turn = self.model.run_turn(chat_request, &on_delta, &cancel).await;

            if cancel.is_cancelled() {
                return LoopOutcome::Cancelled;
            }

            let turn = match turn {
                Ok(turn) => turn,
                Err(crate::chat_model::ChatModelError::Cancelled) => return LoopOutcome::Cancelled,
                Err(crate::chat_model::ChatModelError::Provider(message)) => {
                    return LoopOutcome::Error { message };
                }
            };

            usage.accumulate(&request.model_id, &turn.usage);

            match turn.completion {
                Completion::Text(content) => {
                    let _ = events.send(AgentEvent::Final {
                        content: content.clone(),
                    });
                    return LoopOutcome::Completed { final_text: content };
                }
                Completion::ToolCalls(calls) => {
                    for call in calls {
                        if cancel.is_cancelled() {
                            return LoopOutcome::Cancelled;
                        }

                        if call.tool == DONE_TOOL_NAME {
                            let final_text = call
                                .args
                                .get("summary")
                                .and_then(Value::as_str)
                                .unwrap_or_default()
                                .to_string();
                            let _ = events.send(AgentEvent::Final {
                                content: final_text.clone(),
                            });
                            return LoopOutcome::Completed { final_text };
                        }

                        let _ = events.send(AgentEvent::ToolCall {
                            tool: call.tool.clone(),
                            args: call.args.clone(),
                            tool_call_id: call.tool_call_id.clone(),
                            raw_args: Some(call.raw_args.clone()),
                        });

                        let result = self
                            .dispatch_tool_call(&request.run_id, &call.tool, &call.args, &tool_ctx, &events)
                            .await;

                        let (result_value, is_error) = match result {
                            ToolDispatchResult::Output(output) => {
                                let is_error = output.is_error();
                                (output.into_json(), Some(is_error))
                            }
                            ToolDispatchResult::Denied(reason) => {
                                (Value::String(format!("Permission denied: {reason}")), Some(true))
                            }
                        };

                        let _ = events.send(AgentEvent::ToolResult {
                            tool: call.tool.clone(),
                            result: result_value,
                            tool_call_id: call.tool_call_id.clone(),
                            is_error,
                        });

                        messages.push(ChatMessage::tool_result(
                            call.tool_call_id.clone(),
                            result_is_error_text(is_error),
                        ));
                    }

                    let _ = events.send(AgentEvent::StepComplete {
                        status: "completed".to_string(),
                        duration_ms: step_started.elapsed().as_millis() as u64,
                    });
                }
            }

            if let Some(percent) = turn.context_left_percent
                && self.compaction.should_compact(percent)
            {
                let _ = events.send(AgentEvent::CompactionStart);
                let compacted = self.compaction.compact(&mut messages);
                let _ = events.send(AgentEvent::CompactionComplete { compacted });
            }
        }
    }

    async fn dispatch_tool_call(
        &self,
        run_id: &str,
        tool_name: &str,
        args: &Value,
        tool_ctx: &ToolContext,
        events: &UnboundedSender<AgentEvent>,
    ) -> ToolDispatchResult {
        let Some(tool) = self.tools.get(tool_name) else {
            return ToolDispatchResult::Denied(format!("unknown tool {tool_name}"));
        };

        if tool.is_write_sensitive() {
            let preview = build_permission_preview(tool_name, args, tool_ctx).await;
            let _ = events.send(AgentEvent::PermissionPreview {
                tool: tool_name.to_string(),
                file_path: preview.file_path.clone(),
                language: preview.language.clone(),
                diff: preview.diff.clone(),
                summary: preview.summary.clone(),
                truncated: None,
            });

            let argv = command_argv(tool_name, args);
            let skill_name = args.get("name").and_then(Value::as_str);
            let decision = self.permissions.lock().await.evaluate(tool_name, &argv, skill_name);

            match decision {
                Decision::Deny(reason) => return ToolDispatchResult::Denied(reason),
                Decision::Allow => {}
                Decision::AskUser => {
                    let response = self
                        .ui
                        .confirm(UiConfirmRequest {
                            run_id: run_id.to_string(),
                            tool: tool_name.to_string(),
                            summary: preview.summary.clone(),
                            diff: preview.diff.clone(),
                        })
                        .await;

                    if !response.approved {
                        return ToolDispatchResult::Denied("denied by user".to_string());
                    }

                    if let Some(scope) = response.remember {
                        let rule = crate::permissions::PermissionRule {
                            tool: tool_name.to_string(),
                            command: argv.first().cloned(),
                            command_glob: None,
                            skill_name: skill_name.map(str::to_string),
                            decision: crate::permissions::RuleDecision::Allow,
                        };
                        let mut engine = self.permissions.lock().await;
                        match scope {
                            RememberScope::Session => {
                                engine.remember_session_rule(rule);
                            }
                            RememberScope::Project => {
                                if engine.remember_project_rule(rule) {
                                    let project_rules = engine.project_rules().to_vec();
                                    drop(engine);
                                    self.persist_project_rules(tool_ctx, project_rules).await;
                                }
                            }
                        }
                    }
                }
            }

            let _ = events.send(AgentEvent::PermissionReady {
                tool: tool_name.to_string(),
            });
        }

        let output = tool.execute(args.clone(), tool_ctx).await;
        ToolDispatchResult::Output(output)
    }

    /// Writes the full updated project rule list back to `projects.json`
    /// under this sandbox root's canonical key (spec §4.5). Failures are
    /// logged, not propagated — the in-memory rule was already remembered,
    /// so the run proceeds even if the disk write fails.
    async fn persist_project_rules(&self, tool_ctx: &ToolContext, rules: Vec<crate::permissions::PermissionRule>) {
        let key = crate::permissions::ProjectPolicyStore::canonical_key(tool_ctx.sandbox.root_dir());
        let mut file = match self.project_policy_store.load().await {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!("failed to load projects.json before persisting remembered rule: {e}");
                return;
            }
        };
        file.projects.entry(key).or_default().rules = rules;
        if let Err(e) = self.project_policy_store.save(&file).await {
            tracing::warn!("failed to persist remembered project rule: {e}");
        }
    }
}

enum ToolDispatchResult {
    Output(crate::tools::ToolOutput),
    Denied(String),
}

fn result_is_error_text(is_error: Option<bool>) -> String {
    if is_error.unwrap_or(false) {
        "tool call failed".to_string()
    } else {
        "tool call succeeded".to_string()
    }
}

/// Splits a `bash` tool's `command` into argv for permission matching;
/// falls back to a single-element argv for every other write-sensitive
/// tool (keyed by its declared file path, if any).
fn command_argv(tool_name: &str, args: &Value) -> Vec<String> {
    if tool_name == "bash" {
        let command = args.get("command").and_then(Value::as_str).unwrap_or("");
        return shlex::split(command).unwrap_or_else(|| vec![command.to_string()]);
    }
    args.get("file_path")
        .and_then(Value::as_str)
        .map(|p| vec![p.to_string()])
        .unwrap_or_default()
}

struct PermissionPreviewFields {
    file_path: Option<String>,
    language: Option<String>,
    diff: Option<String>,
    summary: Option<String>,
}

/// Builds a `permission.preview` (spec §4.4b): a diff for `edit`/`write`, a
/// command line for `bash`. The language hint resolves explicit override →
/// shebang → diff headers → file extension.
async fn build_permission_preview(
    tool_name: &str,
    args: &Value,
    tool_ctx: &ToolContext,
) -> PermissionPreviewFields {
    match tool_name {
        "bash" => {
            let command = args.get("command").and_then(Value::as_str).unwrap_or("").to_string();
            PermissionPreviewFields {
                file_path: None,
                language: Some("shell".to_string()),
                diff: None,
                summary: Some(command),
            }
        }
        "edit" => {
            let file_path = args.get("file_path").and_then(Value::as_str).map(str::to_string);
            let mut req: crate::edit::EditRequest = match serde_json::from_value(args.clone()) {
                Ok(req) => req,
                Err(_) => {
                    return PermissionPreviewFields {
                        file_path,
                        language: None,
                        diff: None,
                        summary: Some("edit".to_string()),
                    };
                }
            };
            req.dry_run = true;
            let diff = crate::edit::apply_edit(&tool_ctx.sandbox, req)
                .await
                .ok()
                .map(|result| result.diff);
            let language = resolve_language_hint(
                args.get("language").and_then(Value::as_str),
                args.get("new_string").and_then(Value::as_str),
                diff.as_deref(),
                file_path.as_deref(),
            );
            PermissionPreviewFields {
                file_path,
                language,
                diff,
                summary: Some("edit".to_string()),
            }
        }
        "write" => {
            let file_path = args.get("file_path").and_then(Value::as_str).map(str::to_string);
            let content = args.get("content").and_then(Value::as_str).unwrap_or("");
            let diff = match &file_path {
                Some(fp) => {
                    let existing = tool_ctx
                        .sandbox
                        .resolve(fp)
                        .ok()
                        .and_then(|p| std::fs::read_to_string(p).ok())
                        .unwrap_or_default();
                    Some(unified_diff_preview(&existing, content))
                }
                None => None,
            };
            let language = resolve_language_hint(
                args.get("language").and_then(Value::as_str),
                Some(content),
                diff.as_deref(),
                file_path.as_deref(),
            );
            PermissionPreviewFields {
                file_path,
                language,
                diff,
                summary: Some("write".to_string()),
            }
        }
        other => PermissionPreviewFields {
            file_path: None,
            language: None,
            diff: None,
            summary: Some(other.to_string()),
        },
    }
}

fn unified_diff_preview(before: &str, after: &str) -> String {
    similar::TextDiff::from_lines(before, after)
        .unified_diff()
        .context_radius(3)
        .to_string()
}

/// Explicit override → shebang → diff headers → file extension (spec
/// §4.4b).
fn resolve_language_hint(
    explicit: Option<&str>,
    new_content: Option<&str>,
    diff: Option<&str>,
    file_path: Option<&str>,
) -> Option<String> {
    if let Some(lang) = explicit {
        return Some(lang.to_string());
    }
    if let Some(first_line) = new_content.and_then(|c| c.lines().next())
        && let Some(lang) = language_from_shebang(first_line)
    {
        return Some(lang);
    }
    if let Some(diff) = diff
        && let Some(lang) = language_from_diff_header(diff)
    {
        return Some(lang);
    }
    file_path.and_then(language_from_extension)
}

fn language_from_shebang(line: &str) -> Option<String> {
    let line = line.strip_prefix("#!")?;
    if line.contains("python") {
        Some("python".to_string())
    } else if line.contains("bash") || line.contains("/sh") {
        Some("shell".to_string())
    } else if line.contains("node") {
        Some("javascript".to_string())
    } else {
        None
    }
}

fn language_from_diff_header(diff: &str) -> Option<String> {
    let header = diff.lines().find(|l| l.starts_with("+++ "))?;
    let path = header.trim_start_matches("+++ ").trim();
    language_from_extension(path)
}

fn language_from_extension(path: &str) -> Option<String> {
    let ext = Path::new(path).extension()?.to_str()?;
    let language = match ext {
        "rs" => "rust",
        "py" => "python",
        "js" | "mjs" => "javascript",
        "ts" | "tsx" => "typescript",
        "go" => "go",
        "sh" => "shell",
        "md" => "markdown",
        "toml" => "toml",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        _ => return None,
    };
    Some(language.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp_manager::McpConnectionManager;
    use crate::sandbox::Sandbox;
    use crate::skills::SkillsCatalog;
    use crate::tool_output_cache::ToolOutputCache;
    use crate::tool_output_cache::ToolOutputCacheConfig;
    use crate::chat_model::ChatModelError;
    use crate::chat_model::ChatTurn;
    use crate::chat_model::ToolCallRequest;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    struct StubModel {
        call_count: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ChatModel for StubModel {
        fn model_id(&self) -> &str {
            "stub"
        }

        async fn run_turn(
            &self,
            _request: ChatRequest,
            on_delta: &(dyn Fn(ChatDelta) + Send + Sync),
            _cancel: &CancellationToken,
        ) -> Result<ChatTurn, ChatModelError> {
            let call = self.call_count.fetch_add(1, Ordering::SeqCst);
            if call == 0 {
                on_delta(ChatDelta::Text("thinking".to_string()));
                return Ok(ChatTurn {
                    completion: Completion::Text("all done".to_string()),
                    usage: UsageDelta::default(),
                    context_left_percent: None,
                });
            }
            unreachable!("stub model only expects one turn in this test")
        }
    }

    struct AutoApproveUi;

    #[async_trait::async_trait]
    impl UiChannel for AutoApproveUi {
        async fn confirm(&self, _request: UiConfirmRequest) -> UiConfirmResponse {
            UiConfirmResponse {
                approved: true,
                remember: None,
            }
        }
    }

    async fn tool_ctx_in(tmp: &tempfile::TempDir) -> ToolContext {
        let sandbox = Sandbox::new(tmp.path().to_path_buf(), tmp.path().to_path_buf()).expect("sandbox");
        let skills = SkillsCatalog::build(tmp.path(), tmp.path(), None).await.expect("skills");
        ToolContext {
            sandbox: Arc::new(sandbox),
            cache: Arc::new(ToolOutputCache::new(ToolOutputCacheConfig::default())),
            cancel: CancellationToken::new(),
            mcp: Arc::new(McpConnectionManager::default()),
            skills: Arc::new(AsyncMutex::new(skills)),
        }
    }

    #[tokio::test]
    async fn text_only_turn_emits_final_and_completes() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let tool_ctx = tool_ctx_in(&tmp).await;
        let agent_loop = AgentLoop {
            model: Arc::new(StubModel {
                call_count: AtomicUsize::new(0),
            }),
            tools: Arc::new(ToolRegistry::with_builtins(tool_ctx.sandbox.clone())),
            permissions: Arc::new(AsyncMutex::new(PermissionEngine::new(
                crate::permissions::ApprovalMode::FullAccess,
                Vec::new(),
                Vec::new(),
            ))),
            ui: Arc::new(AutoApproveUi),
            compaction: Arc::new(NoopCompactionPolicy),
            project_policy_store: Arc::new(crate::permissions::ProjectPolicyStore::new(
                tmp.path().join("projects.json"),
            )),
        };

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let outcome = agent_loop
            .run(
                RunRequest {
                    run_id: "run-1".to_string(),
                    model_id: "stub".to_string(),
                    messages: vec![ChatMessage::text(Role::User, "hi")],
                },
                tool_ctx,
                tx,
            )
            .await;

        assert_eq!(
            outcome,
            LoopOutcome::Completed {
                final_text: "all done".to_string()
            }
        );

        let mut collected = Vec::new();
        while let Ok(event) = rx.try_recv() {
            collected.push(event);
        }
        assert!(collected.iter().any(|e| matches!(e, AgentEvent::Text { .. })));
        assert!(collected.last().map(|e| e.is_final()).unwrap_or(false));
        assert!(crate::events::validate_ordering(&collected).is_ok());
    }

    struct FailingModel;

    #[async_trait::async_trait]
    impl ChatModel for FailingModel {
        fn model_id(&self) -> &str {
            "stub"
        }

        async fn run_turn(
            &self,
            _request: ChatRequest,
            _on_delta: &(dyn Fn(ChatDelta) + Send + Sync),
            _cancel: &CancellationToken,
        ) -> Result<ChatTurn, ChatModelError> {
            Err(ChatModelError::Provider("upstream exploded".to_string()))
        }
    }

    #[tokio::test]
    async fn provider_failure_surfaces_as_error_not_cancelled() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let tool_ctx = tool_ctx_in(&tmp).await;
        let agent_loop = AgentLoop {
            model: Arc::new(FailingModel),
            tools: Arc::new(ToolRegistry::with_builtins(tool_ctx.sandbox.clone())),
            permissions: Arc::new(AsyncMutex::new(PermissionEngine::new(
                crate::permissions::ApprovalMode::FullAccess,
                Vec::new(),
                Vec::new(),
            ))),
            ui: Arc::new(AutoApproveUi),
            compaction: Arc::new(NoopCompactionPolicy),
            project_policy_store: Arc::new(crate::permissions::ProjectPolicyStore::new(
                tmp.path().join("projects.json"),
            )),
        };

        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let outcome = agent_loop
            .run(
                RunRequest {
                    run_id: "run-1".to_string(),
                    model_id: "stub".to_string(),
                    messages: vec![ChatMessage::text(Role::User, "hi")],
                },
                tool_ctx,
                tx,
            )
            .await;

        assert_eq!(
            outcome,
            LoopOutcome::Error {
                message: "upstream exploded".to_string()
            }
        );
    }

    struct ToolCallThenDoneModel {
        call_count: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ChatModel for ToolCallThenDoneModel {
        fn model_id(&self) -> &str {
            "stub"
        }

        async fn run_turn(
            &self,
            _request: ChatRequest,
            _on_delta: &(dyn Fn(ChatDelta) + Send + Sync),
            _cancel: &CancellationToken,
        ) -> Result<ChatTurn, ChatModelError> {
            let call = self.call_count.fetch_add(1, Ordering::SeqCst);
            if call == 0 {
                return Ok(ChatTurn {
                    completion: Completion::ToolCalls(vec![ToolCallRequest {
                        tool_call_id: "call-1".to_string(),
                        tool: "write".to_string(),
                        raw_args: "{}".to_string(),
                        args: serde_json::json!({"file_path": "f.txt", "content": "hi"}),
                    }]),
                    usage: UsageDelta::default(),
                    context_left_percent: None,
                });
            }
            Ok(ChatTurn {
                completion: Completion::Text("done".to_string()),
                usage: UsageDelta::default(),
                context_left_percent: None,
            })
        }
    }

    struct RememberProjectUi;

    #[async_trait::async_trait]
    impl UiChannel for RememberProjectUi {
        async fn confirm(&self, _request: UiConfirmRequest) -> UiConfirmResponse {
            UiConfirmResponse {
                approved: true,
                remember: Some(RememberScope::Project),
            }
        }
    }

    #[tokio::test]
    async fn remembered_project_approval_persists_to_projects_json() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let tool_ctx = tool_ctx_in(&tmp).await;
        let project_policy_store = Arc::new(crate::permissions::ProjectPolicyStore::new(
            tmp.path().join("projects.json"),
        ));
        let agent_loop = AgentLoop {
            model: Arc::new(ToolCallThenDoneModel {
                call_count: AtomicUsize::new(0),
            }),
            tools: Arc::new(ToolRegistry::with_builtins(tool_ctx.sandbox.clone())),
            permissions: Arc::new(AsyncMutex::new(PermissionEngine::new(
                crate::permissions::ApprovalMode::Minimal,
                Vec::new(),
                Vec::new(),
            ))),
            ui: Arc::new(RememberProjectUi),
            compaction: Arc::new(NoopCompactionPolicy),
            project_policy_store: project_policy_store.clone(),
        };

        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let outcome = agent_loop
            .run(
                RunRequest {
                    run_id: "run-1".to_string(),
                    model_id: "stub".to_string(),
                    messages: vec![ChatMessage::text(Role::User, "hi")],
                },
                tool_ctx,
                tx,
            )
            .await;

        assert_eq!(outcome, LoopOutcome::Completed { final_text: "done".to_string() });

        let key = crate::permissions::ProjectPolicyStore::canonical_key(tmp.path());
        let file = project_policy_store.load().await.expect("load projects.json");
        let rules = &file.projects.get(&key).expect("project entry persisted").rules;
        assert!(rules.iter().any(|r| r.tool == "write"));
    }

    #[test]
    fn language_hint_prefers_explicit_override() {
        let hint = resolve_language_hint(Some("rust"), Some("#!/usr/bin/env python"), None, Some("a.py"));
        assert_eq!(hint.as_deref(), Some("rust"));
    }

    #[test]
    fn language_hint_falls_back_to_shebang_then_extension() {
        let from_shebang = resolve_language_hint(None, Some("#!/usr/bin/env python\nprint(1)"), None, None);
        assert_eq!(from_shebang.as_deref(), Some("python"));

        let from_extension = resolve_language_hint(None, Some("fn main() {}"), None, Some("main.rs"));
        assert_eq!(from_extension.as_deref(), Some("rust"));
    }
}
