//! Construction and run loop for the `codelia` binary: parses flags, builds
//! every shared component (`RuntimeEnv`, permission engine, MCP manager,
//! tool registry, SKILLS/AGENTS resolvers, session store) and hands them to
//! an [`orchestrator::Orchestrator`] driven by the stdio transport.

pub mod cli_args;
pub mod model_stub;
pub mod orchestrator;
pub mod outgoing;
pub mod transport;
pub mod ui_channel;

use std::sync::Arc;

use codelia_core::agents_md::AgentsResolver;
use codelia_core::chat_model::ChatModel;
use codelia_core::config;
use codelia_core::config::ConfigSources;
use codelia_core::mcp_auth_store::McpAuthStore;
use codelia_core::mcp_manager::McpConnectionManager;
use codelia_core::permissions;
use codelia_core::permissions::PermissionEngine;
use codelia_core::permissions::ProjectPolicyStore;
use codelia_core::runtime_env::ModelSelection;
use codelia_core::runtime_env::RuntimeEnv;
use codelia_core::session_store::SessionStore;
use codelia_core::skills::SkillsCatalog;
use codelia_core::tool_output_cache::ToolOutputCache;
use codelia_core::tools::ToolRegistry;
use tokio::sync::Mutex as AsyncMutex;
use tracing::info;
use tracing::warn;

use crate::cli_args::Cli;
use crate::model_stub::NullChatModel;
use crate::orchestrator::Orchestrator;
use crate::outgoing::OutgoingSender;

/// Env lookup used by [`RuntimeEnv::build`]: CLI flags win over the process
/// environment (spec §4.5's precedence list applies the same "cli beats env"
/// rule to the sandbox root and home dir overrides).
fn env_lookup(cli: &Cli, key: &str) -> Option<String> {
    match key {
        "CODELIA_SANDBOX_ROOT" => cli
            .sandbox_root
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
            .or_else(|| std::env::var(key).ok()),
        "CODELIA_HOME" => cli
            .codelia_home
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
            .or_else(|| std::env::var(key).ok()),
        _ => std::env::var(key).ok(),
    }
}

pub async fn run_main(cli: Cli) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cwd = std::env::current_dir()?;
    let runtime_env = Arc::new(RuntimeEnv::build(&cwd, |key| env_lookup(&cli, key))?);

    if cli.provider.is_some() || cli.model.is_some() {
        let current = runtime_env.model();
        runtime_env.set_model(ModelSelection {
            provider: cli.provider.clone().unwrap_or_else(|| current.provider.clone()),
            model: cli.model.clone().unwrap_or_else(|| current.model.clone()),
        });
    }

    let mut seed_resolver = AgentsResolver::default();
    let repo_root = seed_resolver.find_project_root(&cwd);

    let config_layer = config::load_merged(ConfigSources {
        global_path: runtime_env.storage.config_path(),
        project_path: Some(repo_root.join(".codelia").join("config.toml")),
        session_override: None,
    })
    .await?;

    let project_policy_store = Arc::new(ProjectPolicyStore::new(runtime_env.storage.projects_path()));
    let project_key = ProjectPolicyStore::canonical_key(runtime_env.sandbox.root_dir());
    let projects_file = project_policy_store.load().await?;
    let project_policy = projects_file.projects.get(&project_key).cloned().unwrap_or_default();

    let resolved_mode = permissions::resolve_approval_mode(
        cli.approval_mode.as_deref(),
        std::env::var("CODELIA_APPROVAL_MODE").ok().as_deref(),
        project_policy.approval_mode,
        config_layer.permissions.approval_mode,
        None,
    )?;
    info!(
        mode = ?resolved_mode.mode,
        source = resolved_mode.source.as_str(),
        "resolved approval mode"
    );

    let permissions_engine = PermissionEngine::new(resolved_mode.mode, Vec::new(), project_policy.rules);
    let permissions = Arc::new(AsyncMutex::new(permissions_engine));

    let (mcp, mcp_start_errors) = McpConnectionManager::new(config_layer.mcp_servers.clone()).await?;
    for (server, err) in &mcp_start_errors {
        warn!("MCP server '{server}' failed to start: {err:#}");
    }
    let mcp = Arc::new(mcp);

    let mut tool_registry = ToolRegistry::with_builtins(Arc::new(runtime_env.sandbox.clone()));
    tool_registry.sync_mcp_tools(&mcp);
    let tools = Arc::new(tool_registry);

    let home_dir = dirs::home_dir();
    let skills_catalog = SkillsCatalog::build(&repo_root, &cwd, home_dir.as_deref()).await?;
    let skills = Arc::new(AsyncMutex::new(skills_catalog));

    let session_store = Arc::new(SessionStore::new(runtime_env.storage.clone()));
    let agents_resolver = Arc::new(AsyncMutex::new(seed_resolver));
    let auth_store = Arc::new(McpAuthStore::new(runtime_env.storage.mcp_auth_path()));

    let model_id = runtime_env.model().model.clone();
    let model: Arc<dyn ChatModel> = Arc::new(NullChatModel::new(model_id));

    let (mut incoming_rx, outgoing_tx, stdin_handle, stdout_handle) = transport::spawn_stdio_pipeline();
    let outgoing = Arc::new(OutgoingSender::new(outgoing_tx));
    let tool_output_cache = Arc::new(ToolOutputCache::new(Default::default()));

    let orchestrator = Arc::new(Orchestrator::new(
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
    ));

    while let Some(msg) = incoming_rx.recv().await {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            orchestrator.handle_message(msg).await;
        });
    }

    drop(stdin_handle);
    stdout_handle.await?;
    Ok(())
}
