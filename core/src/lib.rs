//! Root of the `codelia-core` library: sandbox, edit engine, tool set,
//! permission engine, AGENTS/SKILLS resolvers, session store, and the agent
//! loop that drives a run.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod agent_loop;
pub mod agents_md;
pub mod chat_model;
pub mod config;
pub mod edit;
pub mod error;
pub mod events;
pub mod mcp_auth_store;
pub mod mcp_manager;
pub mod mcp_server_config;
pub mod permissions;
pub mod runtime_env;
pub mod sandbox;
pub mod session_store;
pub mod skills;
pub mod storage;
pub mod tool_output_cache;
pub mod tools;
