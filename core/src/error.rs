//! Typed library errors (spec §7), grounded on the teacher's `CodexErr`
//! pattern: one `thiserror` enum per subsystem, `#[from]` conversions for the
//! externalities each subsystem actually touches, and a shared `RuntimeError`
//! that the agent loop and orchestrator match on to choose a recovery path
//! (tool-local text failure vs. `run.status=error`).

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("path escapes sandbox root: {path}")]
    PathEscape { path: PathBuf },
    #[error("failed to resolve path {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum EditError {
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),
    #[error("content changed on disk since expected_hash was computed")]
    HashMismatch,
    #[error("{count} matches found for old_string; pass replace_all or narrow the match")]
    Ambiguous { count: usize },
    #[error("expected {expected} replacements but found {actual}")]
    CountMismatch { expected: usize, actual: usize },
    #[error("no match for old_string in {path}")]
    NoMatch { path: PathBuf },
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum PermissionError {
    #[error("invalid approval mode {value:?} from {source_name}")]
    InvalidMode {
        value: String,
        source_name: &'static str,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("failed to (de)serialize projects.json: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("session not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config at {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: Box<toml::de::Error>,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum SkillError {
    #[error("malformed frontmatter in {0}")]
    MalformedFrontmatter(PathBuf),
    #[error("skill name {name:?} in {path} must match directory name and ^[a-z0-9]+(-[a-z0-9]+)*$")]
    InvalidName { name: String, path: PathBuf },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Top-level union the agent loop and orchestrator match on (spec §7).
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
    #[error(transparent)]
    Edit(#[from] EditError),
    #[error(transparent)]
    Permission(#[from] PermissionError),
    #[error(transparent)]
    Session(#[from] SessionStoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Skill(#[from] SkillError),
    #[error(transparent)]
    Mcp(#[from] codelia_mcp_client::McpClientError),
    #[error("cancelled")]
    Cancelled,
    #[error("internal error: {0}")]
    Internal(String),
}

/// Renders the `"Security error: …"` / `"Permission denied: …"` text-failure
/// prefixes spec §7 requires for tool-local (non-fatal) errors.
pub fn tool_failure_text(err: &RuntimeError) -> String {
    match err {
        RuntimeError::Sandbox(e) => format!("Security error: {e}"),
        RuntimeError::Permission(e) => format!("Permission denied: {e}"),
        RuntimeError::Edit(e) => format!("Error: {e}"),
        other => format!("Error: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sandbox_escape_renders_security_error_prefix() {
        let err = RuntimeError::Sandbox(SandboxError::PathEscape {
            path: PathBuf::from("/tmp/s/../etc/passwd"),
        });
        assert!(tool_failure_text(&err).starts_with("Security error: "));
    }

    #[test]
    fn permission_denial_renders_permission_denied_prefix() {
        let err = RuntimeError::Permission(PermissionError::InvalidMode {
            value: "bogus".to_string(),
            source_name: "cli",
        });
        assert!(tool_failure_text(&err).starts_with("Permission denied: "));
    }
}
