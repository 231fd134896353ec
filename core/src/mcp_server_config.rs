//! `McpServerConfig` (spec §3): a tagged union of the two transports. Grounded
//! on the teacher's minimal `{command, args, env}` stdio-only shape, expanded
//! to the `{http, ...} | {stdio, ...}` union spec §3 names, including the
//! OAuth refresh configuration (tokens live separately in `mcp-auth.json`).

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OAuthConfig {
    pub token_url: String,
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum McpServerConfig {
    Http {
        url: String,
        #[serde(default)]
        headers: Option<HashMap<String, String>>,
        #[serde(default)]
        request_timeout_ms: Option<u64>,
        #[serde(default)]
        oauth: Option<OAuthConfig>,
    },
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        cwd: Option<PathBuf>,
        #[serde(default)]
        env: Option<HashMap<String, String>>,
        #[serde(default)]
        request_timeout_ms: Option<u64>,
        #[serde(default)]
        oauth: Option<OAuthConfig>,
    },
}

impl McpServerConfig {
    pub fn request_timeout_ms(&self) -> Option<u64> {
        match self {
            McpServerConfig::Http { request_timeout_ms, .. }
            | McpServerConfig::Stdio { request_timeout_ms, .. } => *request_timeout_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stdio_variant_deserializes_from_toml() {
        let toml_str = r#"
            transport = "stdio"
            command = "my-mcp-server"
            args = ["--flag"]
        "#;
        let config: McpServerConfig = toml::from_str(toml_str).expect("parse");
        assert!(matches!(config, McpServerConfig::Stdio { command, .. } if command == "my-mcp-server"));
    }

    #[test]
    fn http_variant_deserializes_from_toml() {
        let toml_str = r#"
            transport = "http"
            url = "https://example.com/mcp"
        "#;
        let config: McpServerConfig = toml::from_str(toml_str).expect("parse");
        assert!(matches!(config, McpServerConfig::Http { .. }));
    }
}
