//! `mcp-auth.json`: per-server OAuth token storage (spec §6). Grounded on
//! `permissions::ProjectPolicyStore`'s load/merge/atomic-save shape, applied
//! to the token map instead of the permission-rule map.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::error::ConfigError;
use crate::storage::atomic_write;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct McpAuthEntry {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct McpAuthFile {
    #[serde(flatten)]
    pub servers: HashMap<String, McpAuthEntry>,
}

pub struct McpAuthStore {
    path: PathBuf,
}

impl McpAuthStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub async fn load(&self) -> Result<McpAuthFile, ConfigError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| ConfigError::Io(std::io::Error::other(e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(McpAuthFile::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, file: &McpAuthFile) -> Result<(), ConfigError> {
        let bytes = serde_json::to_vec_pretty(file).map_err(std::io::Error::other)?;
        atomic_write(&self.path, &bytes).await?;
        Ok(())
    }

    pub async fn upsert(&self, server: &str, entry: McpAuthEntry) -> Result<(), ConfigError> {
        let mut file = self.load().await?;
        file.servers.insert(server.to_string(), entry);
        self.save(&file).await
    }

    /// Removes one server's stored tokens (`auth.logout`); a no-op if the
    /// server has no stored entry.
    pub async fn remove(&self, server: &str) -> Result<bool, ConfigError> {
        let mut file = self.load().await?;
        let removed = file.servers.remove(server).is_some();
        if removed {
            self.save(&file).await?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_then_remove_round_trips() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = McpAuthStore::new(tmp.path().join("mcp-auth.json"));

        store
            .upsert(
                "github",
                McpAuthEntry {
                    access_token: "tok".to_string(),
                    refresh_token: None,
                    expires_at: None,
                    scope: None,
                    token_type: None,
                },
            )
            .await
            .expect("upsert");

        let file = store.load().await.expect("load");
        assert!(file.servers.contains_key("github"));

        let removed = store.remove("github").await.expect("remove");
        assert!(removed);

        let file = store.load().await.expect("load after remove");
        assert!(!file.servers.contains_key("github"));
    }

    #[tokio::test]
    async fn removing_unknown_server_is_a_noop() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = McpAuthStore::new(tmp.path().join("mcp-auth.json"));
        let removed = store.remove("nope").await.expect("remove");
        assert!(!removed);
    }
}
