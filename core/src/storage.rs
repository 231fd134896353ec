//! Resolves the on-disk layout under `CODELIA_HOME` (default `~/.codelia`)
//! and provides the atomic-write-at-0600 helper every persisted-state file
//! in spec §6 goes through (`config.json`, `projects.json`, `mcp-auth.json`,
//! the session journals, the tool-output cache).
//!
//! Grounded on the teacher's `codex_dir()` / atomic rollout-write pattern in
//! `config.rs` and `rollout.rs`, generalized to the several files spec §6
//! names instead of one conversation-history directory.

use std::path::Path;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct StorageLayout {
    home: PathBuf,
}

impl StorageLayout {
    pub fn new(home: PathBuf) -> Self {
        Self { home }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn config_path(&self) -> PathBuf {
        self.home.join("config.json")
    }

    pub fn projects_path(&self) -> PathBuf {
        self.home.join("projects.json")
    }

    pub fn mcp_auth_path(&self) -> PathBuf {
        self.home.join("mcp-auth.json")
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.home.join("sessions")
    }

    pub fn session_index_path(&self) -> PathBuf {
        self.sessions_dir().join("state.json")
    }

    pub fn tool_output_cache_dir(&self) -> PathBuf {
        self.home.join("cache").join("tool-output")
    }
}

/// Atomic write-then-rename at mode `0600` on POSIX (spec §5/§6). Writes a
/// tempfile in the same directory as `path` (so the rename is same-filesystem)
/// and only replaces `path` once the write+flush succeeds.
pub async fn atomic_write(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let tmp_name = format!(
        ".{}.tmp-{}",
        path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "atomic".to_string()),
        uuid::Uuid::new_v4()
    );
    let tmp_path = dir.join(tmp_name);

    {
        use tokio::io::AsyncWriteExt;
        let mut file = tokio::fs::File::create(&tmp_path).await?;
        file.write_all(contents).await?;
        file.flush().await?;
        file.sync_all().await?;
    }

    set_owner_only_permissions(&tmp_path).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

#[cfg(unix)]
async fn set_owner_only_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let perms = std::fs::Permissions::from_mode(0o600);
    tokio::fs::set_permissions(path, perms).await
}

#[cfg(not(unix))]
async fn set_owner_only_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn atomic_write_replaces_file_contents() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("projects.json");

        atomic_write(&path, b"{\"a\":1}").await.expect("write 1");
        atomic_write(&path, b"{\"a\":2}").await.expect("write 2");

        let contents = tokio::fs::read_to_string(&path).await.expect("read");
        assert_eq!(contents, "{\"a\":2}");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).expect("meta").permissions().mode() & 0o777;
            assert_eq!(mode, 0o600);
        }
    }

    #[test]
    fn storage_layout_paths_nest_under_home() {
        let layout = StorageLayout::new(PathBuf::from("/home/u/.codelia"));
        assert_eq!(
            layout.session_index_path(),
            PathBuf::from("/home/u/.codelia/sessions/state.json")
        );
        assert_eq!(
            layout.tool_output_cache_dir(),
            PathBuf::from("/home/u/.codelia/cache/tool-output")
        );
    }
}
