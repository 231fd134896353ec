//! `RuntimeEnv`: the single snapshot of ambient environment threaded through
//! construction (spec §9 "global process env -> a RuntimeEnv value"),
//! replacing the teacher's scattered `std::env::var` reads in `config.rs`.
//!
//! Built once at process start from CLI args > env > defaults. Immutable
//! after construction except for the `model` slot, which `model.set` hot
//! swaps via `ArcSwap` (spec §9's one sanctioned hot-reload path).

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::sandbox::Sandbox;
use crate::storage::StorageLayout;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub provider: String,
    pub model: String,
}

impl Default for ModelSelection {
    fn default() -> Self {
        Self {
            provider: "default".to_string(),
            model: "default".to_string(),
        }
    }
}

/// Ambient environment snapshot. Construct once with [`RuntimeEnv::build`];
/// every subsystem (sandbox, config, permission engine, MCP manager) takes
/// a `&RuntimeEnv` rather than reading the process environment directly.
pub struct RuntimeEnv {
    pub sandbox: Sandbox,
    pub storage: StorageLayout,
    pub model: ArcSwap<ModelSelection>,
}

impl RuntimeEnv {
    /// `sandbox_root` defaults to the process CWD unless `CODELIA_SANDBOX_ROOT`
    /// is set (spec §6, an absolute-path override). `codelia_home` defaults
    /// to `~/.codelia` unless `CODELIA_HOME` is set (spec §9's StorageLayout).
    pub fn build(cwd: &Path, env: impl Fn(&str) -> Option<String>) -> std::io::Result<Self> {
        let sandbox_root = match env("CODELIA_SANDBOX_ROOT") {
            Some(v) => PathBuf::from(v),
            None => cwd.to_path_buf(),
        };
        let sandbox = Sandbox::new(sandbox_root, cwd.to_path_buf())?;

        let codelia_home = match env("CODELIA_HOME") {
            Some(v) => PathBuf::from(v),
            None => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".codelia"),
        };
        let storage = StorageLayout::new(codelia_home);

        Ok(Self {
            sandbox,
            storage,
            model: ArcSwap::from_pointee(ModelSelection::default()),
        })
    }

    pub fn set_model(&self, selection: ModelSelection) {
        self.model.store(Arc::new(selection));
    }

    pub fn model(&self) -> Arc<ModelSelection> {
        self.model.load_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sandbox_root_env_override_wins_over_cwd() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let root = tmp.path().join("root");
        std::fs::create_dir_all(&root).expect("mkdir");
        let root_str = root.to_string_lossy().to_string();

        let env = RuntimeEnv::build(tmp.path(), |k| {
            if k == "CODELIA_SANDBOX_ROOT" {
                Some(root_str.clone())
            } else {
                None
            }
        })
        .expect("build env");

        assert_eq!(
            env.sandbox.root_dir().canonicalize().expect("canon"),
            root.canonicalize().expect("canon")
        );
    }

    #[test]
    fn model_set_is_hot_swapped() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let env = RuntimeEnv::build(tmp.path(), |_| None).expect("build env");
        assert_eq!(env.model().model, "default");
        env.set_model(ModelSelection {
            provider: "acme".to_string(),
            model: "acme-large".to_string(),
        });
        assert_eq!(env.model().model, "acme-large");
    }
}
