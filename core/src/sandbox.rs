//! Path guard (spec §4.1). Grounded on the writable-roots containment check
//! in the teacher's `safety.rs::is_write_patch_constrained_to_writable_paths`,
//! generalized into a standalone value type every tool resolves through,
//! not just the patch path.
//!
//! `Sandbox` carries no mutable state once constructed and is safe to share
//! across concurrently running tool calls (spec §4.1: "No mutable state;
//! safe for concurrent use").

use std::path::Path;
use std::path::PathBuf;

use crate::error::SandboxError;

#[derive(Debug, Clone)]
pub struct Sandbox {
    root_dir: PathBuf,
    working_dir: PathBuf,
}

impl Sandbox {
    /// Canonicalizes `root_dir` up front so every later `resolve()` call
    /// compares against a realpath, not a path that may itself contain
    /// symlinks.
    pub fn new(root_dir: PathBuf, working_dir: PathBuf) -> std::io::Result<Self> {
        let root_dir = canonicalize_best_effort(&root_dir)?;
        Ok(Self {
            root_dir,
            working_dir,
        })
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Resolves `target` against the sandbox root, following symlinks and
    /// re-checking containment against the realpath (spec §4.1: "Symlink
    /// traversal must resolve with the same containment check applied to
    /// the realpath").
    ///
    /// `target` need not exist: non-existent trailing components are joined
    /// onto the canonicalized existing prefix before the containment check,
    /// so `resolve()` also works for paths about to be created (`write`,
    /// edit-tool creation).
    pub fn resolve(&self, target: impl AsRef<Path>) -> Result<PathBuf, SandboxError> {
        let target = target.as_ref();
        let joined = if target.is_absolute() {
            target.to_path_buf()
        } else {
            self.working_dir.join(target)
        };

        let canonical = canonicalize_best_effort(&joined).map_err(|source| SandboxError::Io {
            path: joined.clone(),
            source,
        })?;

        self.check_contained(&canonical)?;
        Ok(canonical)
    }

    fn check_contained(&self, canonical: &Path) -> Result<(), SandboxError> {
        match canonical.strip_prefix(&self.root_dir) {
            Ok(_) => Ok(()),
            Err(_) => Err(SandboxError::PathEscape {
                path: canonical.to_path_buf(),
            }),
        }
    }
}

/// Canonicalizes the longest existing prefix of `path`, then re-appends the
/// remaining (not-yet-existing) components unchanged. This lets `resolve`
/// succeed for paths that are about to be created while still resolving
/// symlinks in the part of the path that does exist.
fn canonicalize_best_effort(path: &Path) -> std::io::Result<PathBuf> {
    let mut existing = path.to_path_buf();
    let mut remainder: Vec<std::ffi::OsString> = Vec::new();

    loop {
        match existing.canonicalize() {
            Ok(canon) => {
                let mut result = canon;
                for comp in remainder.into_iter().rev() {
                    result.push(comp);
                }
                return Ok(result);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let Some(file_name) = existing.file_name() else {
                    return Err(e);
                };
                remainder.push(file_name.to_os_string());
                if !existing.pop() {
                    return Err(e);
                }
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_relative_path_inside_root_succeeds() {
        let tmp = tempfile::tempdir().expect("tempdir");
        std::fs::write(tmp.path().join("a.txt"), "hi").expect("write");

        let sandbox = Sandbox::new(tmp.path().to_path_buf(), tmp.path().to_path_buf())
            .expect("sandbox");
        let resolved = sandbox.resolve("a.txt").expect("resolve");
        assert_eq!(resolved, tmp.path().join("a.txt").canonicalize().expect("canon"));
    }

    #[test]
    fn resolve_escaping_parent_dir_fails_with_path_escape() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let root = tmp.path().join("s");
        std::fs::create_dir_all(&root).expect("mkdir");

        let sandbox = Sandbox::new(root.clone(), root.clone()).expect("sandbox");
        let err = sandbox.resolve("../etc/passwd").expect_err("should escape");
        assert!(matches!(err, SandboxError::PathEscape { .. }));
    }

    #[test]
    fn resolve_allows_paths_about_to_be_created() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let sandbox = Sandbox::new(tmp.path().to_path_buf(), tmp.path().to_path_buf())
            .expect("sandbox");
        let resolved = sandbox.resolve("new/nested/file.txt").expect("resolve");
        assert!(resolved.starts_with(sandbox.root_dir()));
    }

    #[test]
    #[cfg(unix)]
    fn resolve_follows_symlink_and_checks_realpath() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let root = tmp.path().join("root");
        let outside = tmp.path().join("outside");
        std::fs::create_dir_all(&root).expect("mkdir root");
        std::fs::create_dir_all(&outside).expect("mkdir outside");
        std::fs::write(outside.join("secret.txt"), "nope").expect("write");

        std::os::unix::fs::symlink(&outside, root.join("link")).expect("symlink");

        let sandbox = Sandbox::new(root.clone(), root.clone()).expect("sandbox");
        let err = sandbox
            .resolve("link/secret.txt")
            .expect_err("symlink escape should fail");
        assert!(matches!(err, SandboxError::PathEscape { .. }));
    }
}
