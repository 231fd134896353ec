//! AGENTS.md chain resolver (spec §4.7). Grounded on `project_doc.rs`'s
//! `.git`-rooted upward walk and byte-cap truncation, generalized from
//! "first file found" to the full root->cwd concatenated chain plus
//! mtime-keyed dedup and `resolveForPath` reminders the spec requires.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::time::SystemTime;

const FILE_NAME: &str = "AGENTS.md";
const DEFAULT_MARKERS: &[&str] = &[".codelia", ".git", ".jj"];

#[derive(Debug, Clone)]
pub struct LoadedDoc {
    pub path: PathBuf,
    pub contents: String,
    pub mtime: SystemTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderReason {
    New,
    Updated,
}

#[derive(Debug, Clone)]
pub struct SystemReminder {
    pub path: PathBuf,
    pub reason: ReminderReason,
}

pub struct AgentsResolver {
    markers: Vec<String>,
    max_files: usize,
    max_total_bytes: usize,
    loaded: HashMap<PathBuf, SystemTime>,
}

impl Default for AgentsResolver {
    fn default() -> Self {
        Self {
            markers: DEFAULT_MARKERS.iter().map(|s| s.to_string()).collect(),
            max_files: 16,
            max_total_bytes: 256 * 1024,
            loaded: HashMap::new(),
        }
    }
}

impl AgentsResolver {
    pub fn with_limits(max_files: usize, max_total_bytes: usize) -> Self {
        Self {
            max_files,
            max_total_bytes,
            ..Self::default()
        }
    }

    /// Walks upward from `cwd` until a marker directory/file is found or the
    /// filesystem root is reached, returning the detected project root.
    pub fn find_project_root(&self, cwd: &Path) -> PathBuf {
        let mut dir = cwd.canonicalize().unwrap_or_else(|_| cwd.to_path_buf());
        loop {
            if self.markers.iter().any(|m| dir.join(m).exists()) {
                return dir;
            }
            match dir.parent() {
                Some(parent) => dir = parent.to_path_buf(),
                None => return cwd.to_path_buf(),
            }
        }
    }

    /// Loads every `AGENTS.md` from the project root down to `cwd`,
    /// concatenating them in root->cwd order until the file-count or
    /// total-byte caps are reached (spec §4.7).
    pub async fn load_chain(&mut self, cwd: &Path) -> std::io::Result<Vec<LoadedDoc>> {
        let root = self.find_project_root(cwd);
        let chain = directory_chain(&root, cwd);

        let mut docs = Vec::new();
        let mut total_bytes = 0usize;

        for dir in chain {
            if docs.len() >= self.max_files {
                break;
            }
            let candidate = dir.join(FILE_NAME);
            let Ok(metadata) = tokio::fs::metadata(&candidate).await else {
                continue;
            };
            let mtime = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            let contents = tokio::fs::read_to_string(&candidate).await?;
            if contents.trim().is_empty() {
                continue;
            }

            let remaining = self.max_total_bytes.saturating_sub(total_bytes);
            if remaining == 0 {
                break;
            }
            let truncated: String = contents.chars().take(remaining).collect();
            total_bytes += truncated.len();

            let canonical = candidate.canonicalize().unwrap_or(candidate);
            self.loaded.insert(canonical.clone(), mtime);
            docs.push(LoadedDoc {
                path: canonical,
                contents: truncated,
                mtime,
            });
        }

        Ok(docs)
    }

    /// Reports any `AGENTS.md` along the chain to `path` that is new or
    /// whose mtime changed since `load_chain` last saw it (spec §4.7).
    pub async fn resolve_for_path(&mut self, path: &Path) -> std::io::Result<Vec<SystemReminder>> {
        let root = self.find_project_root(path);
        let base = if path.is_dir() {
            path.to_path_buf()
        } else {
            path.parent().map(Path::to_path_buf).unwrap_or_else(|| path.to_path_buf())
        };
        let chain = directory_chain(&root, &base);

        let mut reminders = Vec::new();
        for dir in chain {
            let candidate = dir.join(FILE_NAME);
            let Ok(metadata) = tokio::fs::metadata(&candidate).await else {
                continue;
            };
            let mtime = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            let canonical = candidate.canonicalize().unwrap_or(candidate);

            match self.loaded.get(&canonical) {
                None => {
                    reminders.push(SystemReminder {
                        path: canonical.clone(),
                        reason: ReminderReason::New,
                    });
                }
                Some(prev) if *prev != mtime => {
                    reminders.push(SystemReminder {
                        path: canonical.clone(),
                        reason: ReminderReason::Updated,
                    });
                }
                _ => {}
            }
            self.loaded.insert(canonical, mtime);
        }
        Ok(reminders)
    }
}

/// Directory list from `root` down to `cwd` inclusive, root first.
fn directory_chain(root: &Path, cwd: &Path) -> Vec<PathBuf> {
    let cwd = cwd.canonicalize().unwrap_or_else(|_| cwd.to_path_buf());
    let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());

    let Ok(rel) = cwd.strip_prefix(&root) else {
        return vec![cwd];
    };

    let mut chain = vec![root.clone()];
    let mut acc = root;
    for component in rel.components() {
        acc = acc.join(component);
        chain.push(acc.clone());
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loads_chain_from_root_to_cwd_concatenated_in_order() {
        let tmp = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(tmp.path().join(".git")).expect("mkdir git");
        std::fs::write(tmp.path().join("AGENTS.md"), "root doc").expect("write root");

        let nested = tmp.path().join("pkg/sub");
        std::fs::create_dir_all(&nested).expect("mkdir nested");
        std::fs::write(nested.join("AGENTS.md"), "nested doc").expect("write nested");

        let mut resolver = AgentsResolver::default();
        let docs = resolver.load_chain(&nested).await.expect("load chain");

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].contents, "root doc");
        assert_eq!(docs[1].contents, "nested doc");
    }

    #[tokio::test]
    async fn resolve_for_path_reports_new_then_updated() {
        let tmp = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(tmp.path().join(".git")).expect("mkdir git");
        let doc = tmp.path().join("AGENTS.md");
        std::fs::write(&doc, "v1").expect("write");

        let mut resolver = AgentsResolver::default();
        resolver.load_chain(tmp.path()).await.expect("initial load");

        let reminders = resolver.resolve_for_path(tmp.path()).await.expect("resolve");
        assert!(reminders.is_empty(), "no change yet, no reminder expected");

        std::thread::sleep(std::time::Duration::from_millis(10));
        std::fs::write(&doc, "v2 longer content").expect("rewrite");

        let reminders = resolver.resolve_for_path(tmp.path()).await.expect("resolve");
        assert_eq!(reminders.len(), 1);
        assert_eq!(reminders[0].reason, ReminderReason::Updated);
    }

    #[tokio::test]
    async fn byte_cap_truncates_concatenated_chain() {
        let tmp = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(tmp.path().join(".git")).expect("mkdir git");
        std::fs::write(tmp.path().join("AGENTS.md"), "A".repeat(100)).expect("write");

        let mut resolver = AgentsResolver::with_limits(16, 10);
        let docs = resolver.load_chain(tmp.path()).await.expect("load");
        assert_eq!(docs[0].contents.len(), 10);
    }
}
