//! SKILLS resolver (spec §4.7). New functionality the teacher has no
//! analogue for; grounded on `project_doc.rs`'s upward-walk helper for
//! locating `.agents/skills` directories plus `ignore`/`walkdir` for
//! sibling-file enumeration and `wildmatch`/`regex` for search scoring --
//! all already dependencies the teacher carries elsewhere in the workspace.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::SystemTime;

use regex::Regex;

use crate::error::SkillError;

const SKILLS_SUBDIR: &str = ".agents/skills";
const SKILL_FILE: &str = "SKILL.md";
const MAX_SIBLING_FILES: usize = 64;
const MAX_SIBLING_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Scope {
    Repo,
    User,
}

#[derive(Debug, Clone)]
pub struct SkillEntry {
    pub name: String,
    pub description: String,
    pub path: PathBuf,
    pub dir: PathBuf,
    pub scope: Scope,
    pub mtime: SystemTime,
}

static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$").unwrap_or_else(|e| unreachable!("static regex is valid: {e}")));

/// Parses the minimal YAML frontmatter block (`---\n...\n---`) a SKILL.md
/// file must start with, pulling only `name` and `description`.
fn parse_frontmatter(contents: &str, path: &Path) -> Result<(String, String), SkillError> {
    let rest = contents
        .strip_prefix("---\n")
        .ok_or_else(|| SkillError::MalformedFrontmatter(path.to_path_buf()))?;
    let end = rest
        .find("\n---")
        .ok_or_else(|| SkillError::MalformedFrontmatter(path.to_path_buf()))?;
    let block = &rest[..end];

    let value: serde_yaml::Value = serde_yaml::from_str(block)
        .map_err(|_| SkillError::MalformedFrontmatter(path.to_path_buf()))?;

    let name = value
        .get("name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| SkillError::MalformedFrontmatter(path.to_path_buf()))?
        .to_string();
    let description = value
        .get("description")
        .and_then(|v| v.as_str())
        .ok_or_else(|| SkillError::MalformedFrontmatter(path.to_path_buf()))?
        .to_string();

    Ok((name, description))
}

/// Scans one `.agents/skills` directory for `<name>/SKILL.md` entries.
async fn scan_skills_dir(dir: &Path, scope: Scope) -> std::io::Result<Vec<SkillEntry>> {
    let mut entries = Vec::new();
    let mut read_dir = match tokio::fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
        Err(e) => return Err(e),
    };

    while let Some(child) = read_dir.next_entry().await? {
        let child_path = child.path();
        if !child.file_type().await?.is_dir() {
            continue;
        }
        let skill_file = child_path.join(SKILL_FILE);
        let Ok(metadata) = tokio::fs::metadata(&skill_file).await else {
            continue;
        };
        let contents = tokio::fs::read_to_string(&skill_file).await?;
        let Ok((name, description)) = parse_frontmatter(&contents, &skill_file) else {
            tracing::warn!(path = %skill_file.display(), "skipping skill with malformed frontmatter");
            continue;
        };

        let dir_name = child_path.file_name().map(|n| n.to_string_lossy().to_string());
        if dir_name.as_deref() != Some(name.as_str()) || !NAME_PATTERN.is_match(&name) {
            tracing::warn!(path = %skill_file.display(), name, "skipping skill with invalid name");
            continue;
        }

        entries.push(SkillEntry {
            name,
            description,
            path: skill_file.canonicalize().unwrap_or(skill_file),
            dir: child_path.canonicalize().unwrap_or(child_path),
            scope,
            mtime: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        });
    }
    Ok(entries)
}

pub struct SkillsCatalog {
    entries: Vec<SkillEntry>,
    loaded_mtimes: HashMap<PathBuf, SystemTime>,
}

impl SkillsCatalog {
    /// Builds the catalog from the project chain (`.agents/skills` under
    /// each directory from `repo_root` to `cwd`) plus `~/.agents/skills`.
    /// Dedup: canonical path first; when the same canonical path appears in
    /// both scopes, repo scope wins (spec §4.7).
    pub async fn build(repo_root: &Path, cwd: &Path, home: Option<&Path>) -> std::io::Result<Self> {
        let mut by_path: HashMap<PathBuf, SkillEntry> = HashMap::new();

        let mut dir = repo_root.to_path_buf();
        let mut chain = vec![dir.clone()];
        if let Ok(rel) = cwd.strip_prefix(repo_root) {
            for component in rel.components() {
                dir = dir.join(component);
                chain.push(dir.clone());
            }
        }
        for d in chain {
            for entry in scan_skills_dir(&d.join(SKILLS_SUBDIR), Scope::Repo).await? {
                by_path.insert(entry.path.clone(), entry);
            }
        }

        if let Some(home) = home {
            for entry in scan_skills_dir(&home.join(SKILLS_SUBDIR), Scope::User).await? {
                by_path.entry(entry.path.clone()).or_insert(entry);
            }
        }

        let mut entries: Vec<SkillEntry> = by_path.into_values().collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name).then(a.scope.cmp(&b.scope)));

        Ok(Self {
            entries,
            loaded_mtimes: HashMap::new(),
        })
    }

    pub fn entries(&self) -> &[SkillEntry] {
        &self.entries
    }

    pub fn find_by_name(&self, name: &str) -> Option<&SkillEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Scores and ranks skills against `query` (spec §4.7):
    /// exact_path=1000, exact_name=900, prefix=700, token_overlap=100+count.
    /// Ties broken by scope (repo < user) then canonical path.
    pub fn search(&self, query: &str) -> Vec<(&SkillEntry, u32)> {
        let query_tokens: Vec<String> = tokenize(query);
        let mut scored: Vec<(&SkillEntry, u32)> = self
            .entries
            .iter()
            .filter_map(|entry| score(entry, query, &query_tokens).map(|s| (entry, s)))
            .collect();

        scored.sort_by(|(a_entry, a_score), (b_entry, b_score)| {
            b_score
                .cmp(a_score)
                .then(a_entry.scope.cmp(&b_entry.scope))
                .then(a_entry.path.cmp(&b_entry.path))
        });
        scored
    }

    /// Loads the skill's body wrapped in a `<skill_context>` envelope plus an
    /// enumeration of sibling files under the skill directory. A second load
    /// with an unchanged mtime returns a terse "already loaded" reminder
    /// instead of the full body, to save tokens (spec §4.7).
    pub async fn load(&mut self, name: &str) -> Result<SkillLoadResult, SkillError> {
        let entry = self
            .find_by_name(name)
            .cloned()
            .ok_or_else(|| SkillError::MalformedFrontmatter(PathBuf::from(name)))?;

        if let Some(prev) = self.loaded_mtimes.get(&entry.path)
            && *prev == entry.mtime
        {
            return Ok(SkillLoadResult::AlreadyLoaded { name: entry.name });
        }

        let body = tokio::fs::read_to_string(&entry.path).await?;
        let siblings = enumerate_siblings(&entry.dir).await?;
        self.loaded_mtimes.insert(entry.path.clone(), entry.mtime);

        Ok(SkillLoadResult::Loaded {
            envelope: format!("<skill_context name=\"{}\">\n{}\n</skill_context>", entry.name, body),
            siblings,
        })
    }
}

#[derive(Debug)]
pub enum SkillLoadResult {
    Loaded {
        envelope: String,
        siblings: Vec<PathBuf>,
    },
    AlreadyLoaded {
        name: String,
    },
}

async fn enumerate_siblings(skill_dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut total_bytes = 0usize;

    for entry in ignore::WalkBuilder::new(skill_dir).hidden(false).build() {
        let Ok(entry) = entry else { continue };
        let path = entry.path();
        if path == skill_dir {
            continue;
        }
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        // Symlinks escaping the skill dir are dropped (spec §4.7).
        let Ok(canonical) = path.canonicalize() else {
            continue;
        };
        if !canonical.starts_with(skill_dir) {
            continue;
        }
        if out.len() >= MAX_SIBLING_FILES {
            break;
        }
        if let Ok(metadata) = tokio::fs::metadata(&canonical).await {
            total_bytes += metadata.len() as usize;
            if total_bytes > MAX_SIBLING_BYTES {
                break;
            }
        }
        out.push(canonical);
    }
    Ok(out)
}

fn tokenize(s: &str) -> Vec<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

fn score(entry: &SkillEntry, query: &str, query_tokens: &[String]) -> Option<u32> {
    let path_str = entry.path.to_string_lossy().to_lowercase();
    let query_lower = query.to_lowercase();

    if path_str == query_lower {
        return Some(1000);
    }
    if entry.name == query_lower {
        return Some(900);
    }
    if entry.name.starts_with(&query_lower) {
        return Some(700);
    }

    let name_tokens = tokenize(&entry.name);
    let desc_tokens = tokenize(&entry.description);
    let overlap = query_tokens
        .iter()
        .filter(|t| name_tokens.contains(t) || desc_tokens.contains(t))
        .count();
    if overlap > 0 {
        Some(100 + overlap as u32)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_skill(dir: &Path, name: &str, description: &str) {
        let skill_dir = dir.join(SKILLS_SUBDIR).join(name);
        std::fs::create_dir_all(&skill_dir).expect("mkdir");
        std::fs::write(
            skill_dir.join(SKILL_FILE),
            format!("---\nname: {name}\ndescription: {description}\n---\nbody for {name}"),
        )
        .expect("write skill");
    }

    #[tokio::test]
    async fn builds_catalog_and_finds_exact_name() {
        let tmp = tempfile::tempdir().expect("tempdir");
        write_skill(tmp.path(), "pdf-fill", "Fill PDF forms");

        let catalog = SkillsCatalog::build(tmp.path(), tmp.path(), None).await.expect("build");
        assert_eq!(catalog.entries().len(), 1);
        assert!(catalog.find_by_name("pdf-fill").is_some());
    }

    #[tokio::test]
    async fn invalid_name_is_skipped() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let skill_dir = tmp.path().join(SKILLS_SUBDIR).join("Bad_Name");
        std::fs::create_dir_all(&skill_dir).expect("mkdir");
        std::fs::write(
            skill_dir.join(SKILL_FILE),
            "---\nname: Bad_Name\ndescription: nope\n---\nbody",
        )
        .expect("write");

        let catalog = SkillsCatalog::build(tmp.path(), tmp.path(), None).await.expect("build");
        assert!(catalog.entries().is_empty());
    }

    #[tokio::test]
    async fn repo_scope_wins_over_user_scope_for_same_canonical_path() {
        let tmp = tempfile::tempdir().expect("tempdir");
        write_skill(tmp.path(), "shared", "shared skill");

        // Same canonical path passed as both repo root and home: repo wins by
        // insertion order (repo scanned first, `or_insert` keeps it).
        let catalog = SkillsCatalog::build(tmp.path(), tmp.path(), Some(tmp.path()))
            .await
            .expect("build");
        let entry = catalog.find_by_name("shared").expect("found");
        assert_eq!(entry.scope, Scope::Repo);
    }

    #[tokio::test]
    async fn search_scores_exact_name_above_token_overlap() {
        let tmp = tempfile::tempdir().expect("tempdir");
        write_skill(tmp.path(), "pdf-fill", "Fill PDF forms with data");
        write_skill(tmp.path(), "data-export", "Export data to csv");

        let catalog = SkillsCatalog::build(tmp.path(), tmp.path(), None).await.expect("build");
        let results = catalog.search("pdf-fill");
        assert_eq!(results[0].0.name, "pdf-fill");
        assert_eq!(results[0].1, 900);
    }

    #[tokio::test]
    async fn second_load_with_unchanged_mtime_returns_already_loaded() {
        let tmp = tempfile::tempdir().expect("tempdir");
        write_skill(tmp.path(), "pdf-fill", "Fill PDF forms");

        let mut catalog = SkillsCatalog::build(tmp.path(), tmp.path(), None).await.expect("build");
        let first = catalog.load("pdf-fill").await.expect("first load");
        assert!(matches!(first, SkillLoadResult::Loaded { .. }));

        let second = catalog.load("pdf-fill").await.expect("second load");
        assert!(matches!(second, SkillLoadResult::AlreadyLoaded { .. }));
    }
}
