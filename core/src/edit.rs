//! Edit engine (spec §4.2): tiered string-replacement matching (exact /
//! line_trimmed / block_anchor / auto), unified-diff generation and
//! optimistic content-hash concurrency.
//!
//! Grounded on the teacher's `apply-patch` crate for the diff-generation and
//! hashing *idiom* (`similar::TextDiff` for hunks, a hex digest for content
//! identity) but not its algorithm: `apply-patch` parses a custom
//! add/delete/update DSL, while this is the old_string/new_string
//! replacement tool spec §4.2 describes — new code in the teacher's style.

use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use similar::ChangeTag;
use similar::TextDiff;

use crate::error::EditError;
use crate::sandbox::Sandbox;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    Exact,
    LineTrimmed,
    BlockAnchor,
    Auto,
}

impl Default for MatchMode {
    fn default() -> Self {
        MatchMode::Auto
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EditRequest {
    pub file_path: String,
    pub old_string: String,
    pub new_string: String,
    #[serde(default)]
    pub replace_all: bool,
    #[serde(default)]
    pub match_mode: MatchMode,
    #[serde(default)]
    pub expected_replacements: Option<usize>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub expected_hash: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EditResult {
    pub summary: String,
    pub replacements: usize,
    pub match_mode: &'static str,
    pub diff: String,
}

/// A byte-range match within the file's content, used both by the matcher
/// and by the descending-offset replacement pass.
#[derive(Debug, Clone, Copy)]
struct Span {
    start: usize,
    end: usize,
}

pub fn sha256_hex(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub async fn apply_edit(sandbox: &Sandbox, req: EditRequest) -> Result<EditResult, EditError> {
    let path = sandbox.resolve(&req.file_path)?;

    let existing = match tokio::fs::read_to_string(&path).await {
        Ok(s) => Some(s),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(EditError::Io(e)),
    };

    if let Some(expected_hash) = &req.expected_hash {
        let current = existing.clone().unwrap_or_default();
        if &sha256_hex(&current) != expected_hash {
            return Err(EditError::HashMismatch);
        }
    }

    // Whole-file replace / creation (spec §4.2 step 4).
    if req.old_string.is_empty() {
        let original = existing.unwrap_or_default();
        let diff = unified_diff(&req.file_path, &original, &req.new_string);
        if !req.dry_run {
            write_atomic(&path, &req.new_string).await?;
        }
        return Ok(EditResult {
            summary: format!("wrote {}", req.file_path),
            replacements: 1,
            match_mode: "whole_file",
            diff,
        });
    }

    let Some(content) = existing else {
        return Err(EditError::FileNotFound(path));
    };

    // No-op success (spec §4.2 step 3).
    if req.old_string == req.new_string {
        return Ok(EditResult {
            summary: "old_string and new_string are identical; no changes made".to_string(),
            replacements: 0,
            match_mode: "noop",
            diff: String::new(),
        });
    }

    let (mode_name, spans) = find_matches(&content, &req.old_string, req.match_mode)?;

    if spans.is_empty() {
        return Err(EditError::NoMatch {
            path: PathBuf::from(&req.file_path),
        });
    }
    if spans.len() > 1 && !req.replace_all {
        return Err(EditError::Ambiguous { count: spans.len() });
    }
    if let Some(expected) = req.expected_replacements
        && expected != spans.len()
    {
        return Err(EditError::CountMismatch {
            expected,
            actual: spans.len(),
        });
    }

    let new_content = apply_spans(&content, &spans, &req.new_string);
    let diff = unified_diff(&req.file_path, &content, &new_content);

    if !req.dry_run {
        write_atomic(&path, &new_content).await?;
    }

    Ok(EditResult {
        summary: format!("{} replacement(s) in {}", spans.len(), req.file_path),
        replacements: spans.len(),
        match_mode: mode_name,
        diff,
    })
}

/// Applies replacements in descending byte-offset order so earlier offsets
/// stay valid (spec §4.2 step 8).
fn apply_spans(content: &str, spans: &[Span], replacement: &str) -> String {
    let mut out = content.to_string();
    let mut ordered: Vec<&Span> = spans.iter().collect();
    ordered.sort_by(|a, b| b.start.cmp(&a.start));
    for span in ordered {
        out.replace_range(span.start..span.end, replacement);
    }
    out
}

fn find_matches(
    content: &str,
    needle: &str,
    mode: MatchMode,
) -> Result<(&'static str, Vec<Span>), EditError> {
    match mode {
        MatchMode::Exact => Ok(("exact", find_exact(content, needle))),
        MatchMode::LineTrimmed => Ok(("line_trimmed", find_line_trimmed(content, needle))),
        MatchMode::BlockAnchor => Ok(("block_anchor", find_block_anchor(content, needle))),
        MatchMode::Auto => {
            let exact = find_exact(content, needle);
            if !exact.is_empty() {
                return Ok(("exact", exact));
            }
            let trimmed = find_line_trimmed(content, needle);
            if !trimmed.is_empty() {
                return Ok(("line_trimmed", trimmed));
            }
            Ok(("block_anchor", find_block_anchor(content, needle)))
        }
    }
}

fn find_exact(content: &str, needle: &str) -> Vec<Span> {
    if needle.is_empty() {
        return Vec::new();
    }
    let mut spans = Vec::new();
    let mut search_from = 0usize;
    while let Some(rel) = content[search_from..].find(needle) {
        let start = search_from + rel;
        let end = start + needle.len();
        spans.push(Span { start, end });
        search_from = end;
    }
    spans
}

/// Splits both sides on `\n`, strips trailing `\r` and surrounding
/// whitespace per line, matches contiguous line windows, then converts the
/// matched line range back to byte offsets in the original content.
fn find_line_trimmed(content: &str, needle: &str) -> Vec<Span> {
    let content_lines: Vec<&str> = content.split('\n').collect();
    let needle_lines: Vec<String> = needle.split('\n').map(trim_line).collect();
    if needle_lines.is_empty() {
        return Vec::new();
    }

    let offsets = line_byte_offsets(content, &content_lines);
    let mut spans = Vec::new();
    let window = needle_lines.len();
    if content_lines.len() < window {
        return spans;
    }

    for start_line in 0..=(content_lines.len() - window) {
        let matches = (0..window).all(|i| trim_line(content_lines[start_line + i]) == needle_lines[i]);
        if matches {
            let start = offsets[start_line];
            let end_line = start_line + window - 1;
            let end = offsets[end_line] + content_lines[end_line].len();
            spans.push(Span { start, end });
        }
    }
    spans
}

/// Requires >= 3 needle lines. A window's first/last trimmed lines must
/// match the needle's first/last trimmed lines; interior lines are scored by
/// the fraction that match, and every window tied at the maximum score is
/// kept (spec §4.2 step 5: block_anchor).
fn find_block_anchor(content: &str, needle: &str) -> Vec<Span> {
    let needle_lines: Vec<String> = needle.split('\n').map(trim_line).collect();
    if needle_lines.len() < 3 {
        return Vec::new();
    }
    let content_lines: Vec<&str> = content.split('\n').collect();
    let window = needle_lines.len();
    if content_lines.len() < window {
        return Vec::new();
    }
    let offsets = line_byte_offsets(content, &content_lines);

    let first = &needle_lines[0];
    let last = &needle_lines[window - 1];

    let mut best_score = -1.0f64;
    let mut candidates: Vec<Span> = Vec::new();

    for start_line in 0..=(content_lines.len() - window) {
        let end_line = start_line + window - 1;
        if trim_line(content_lines[start_line]) != *first || trim_line(content_lines[end_line]) != *last
        {
            continue;
        }

        let interior = window.saturating_sub(2);
        let score = if interior == 0 {
            1.0
        } else {
            let matched = (1..window - 1)
                .filter(|&i| trim_line(content_lines[start_line + i]) == needle_lines[i])
                .count();
            matched as f64 / interior as f64
        };

        let span = Span {
            start: offsets[start_line],
            end: offsets[end_line] + content_lines[end_line].len(),
        };

        if score > best_score {
            best_score = score;
            candidates = vec![span];
        } else if (score - best_score).abs() < f64::EPSILON {
            candidates.push(span);
        }
    }

    candidates
}

fn trim_line(line: &str) -> String {
    line.trim_end_matches('\r').trim().to_string()
}

fn line_byte_offsets(content: &str, lines: &[&str]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(lines.len());
    let mut pos = 0usize;
    for line in lines {
        offsets.push(pos);
        pos += line.len() + 1; // +1 for the '\n' separator we split on
    }
    let _ = content;
    offsets
}

/// 3-line-context unified diff with a standard `@@ -a,b +c,d @@` header.
/// Zero-length files produce `0,0` ranges (spec §4.2 step 9).
fn unified_diff(file_path: &str, old: &str, new: &str) -> String {
    let diff = TextDiff::from_lines(old, new);
    let unified = diff
        .unified_diff()
        .context_radius(3)
        .header(&format!("a/{file_path}"), &format!("b/{file_path}"))
        .to_string();

    if old.is_empty() && new.is_empty() {
        return format!(
            "--- a/{file_path}\n+++ b/{file_path}\n@@ -0,0 +0,0 @@\n"
        );
    }
    unified
}

async fn write_atomic(path: &Path, content: &str) -> Result<(), EditError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    crate::storage::atomic_write(path, content.as_bytes()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::Sandbox;

    fn sandbox_in(tmp: &tempfile::TempDir) -> Sandbox {
        Sandbox::new(tmp.path().to_path_buf(), tmp.path().to_path_buf()).expect("sandbox")
    }

    #[tokio::test]
    async fn edit_exact_single_match_replaces_in_place() {
        let tmp = tempfile::tempdir().expect("tempdir");
        std::fs::write(tmp.path().join("f.txt"), "alpha beta\n").expect("write");
        let sandbox = sandbox_in(&tmp);

        let result = apply_edit(
            &sandbox,
            EditRequest {
                file_path: "f.txt".to_string(),
                old_string: "beta".to_string(),
                new_string: "gamma".to_string(),
                replace_all: false,
                match_mode: MatchMode::Exact,
                expected_replacements: None,
                dry_run: false,
                expected_hash: None,
            },
        )
        .await
        .expect("apply");

        assert_eq!(result.replacements, 1);
        assert_eq!(result.match_mode, "exact");
        let contents = std::fs::read_to_string(tmp.path().join("f.txt")).expect("read");
        assert_eq!(contents, "alpha gamma\n");
    }

    #[tokio::test]
    async fn edit_ambiguous_without_replace_all_leaves_file_unchanged() {
        let tmp = tempfile::tempdir().expect("tempdir");
        std::fs::write(tmp.path().join("f.txt"), "x x").expect("write");
        let sandbox = sandbox_in(&tmp);

        let err = apply_edit(
            &sandbox,
            EditRequest {
                file_path: "f.txt".to_string(),
                old_string: "x".to_string(),
                new_string: "y".to_string(),
                replace_all: false,
                match_mode: MatchMode::Exact,
                expected_replacements: None,
                dry_run: false,
                expected_hash: None,
            },
        )
        .await
        .expect_err("should be ambiguous");

        assert!(matches!(err, EditError::Ambiguous { count: 2 }));
        let contents = std::fs::read_to_string(tmp.path().join("f.txt")).expect("read");
        assert_eq!(contents, "x x");
    }

    #[tokio::test]
    async fn edit_hash_mismatch_rejects_and_leaves_file_unchanged() {
        let tmp = tempfile::tempdir().expect("tempdir");
        std::fs::write(tmp.path().join("f.txt"), "alpha\n").expect("write");
        let sandbox = sandbox_in(&tmp);

        let err = apply_edit(
            &sandbox,
            EditRequest {
                file_path: "f.txt".to_string(),
                old_string: "alpha".to_string(),
                new_string: "omega".to_string(),
                replace_all: false,
                match_mode: MatchMode::Exact,
                expected_replacements: None,
                dry_run: false,
                expected_hash: Some("deadbeef".to_string()),
            },
        )
        .await
        .expect_err("should mismatch");

        assert!(matches!(err, EditError::HashMismatch));
        let contents = std::fs::read_to_string(tmp.path().join("f.txt")).expect("read");
        assert_eq!(contents, "alpha\n");
    }

    #[tokio::test]
    async fn edit_round_trip_preserves_original_content() {
        let tmp = tempfile::tempdir().expect("tempdir");
        std::fs::write(tmp.path().join("f.txt"), "one two three\n").expect("write");
        let sandbox = sandbox_in(&tmp);

        apply_edit(
            &sandbox,
            EditRequest {
                file_path: "f.txt".to_string(),
                old_string: "two".to_string(),
                new_string: "deux".to_string(),
                replace_all: false,
                match_mode: MatchMode::Exact,
                expected_replacements: None,
                dry_run: false,
                expected_hash: None,
            },
        )
        .await
        .expect("apply forward");

        apply_edit(
            &sandbox,
            EditRequest {
                file_path: "f.txt".to_string(),
                old_string: "deux".to_string(),
                new_string: "two".to_string(),
                replace_all: false,
                match_mode: MatchMode::Exact,
                expected_replacements: None,
                dry_run: false,
                expected_hash: None,
            },
        )
        .await
        .expect("apply backward");

        let contents = std::fs::read_to_string(tmp.path().join("f.txt")).expect("read");
        assert_eq!(contents, "one two three\n");
    }

    #[tokio::test]
    async fn line_trimmed_mode_matches_despite_whitespace_drift() {
        let tmp = tempfile::tempdir().expect("tempdir");
        std::fs::write(tmp.path().join("f.txt"), "fn main() {\n    let x = 1;  \n}\n").expect("write");
        let sandbox = sandbox_in(&tmp);

        let result = apply_edit(
            &sandbox,
            EditRequest {
                file_path: "f.txt".to_string(),
                old_string: "let x = 1;".to_string(),
                new_string: "let x = 2;".to_string(),
                replace_all: false,
                match_mode: MatchMode::LineTrimmed,
                expected_replacements: None,
                dry_run: false,
                expected_hash: None,
            },
        )
        .await
        .expect("apply");

        assert_eq!(result.replacements, 1);
        let contents = std::fs::read_to_string(tmp.path().join("f.txt")).expect("read");
        assert!(contents.contains("let x = 2;"));
    }

    #[test]
    fn block_anchor_requires_at_least_three_lines() {
        let content = "a\nb\nc\n";
        let needle = "a\nb\n";
        let spans = find_block_anchor(content, needle);
        assert!(spans.is_empty());
    }

    #[tokio::test]
    async fn dry_run_does_not_touch_disk() {
        let tmp = tempfile::tempdir().expect("tempdir");
        std::fs::write(tmp.path().join("f.txt"), "alpha\n").expect("write");
        let sandbox = sandbox_in(&tmp);

        let result = apply_edit(
            &sandbox,
            EditRequest {
                file_path: "f.txt".to_string(),
                old_string: "alpha".to_string(),
                new_string: "omega".to_string(),
                replace_all: false,
                match_mode: MatchMode::Exact,
                expected_replacements: None,
                dry_run: true,
                expected_hash: None,
            },
        )
        .await
        .expect("apply");

        assert!(result.diff.contains("omega"));
        let contents = std::fs::read_to_string(tmp.path().join("f.txt")).expect("read");
        assert_eq!(contents, "alpha\n");
    }
}
