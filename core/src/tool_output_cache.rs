//! Content-addressed tool-output cache (spec §4.8). Large tool outputs are
//! offloaded here and replaced inline by a `ref=<id>` marker; `read`/`grep`
//! give the agent random access without re-emitting the whole blob.
//!
//! Grounded on the teacher's content-addressing idiom in `rollout.rs`
//! (`Uuid` identity) with `sha1` swapped for `sha2`, and on
//! `mcp_connection_manager`'s plain in-memory `HashMap` style for the index
//! — no `dashmap` is introduced since entries are only ever touched behind
//! one `Mutex` (this is process-wide but single-writer-at-a-time).

use std::collections::HashMap;
use std::collections::VecDeque;

use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Serialize)]
pub struct GrepMatch {
    pub ref_line: String,
    pub line_number: usize,
    pub lines: Vec<String>,
}

struct Entry {
    ref_id: String,
    lines: Vec<String>,
    line_offsets: Vec<usize>,
    bytes: usize,
}

pub struct ToolOutputCacheConfig {
    pub max_bytes: usize,
}

impl Default for ToolOutputCacheConfig {
    /// Spec §9 leaves the LRU budget as an open configuration value;
    /// DESIGN.md resolves it to 64 MiB by default.
    fn default() -> Self {
        Self {
            max_bytes: 64 * 1024 * 1024,
        }
    }
}

pub struct ToolOutputCache {
    config: ToolOutputCacheConfig,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    lru: VecDeque<String>,
    total_bytes: usize,
}

impl ToolOutputCache {
    pub fn new(config: ToolOutputCacheConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Stores `content`, content-addressed by the SHA-256 of the payload.
    /// Re-storing identical content returns the same `ref_id` and bumps it
    /// to the front of the LRU without duplicating storage.
    pub async fn store(&self, content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        let ref_id = format!("{:x}", hasher.finalize())[..16].to_string();

        let mut inner = self.inner.lock().await;
        if inner.entries.contains_key(&ref_id) {
            touch(&mut inner.lru, &ref_id);
            return ref_id;
        }

        let lines: Vec<String> = content.split(['\n']).map(str::to_string).collect();
        let mut offsets = Vec::with_capacity(lines.len());
        let mut pos = 0usize;
        for line in &lines {
            offsets.push(pos);
            pos += line.len() + 1;
        }
        let bytes = content.len();

        inner.total_bytes += bytes;
        inner.entries.insert(
            ref_id.clone(),
            Entry {
                ref_id: ref_id.clone(),
                lines,
                line_offsets: offsets,
                bytes,
            },
        );
        inner.lru.push_front(ref_id.clone());
        evict_over_budget(&mut inner, self.config.max_bytes);
        ref_id
    }

    pub async fn read(
        &self,
        ref_id: &str,
        offset_lines: Option<usize>,
        limit_lines: Option<usize>,
    ) -> Option<String> {
        let mut inner = self.inner.lock().await;
        let entry = inner.entries.get(ref_id)?;
        let offset = offset_lines.unwrap_or(0);
        let end = match limit_lines {
            Some(limit) => (offset + limit).min(entry.lines.len()),
            None => entry.lines.len(),
        };
        let slice = if offset >= entry.lines.len() {
            String::new()
        } else {
            entry.lines[offset..end].join("\n")
        };
        touch(&mut inner.lru, ref_id);
        Some(slice)
    }

    pub async fn grep(
        &self,
        ref_id: &str,
        pattern: &str,
        regex: bool,
        before: usize,
        after: usize,
        max_matches: Option<usize>,
    ) -> Option<Vec<GrepMatch>> {
        let mut inner = self.inner.lock().await;
        let entry = inner.entries.get(ref_id)?;

        let compiled = if regex {
            regex::Regex::new(pattern).ok()
        } else {
            None
        };

        let mut results = Vec::new();
        for (idx, line) in entry.lines.iter().enumerate() {
            let matched = match &compiled {
                Some(re) => re.is_match(line),
                None => line.contains(pattern),
            };
            if !matched {
                continue;
            }

            let start = idx.saturating_sub(before);
            let end = (idx + after + 1).min(entry.lines.len());
            results.push(GrepMatch {
                ref_line: format!("ref:{}:{}", entry.ref_id, idx + 1),
                line_number: idx + 1,
                lines: entry.lines[start..end].to_vec(),
            });

            if let Some(max) = max_matches
                && results.len() >= max
            {
                break;
            }
        }
        touch(&mut inner.lru, ref_id);
        let _ = &entry.line_offsets;
        Some(results)
    }

    pub async fn total_bytes(&self) -> usize {
        self.inner.lock().await.total_bytes
    }
}

fn touch(lru: &mut VecDeque<String>, ref_id: &str) {
    if let Some(pos) = lru.iter().position(|id| id == ref_id) {
        lru.remove(pos);
    }
    lru.push_front(ref_id.to_string());
}

fn evict_over_budget(inner: &mut Inner, max_bytes: usize) {
    while inner.total_bytes > max_bytes {
        let Some(victim) = inner.lru.pop_back() else {
            break;
        };
        if let Some(entry) = inner.entries.remove(&victim) {
            inner.total_bytes = inner.total_bytes.saturating_sub(entry.bytes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_and_read_round_trips_lines() {
        let cache = ToolOutputCache::new(ToolOutputCacheConfig::default());
        let ref_id = cache.store("one\ntwo\nthree").await;
        let slice = cache.read(&ref_id, Some(1), Some(1)).await.expect("read");
        assert_eq!(slice, "two");
    }

    #[tokio::test]
    async fn grep_returns_context_and_ref_marker() {
        let cache = ToolOutputCache::new(ToolOutputCacheConfig::default());
        let ref_id = cache.store("a\nb\nneedle\nc\nd").await;
        let matches = cache
            .grep(&ref_id, "needle", false, 1, 1, None)
            .await
            .expect("grep");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].lines, vec!["b", "needle", "c"]);
        assert!(matches[0].ref_line.starts_with("ref:"));
    }

    #[tokio::test]
    async fn identical_content_is_deduplicated_by_hash() {
        let cache = ToolOutputCache::new(ToolOutputCacheConfig::default());
        let a = cache.store("same content").await;
        let b = cache.store("same content").await;
        assert_eq!(a, b);
        assert_eq!(cache.total_bytes().await, "same content".len());
    }

    #[tokio::test]
    async fn lru_eviction_respects_byte_budget() {
        let cache = ToolOutputCache::new(ToolOutputCacheConfig { max_bytes: 10 });
        let first = cache.store("0123456789").await;
        let _second = cache.store("abcdefghij").await;
        assert!(cache.read(&first, None, None).await.is_none());
    }
}
