//! Session / history store (spec §4.6). Grounded on `rollout.rs`'s
//! mpsc-channel-backed async JSONL writer task (one line per record),
//! generalized from a single flat `~/.codex/sessions/rollout-*.jsonl` file
//! into the date-sharded `sessions/<YYYY>/<MM>/<DD>/<run_id>.jsonl` tree
//! spec §4.6/§6 requires, plus (expansion, DESIGN.md open-question
//! resolution) the `sessions/state.json` summary index and the replay
//! reader.

use std::path::Path;
use std::path::PathBuf;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::Sender;

use crate::error::SessionStoreError;
use crate::events::AgentEvent;
use crate::storage::StorageLayout;
use crate::storage::atomic_write;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JournalRecord {
    Header {
        schema_version: u32,
        run_id: String,
        session_id: String,
        started_at: DateTime<Utc>,
        prompt_digest: String,
    },
    #[serde(rename = "run.start")]
    RunStart {
        run_id: String,
        input: Value,
    },
    #[serde(rename = "agent.event")]
    AgentEventRecord {
        run_id: String,
        seq: u64,
        event: AgentEvent,
    },
    #[serde(rename = "run.end")]
    RunEnd {
        run_id: String,
        status: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        final_text: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub updated_at: DateTime<Utc>,
    pub run_count: u64,
    pub last_user_message: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionIndex {
    sessions: std::collections::HashMap<String, SessionSummary>,
}

/// Async writer for one run's journal file. Constructed per run; the
/// session summary index is updated through [`SessionStore`] instead, since
/// multiple runs across a session share one index file.
#[derive(Clone)]
pub struct RunJournalWriter {
    tx: Sender<JournalRecord>,
}

impl RunJournalWriter {
    pub async fn create(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = tokio::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .await?;

        let (tx, mut rx) = mpsc::channel::<JournalRecord>(256);
        tokio::task::spawn(async move {
            use tokio::io::AsyncWriteExt;
            let mut file = file;
            while let Some(record) = rx.recv().await {
                let Ok(json) = serde_json::to_string(&record) else {
                    continue;
                };
                if file.write_all(json.as_bytes()).await.is_err() {
                    break;
                }
                if file.write_all(b"\n").await.is_err() {
                    break;
                }
                if file.flush().await.is_err() {
                    break;
                }
            }
        });

        Ok(Self { tx })
    }

    pub async fn append(&self, record: JournalRecord) -> std::io::Result<()> {
        self.tx
            .send(record)
            .await
            .map_err(|e| std::io::Error::other(e.to_string()))
    }
}

pub struct SessionStore {
    storage: StorageLayout,
}

impl SessionStore {
    pub fn new(storage: StorageLayout) -> Self {
        Self { storage }
    }

    /// `sessions/<YYYY>/<MM>/<DD>/<run_id>.jsonl` (spec §4.6/§6).
    pub fn journal_path(&self, run_id: &str, started_at: DateTime<Utc>) -> PathBuf {
        self.storage
            .sessions_dir()
            .join(format!("{:04}", started_at.format("%Y")))
            .join(format!("{:02}", started_at.format("%m")))
            .join(format!("{:02}", started_at.format("%d")))
            .join(format!("{run_id}.jsonl"))
    }

    pub async fn open_writer(
        &self,
        run_id: &str,
        started_at: DateTime<Utc>,
    ) -> std::io::Result<RunJournalWriter> {
        RunJournalWriter::create(&self.journal_path(run_id, started_at)).await
    }

    /// Rewrites `sessions/state.json` with an updated summary entry,
    /// atomically (spec §5/§6).
    pub async fn update_summary(
        &self,
        session_id: &str,
        last_user_message: Option<String>,
    ) -> Result<(), SessionStoreError> {
        let path = self.storage.session_index_path();
        let mut index = self.load_index(&path).await?;

        let entry = index
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionSummary {
                session_id: session_id.to_string(),
                updated_at: Utc::now(),
                run_count: 0,
                last_user_message: None,
            });
        entry.updated_at = Utc::now();
        entry.run_count += 1;
        if last_user_message.is_some() {
            entry.last_user_message = last_user_message;
        }

        let bytes = serde_json::to_vec_pretty(&index)?;
        atomic_write(&path, &bytes).await?;
        Ok(())
    }

    async fn load_index(&self, path: &Path) -> Result<SessionIndex, SessionStoreError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SessionIndex::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Sessions sorted by `updated_at` descending (spec §4.6).
    pub async fn list(&self, limit: usize) -> Result<Vec<SessionSummary>, SessionStoreError> {
        let index = self.load_index(&self.storage.session_index_path()).await?;
        let mut sessions: Vec<SessionSummary> = index.sessions.into_values().collect();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        sessions.truncate(limit);
        Ok(sessions)
    }

    /// Replays a session's recorded events in original order; for every
    /// `run.start` with user input, synthesizes a `hidden_user_message`
    /// event first so clients can rebuild the assistant bubble (spec §4.6).
    /// Streams across every `<run_id>.jsonl` file under the sessions tree
    /// that belongs to `session_id`, in filename (chronological) order.
    pub async fn history(
        &self,
        session_id: &str,
        max_runs: usize,
        max_events: usize,
    ) -> Result<Vec<AgentEvent>, SessionStoreError> {
        let mut journal_files = Vec::new();
        collect_journal_files(&self.storage.sessions_dir(), &mut journal_files).await?;
        journal_files.sort();

        let mut events = Vec::new();
        let mut runs_seen = 0usize;

        for path in journal_files {
            let Ok(records) = read_journal(&path).await else {
                continue;
            };
            let mut belongs = false;
            for record in &records {
                if let JournalRecord::Header {
                    session_id: sid, ..
                } = record
                {
                    belongs = sid == session_id;
                    break;
                }
            }
            if !belongs {
                continue;
            }
            if runs_seen >= max_runs {
                break;
            }
            runs_seen += 1;

            for record in records {
                match record {
                    JournalRecord::RunStart { input, .. } => {
                        if let Some(text) = input.get("text").and_then(|v| v.as_str()) {
                            events.push(AgentEvent::HiddenUserMessage {
                                content: text.to_string(),
                            });
                        }
                    }
                    JournalRecord::AgentEventRecord { event, .. } => {
                        events.push(event);
                    }
                    _ => {}
                }
                if events.len() >= max_events {
                    break;
                }
            }
        }

        Ok(events)
    }

    pub async fn session_exists(&self, session_id: &str) -> Result<bool, SessionStoreError> {
        let index = self.load_index(&self.storage.session_index_path()).await?;
        Ok(index.sessions.contains_key(session_id))
    }
}

fn collect_journal_files<'a>(
    dir: &'a Path,
    out: &'a mut Vec<PathBuf>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = std::io::Result<()>> + Send + 'a>> {
    Box::pin(async move {
        let mut read_dir = match tokio::fs::read_dir(dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                collect_journal_files(&path, out).await?;
            } else if path.extension().is_some_and(|ext| ext == "jsonl") {
                out.push(path);
            }
        }
        Ok(())
    })
}

/// Reads a journal file, tolerant of an oversize `header` line (spec §4.6:
/// "may exceed 64KB -- readers must not assume a line-size bound").
async fn read_journal(path: &Path) -> std::io::Result<Vec<JournalRecord>> {
    let file = tokio::fs::File::open(path).await?;
    let reader = tokio::io::BufReader::new(file);
    let mut lines = reader.lines();
    let mut records = Vec::new();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(record) = serde_json::from_str::<JournalRecord>(&line) {
            records.push(record);
        }
    }
    Ok(records)
}
