//! Stdio transport: spawn a server process, speak newline-delimited
//! JSON-RPC over its stdin/stdout.
//!
//! Grounded on `codex-mcp-server`'s `run_main` three-task pipeline (a
//! reader task decoding lines into messages, a writer task serializing
//! outgoing messages, and the owning task correlating responses) and on
//! `mcp_connection_manager.rs`'s process-per-server lifecycle.

use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use mcp_types::JSONRPCMessage;
use mcp_types::JSONRPCNotification;
use mcp_types::JSONRPCRequest;
use mcp_types::RequestId;
use serde_json::Value;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::process::Child;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::McpClientError;
use crate::error::Result;
use crate::pending::PendingRequests;

/// One line of outbound traffic: either a request awaiting a reply or a
/// fire-and-forget notification.
enum Outbound {
    Request(JSONRPCRequest),
    Notification(JSONRPCNotification),
}

pub struct StdioTransport {
    child: AsyncMutex<Child>,
    pending: Arc<PendingRequests>,
    out_tx: mpsc::UnboundedSender<Outbound>,
    closed: AtomicBool,
    reader_task: AsyncMutex<Option<tokio::task::JoinHandle<()>>>,
    writer_task: AsyncMutex<Option<tokio::task::JoinHandle<()>>>,
}

impl StdioTransport {
    pub async fn spawn(command: &str, args: &[String], env: &[(String, String)]) -> Result<Self> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (k, v) in env {
            cmd.env(k, v);
        }

        let mut child = cmd.spawn().map_err(McpClientError::Spawn)?;
        let stdin = child.stdin.take().ok_or_else(|| {
            McpClientError::Spawn(std::io::Error::other("child stdin not piped"))
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            McpClientError::Spawn(std::io::Error::other("child stdout not piped"))
        })?;
        let stderr = child.stderr.take();

        let pending = Arc::new(PendingRequests::new());
        let (out_tx, out_rx) = mpsc::unbounded_channel();

        let writer_task = tokio::spawn(Self::writer_loop(stdin, out_rx));
        let reader_task = tokio::spawn(Self::reader_loop(stdout, pending.clone()));

        if let Some(stderr) = stderr {
            tokio::spawn(Self::drain_stderr(stderr));
        }

        Ok(Self {
            child: AsyncMutex::new(child),
            pending,
            out_tx,
            closed: AtomicBool::new(false),
            reader_task: AsyncMutex::new(Some(reader_task)),
            writer_task: AsyncMutex::new(Some(writer_task)),
        })
    }

    async fn writer_loop(mut stdin: tokio::process::ChildStdin, mut rx: mpsc::UnboundedReceiver<Outbound>) {
        while let Some(msg) = rx.recv().await {
            let line = match &msg {
                Outbound::Request(r) => serde_json::to_string(r),
                Outbound::Notification(n) => serde_json::to_string(n),
            };
            let Ok(mut line) = line else { continue };
            line.push('\n');
            if stdin.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            if stdin.flush().await.is_err() {
                break;
            }
        }
    }

    async fn reader_loop(stdout: tokio::process::ChildStdout, pending: Arc<PendingRequests>) {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    Self::dispatch_line(&line, &pending);
                }
                Ok(None) => break,
                Err(_) => break,
            }
        }
        pending.fail_all(|| McpClientError::ServerExited(RequestId::Integer(0)));
    }

    fn dispatch_line(line: &str, pending: &PendingRequests) {
        let parsed: std::result::Result<JSONRPCMessage, _> = serde_json::from_str(line);
        match parsed {
            Ok(JSONRPCMessage::Response(resp)) => {
                pending.complete(&resp.id, Ok(resp.result));
            }
            Ok(JSONRPCMessage::Error(err)) => {
                pending.complete(
                    &err.id,
                    Err(McpClientError::Rpc {
                        code: err.error.code,
                        message: err.error.message,
                    }),
                );
            }
            // Server->client requests/notifications (e.g. logging messages) are
            // out of scope for this client's surface; drop them.
            Ok(_) => {}
            Err(_) => {}
        }
    }

    async fn drain_stderr(stderr: tokio::process::ChildStderr) {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(target: "mcp_client::stdio", "server stderr: {line}");
        }
    }

    pub fn send_notification(&self, method: &str, params: Option<Value>) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(McpClientError::Closed);
        }
        let notification = JSONRPCNotification {
            jsonrpc: mcp_types::JSONRPC_VERSION.to_string(),
            method: method.to_string(),
            params,
        };
        self.out_tx
            .send(Outbound::Notification(notification))
            .map_err(|_| McpClientError::Closed)
    }

    pub async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: std::time::Duration,
        cancel: Option<&tokio_util::sync::CancellationToken>,
    ) -> Result<Value> {
        if self.closed.load(Ordering::Acquire) {
            return Err(McpClientError::Closed);
        }
        let id = self.pending.next_id();
        let request = JSONRPCRequest {
            jsonrpc: mcp_types::JSONRPC_VERSION.to_string(),
            id: id.clone(),
            method: method.to_string(),
            params,
        };
        self.out_tx
            .send(Outbound::Request(request))
            .map_err(|_| McpClientError::Closed)?;
        self.pending.wait_for(id, timeout, cancel).await
    }

    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.pending.fail_all(|| McpClientError::Closed);
        if let Some(task) = self.reader_task.lock().await.take() {
            task.abort();
        }
        if let Some(task) = self.writer_task.lock().await.take() {
            task.abort();
        }
        let mut child = self.child.lock().await;
        #[cfg(unix)]
        {
            if let Some(pid) = child.id() {
                // SIGTERM first so a well-behaved server can flush and exit;
                // kill_on_drop covers the case where it doesn't.
                unsafe {
                    libc::kill(pid as libc::pid_t, libc::SIGTERM);
                }
            }
        }
        let _ = tokio::time::timeout(std::time::Duration::from_secs(2), child.wait()).await;
        let _ = child.start_kill();
    }
}
