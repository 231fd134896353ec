//! Line-delimited JSON-RPC stdio transport (spec §6). Grounded directly on
//! `mcp-server/src/lib.rs::run_main`'s three-task pipeline: a stdin reader
//! task, a processor task, and a stdout writer task, joined with
//! `tokio::join!`. Generalized only in that the processor here is the run
//! orchestrator instead of an MCP tool-call handler.

use mcp_types::JSONRPCMessage;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::io::{self};
use tokio::sync::mpsc;
use tracing::debug;
use tracing::error;
use tracing::info;

pub const CHANNEL_CAPACITY: usize = 128;

/// Spawns the stdin-reader and stdout-writer tasks and returns the channel
/// endpoints the orchestrator drives directly, so the orchestrator owns the
/// dispatch loop rather than a third generic "processor" task.
pub fn spawn_stdio_pipeline() -> (
    mpsc::Receiver<JSONRPCMessage>,
    mpsc::Sender<JSONRPCMessage>,
    tokio::task::JoinHandle<()>,
    tokio::task::JoinHandle<()>,
) {
    let (incoming_tx, incoming_rx) = mpsc::channel::<JSONRPCMessage>(CHANNEL_CAPACITY);
    let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<JSONRPCMessage>(CHANNEL_CAPACITY);

    let stdin_reader_handle = tokio::spawn(async move {
        let stdin = io::stdin();
        let reader = BufReader::new(stdin);
        let mut lines = reader.lines();

        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<JSONRPCMessage>(&line) {
                        Ok(msg) => {
                            if incoming_tx.send(msg).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => error!("failed to deserialize JSONRPCMessage: {e}"),
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!("stdin read error: {e}");
                    break;
                }
            }
        }
        debug!("stdin reader finished (EOF)");
    });

    let stdout_writer_handle = tokio::spawn(async move {
        let mut stdout = io::stdout();
        while let Some(msg) = outgoing_rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if let Err(e) = stdout.write_all(json.as_bytes()).await {
                        error!("failed to write to stdout: {e}");
                        break;
                    }
                    if let Err(e) = stdout.write_all(b"\n").await {
                        error!("failed to write newline to stdout: {e}");
                        break;
                    }
                    if let Err(e) = stdout.flush().await {
                        error!("failed to flush stdout: {e}");
                        break;
                    }
                }
                Err(e) => error!("failed to serialize JSONRPCMessage: {e}"),
            }
        }
        info!("stdout writer exited (channel closed)");
    });

    (incoming_rx, outgoing_tx, stdin_reader_handle, stdout_writer_handle)
}
