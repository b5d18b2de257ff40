//! Sidecar-process transport: one child process per instance token.
//!
//! The sidecar owns the actual messaging client and its on-disk auth
//! state; we hand it the token and session directory through the
//! environment and speak the [`wire`](super::wire) line protocol over
//! its stdio.

use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

use super::wire::{self, CommandFrame, CommandReply, SidecarEvent, SidecarFrame};
use super::{ProfileInfo, SendReceipt, Transport, TransportError, TransportEvent, TransportSession};
use crate::common::config::SidecarSettings;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);
const KILL_WAIT: Duration = Duration::from_secs(5);

pub const TOKEN_ENV: &str = "CHATBRIDGE_TOKEN";
pub const SESSION_DIR_ENV: &str = "CHATBRIDGE_SESSION_DIR";

/// Spawns the configured sidecar program for each opened session.
pub struct SidecarTransport {
    command: String,
    args: Vec<String>,
}

impl SidecarTransport {
    pub fn new(settings: &SidecarSettings) -> Self {
        Self {
            command: settings.command.clone(),
            args: settings.args.clone(),
        }
    }
}

#[async_trait]
impl Transport for SidecarTransport {
    async fn open(
        &self,
        token: &str,
        session_dir: &Path,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Box<dyn TransportSession>, TransportError> {
        tokio::fs::create_dir_all(session_dir).await?;

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .env(TOKEN_ENV, token)
            .env(SESSION_DIR_ENV, session_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TransportError::Spawn(format!("{}: {e}", self.command)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::Spawn("sidecar stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::Spawn("sidecar stdout not captured".to_string()))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(log_stderr(token.to_string(), stderr));
        }

        let pending: Arc<DashMap<u64, oneshot::Sender<CommandReply>>> = Arc::new(DashMap::new());
        tokio::spawn(read_frames(
            token.to_string(),
            stdout,
            pending.clone(),
            events,
        ));

        info!("started sidecar for instance '{token}' (pid {:?})", child.id());

        Ok(Box::new(SidecarSession {
            token: token.to_string(),
            child: Mutex::new(Some(child)),
            stdin: Mutex::new(stdin),
            pending,
            next_id: AtomicU64::new(1),
        }))
    }
}

struct SidecarSession {
    token: String,
    child: Mutex<Option<Child>>,
    stdin: Mutex<ChildStdin>,
    pending: Arc<DashMap<u64, oneshot::Sender<CommandReply>>>,
    next_id: AtomicU64,
}

impl SidecarSession {
    async fn request(&self, command: wire::Command<'_>) -> Result<serde_json::Value, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        let mut line = serde_json::to_string(&CommandFrame { id, command })
            .map_err(|e| TransportError::Protocol(e.to_string()))?;
        line.push('\n');

        {
            let mut stdin = self.stdin.lock().await;
            if let Err(e) = stdin.write_all(line.as_bytes()).await {
                self.pending.remove(&id);
                return Err(TransportError::Io(e));
            }
            if let Err(e) = stdin.flush().await {
                self.pending.remove(&id);
                return Err(TransportError::Io(e));
            }
        }

        let reply = match tokio::time::timeout(COMMAND_TIMEOUT, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => return Err(TransportError::Closed),
            Err(_) => {
                self.pending.remove(&id);
                return Err(TransportError::Timeout);
            }
        };

        if reply.ok {
            Ok(reply.result.unwrap_or(serde_json::Value::Null))
        } else {
            Err(TransportError::Command(
                reply.error.unwrap_or_else(|| "unspecified error".to_string()),
            ))
        }
    }
}

#[async_trait]
impl TransportSession for SidecarSession {
    async fn send_text(&self, to: &str, body: &str) -> Result<SendReceipt, TransportError> {
        let result = self.request(wire::Command::Send { to, body }).await?;
        serde_json::from_value(result)
            .map_err(|e| TransportError::Protocol(format!("bad send receipt: {e}")))
    }

    async fn resolve_number(&self, number: &str) -> Result<Option<String>, TransportError> {
        let result = self.request(wire::Command::NumberId { number }).await?;
        if result.is_null() {
            return Ok(None);
        }
        let parsed: wire::NumberIdResult = serde_json::from_value(result)
            .map_err(|e| TransportError::Protocol(format!("bad number-id reply: {e}")))?;
        Ok(parsed.number_id)
    }

    async fn profile(&self) -> Result<ProfileInfo, TransportError> {
        let result = self.request(wire::Command::Profile).await?;
        serde_json::from_value(result)
            .map_err(|e| TransportError::Protocol(format!("bad profile reply: {e}")))
    }

    async fn logout(&self) -> Result<(), TransportError> {
        self.request(wire::Command::Logout).await.map(|_| ())
    }

    async fn close(self: Box<Self>) -> Result<(), TransportError> {
        let Some(mut child) = self.child.lock().await.take() else {
            return Ok(());
        };

        if let Err(e) = child.kill().await {
            // failed kill usually means the process is already dead
            warn!("sidecar '{}' kill failed: {e}", self.token);
            return Ok(());
        }

        match tokio::time::timeout(KILL_WAIT, child.wait()).await {
            Ok(Ok(status)) => {
                debug!("sidecar '{}' exited with {status}", self.token);
                Ok(())
            }
            Ok(Err(e)) => Err(TransportError::Io(e)),
            Err(_) => {
                warn!("sidecar '{}' did not exit after {KILL_WAIT:?}", self.token);
                Ok(())
            }
        }
    }
}

/// Route sidecar stdout lines: replies to waiting commands, events to
/// the registry. Synthesizes a disconnect when the stream ends so a
/// crashed sidecar is observed like a transport-reported drop.
async fn read_frames(
    token: String,
    stdout: ChildStdout,
    pending: Arc<DashMap<u64, oneshot::Sender<CommandReply>>>,
    events: mpsc::Sender<TransportEvent>,
) {
    let reader = BufReader::new(stdout);
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await.ok().flatten() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<SidecarFrame>(&line) {
            Ok(SidecarFrame::Reply(reply)) => {
                if let Some((_, tx)) = pending.remove(&reply.id) {
                    let _ = tx.send(reply);
                } else {
                    warn!("sidecar '{token}': reply for unknown command id {}", reply.id);
                }
            }
            Ok(SidecarFrame::Event(event)) => {
                let event = match event {
                    SidecarEvent::Qr { data } => TransportEvent::PairingCode(data),
                    SidecarEvent::Authenticated => TransportEvent::Authenticated,
                    SidecarEvent::Ready => TransportEvent::Ready,
                    SidecarEvent::AuthFailure { reason } => TransportEvent::AuthFailure(reason),
                    SidecarEvent::Disconnected { reason } => TransportEvent::Disconnected(reason),
                };
                if events.send(event).await.is_err() {
                    debug!("sidecar '{token}': event receiver dropped, stopping reader");
                    return;
                }
            }
            Err(e) => {
                warn!("sidecar '{token}': unparseable line ({e}): {line}");
            }
        }
    }

    debug!("sidecar '{token}': stdout closed");
    // wake anything still waiting on a reply
    pending.clear();
    let _ = events
        .send(TransportEvent::Disconnected(
            "transport process exited".to_string(),
        ))
        .await;
}

// The sidecar uses stderr for its own logging only.
async fn log_stderr(token: String, stderr: ChildStderr) {
    let reader = BufReader::new(stderr);
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await.ok().flatten() {
        let lowered = line.to_lowercase();
        if lowered.contains("error") || lowered.contains("fatal") {
            tracing::error!("sidecar '{token}': {line}");
        } else {
            tracing::debug!("sidecar '{token}': {line}");
        }
    }
}
