//! Seam between the registry and the external messaging client.
//!
//! The registry only knows these traits; production wires in the sidecar
//! process transport, tests substitute a scripted one.

mod sidecar;
pub mod wire;

pub use sidecar::SidecarTransport;

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to start transport session: {0}")]
    Spawn(String),
    #[error("transport session closed")]
    Closed,
    #[error("transport command failed: {0}")]
    Command(String),
    #[error("timed out waiting for transport reply")]
    Timeout,
    #[error("transport protocol error: {0}")]
    Protocol(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Account details reported by the transport once a session is linked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileInfo {
    pub name: String,
    pub number: String,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub battery: Option<u8>,
}

/// Transport-assigned identity of a dispatched message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReceipt {
    pub message_id: String,
    pub timestamp: i64,
}

/// Asynchronous lifecycle signals raised by a transport session.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Pairing material is available for scanning.
    PairingCode(String),
    /// Credentials accepted; session not usable yet.
    Authenticated,
    /// Session fully established.
    Ready,
    AuthFailure(String),
    Disconnected(String),
}

/// Factory for per-token transport sessions.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a session scoped to `session_dir`, delivering lifecycle
    /// signals through `events`. Returns as soon as the session object
    /// exists; establishment continues asynchronously.
    async fn open(
        &self,
        token: &str,
        session_dir: &Path,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Box<dyn TransportSession>, TransportError>;
}

/// One live connection to the messaging network.
#[async_trait]
pub trait TransportSession: Send + Sync {
    async fn send_text(&self, to: &str, body: &str) -> Result<SendReceipt, TransportError>;

    /// Resolve a normalized number to its registered transport id, if any.
    async fn resolve_number(&self, number: &str) -> Result<Option<String>, TransportError>;

    async fn profile(&self) -> Result<ProfileInfo, TransportError>;

    /// Transport-level logout (unlink the account).
    async fn logout(&self) -> Result<(), TransportError>;

    /// Terminate the session and release its resources.
    async fn close(self: Box<Self>) -> Result<(), TransportError>;
}
