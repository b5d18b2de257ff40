//! Per-token instance record: lifecycle status, pairing material,
//! profile info, and the live transport session (if any).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::transport::{ProfileInfo, TransportSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Uninitialized,
    Initializing,
    WaitingForScan,
    Connected,
    Disconnected,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Uninitialized => "uninitialized",
            InstanceStatus::Initializing => "initializing",
            InstanceStatus::WaitingForScan => "waiting_for_scan",
            InstanceStatus::Connected => "connected",
            InstanceStatus::Disconnected => "disconnected",
        }
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of one instance, as reported to HTTP callers.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceSnapshot {
    pub token: String,
    pub status: InstanceStatus,
    pub ready: bool,
    #[serde(rename = "hasQr")]
    pub has_qr: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct InstanceState {
    pub status: InstanceStatus,
    pub qr: Option<String>,
    pub profile: Option<ProfileInfo>,
}

pub struct Instance {
    token: String,
    session_dir: PathBuf,
    state: RwLock<InstanceState>,
    session: Mutex<Option<Box<dyn TransportSession>>>,
    // bumped on every session open; event loops carry the generation
    // they were spawned for so signals from a defunct session cannot
    // touch a revived one
    generation: AtomicU64,
}

impl Instance {
    pub(crate) fn new(token: &str, session_dir: PathBuf) -> Self {
        Self {
            token: token.to_string(),
            session_dir,
            state: RwLock::new(InstanceState {
                status: InstanceStatus::Uninitialized,
                qr: None,
                profile: None,
            }),
            session: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Advance to a new session generation and return it.
    pub(crate) fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    pub fn status(&self) -> InstanceStatus {
        self.read_state().status
    }

    pub fn qr(&self) -> Option<String> {
        self.read_state().qr
    }

    pub fn profile(&self) -> Option<ProfileInfo> {
        self.read_state().profile
    }

    pub fn snapshot(&self) -> InstanceSnapshot {
        let state = self.read_state();
        InstanceSnapshot {
            token: self.token.clone(),
            status: state.status,
            ready: state.status == InstanceStatus::Connected,
            has_qr: state.qr.is_some(),
        }
    }

    pub(crate) fn read_state(&self) -> InstanceState {
        match self.state.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => {
                tracing::error!("instance state lock poisoned, recovering");
                poisoned.into_inner().clone()
            }
        }
    }

    pub(crate) fn update<F: FnOnce(&mut InstanceState)>(&self, f: F) {
        let mut guard = match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("instance state lock poisoned, recovering");
                poisoned.into_inner()
            }
        };
        f(&mut guard);
    }

    pub(crate) async fn put_session(&self, session: Box<dyn TransportSession>) {
        *self.session.lock().await = Some(session);
    }

    pub(crate) async fn take_session(&self) -> Option<Box<dyn TransportSession>> {
        self.session.lock().await.take()
    }

    pub(crate) async fn has_session(&self) -> bool {
        self.session.lock().await.is_some()
    }

    pub(crate) fn session(&self) -> &Mutex<Option<Box<dyn TransportSession>>> {
        &self.session
    }
}
