//! Instance registry: one messaging session per tenant token.
//!
//! Owns the token → instance map, serializes lifecycle operations per
//! token, and observes transport lifecycle events through per-instance
//! event loops. Operations on different tokens never contend.

mod events;
mod instance;

pub use instance::{Instance, InstanceSnapshot, InstanceStatus};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::common::address;
use crate::common::errors::AppError;
use crate::transport::{ProfileInfo, Transport, TransportError};

const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Registry tuning, derived from [`AppConfig`](crate::common::AppConfig).
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    pub data_dir: PathBuf,
    pub max_instances: usize,
    pub restart_delay: Duration,
    pub shutdown_timeout: Duration,
}

impl From<&crate::common::AppConfig> for RegistrySettings {
    fn from(config: &crate::common::AppConfig) -> Self {
        Self {
            data_dir: config.data_dir.clone(),
            max_instances: config.max_instances,
            restart_delay: Duration::from_millis(config.restart_delay_ms),
            shutdown_timeout: Duration::from_secs(config.shutdown_timeout_secs),
        }
    }
}

/// Outcome of a pairing-material query.
#[derive(Debug, Clone, PartialEq)]
pub enum PairingOutcome {
    NotInitialized,
    Ready { qr: String },
    AlreadyConnected,
    NotReady { status: InstanceStatus },
}

/// A successfully dispatched message.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchedMessage {
    pub message_id: String,
    pub timestamp: i64,
    pub to: String,
}

/// Registration check result for a recipient number.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberCheck {
    pub number: String,
    pub registered: bool,
    pub number_id: Option<String>,
}

/// Aggregate counts for the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub total: usize,
    pub connected: usize,
    pub waiting_for_scan: usize,
    pub disconnected: usize,
}

pub struct Registry {
    transport: Arc<dyn Transport>,
    settings: RegistrySettings,
    instances: DashMap<String, Arc<Instance>>,
    // per-token lifecycle gates; they outlive instance entries so a
    // restart cannot race a concurrent logout or remove across an
    // entry swap
    gates: DashMap<String, Arc<Mutex<()>>>,
    // serializes the capacity check against the entry insert so
    // concurrent inits of distinct tokens cannot overshoot the limit
    admission: Mutex<()>,
}

impl Registry {
    pub fn new(transport: Arc<dyn Transport>, settings: RegistrySettings) -> Self {
        Self {
            transport,
            settings,
            instances: DashMap::new(),
            gates: DashMap::new(),
            admission: Mutex::new(()),
        }
    }

    fn gate(&self, token: &str) -> Arc<Mutex<()>> {
        self.gates.entry(token.to_string()).or_default().clone()
    }

    fn get(&self, token: &str) -> Option<Arc<Instance>> {
        self.instances.get(token).map(|entry| entry.value().clone())
    }

    /// Create (or revive) the instance for `token`.
    ///
    /// Idempotent while a live transport session exists; when the entry
    /// survived a disconnect or logout, a fresh session is constructed.
    pub async fn init(&self, token: &str) -> Result<InstanceSnapshot, AppError> {
        validate_token(token)?;
        let gate = self.gate(token);
        let _guard = gate.lock().await;
        self.init_locked(token).await
    }

    async fn init_locked(&self, token: &str) -> Result<InstanceSnapshot, AppError> {
        if let Some(existing) = self.get(token) {
            if existing.has_session().await {
                return Ok(existing.snapshot());
            }
            // entry kept across a disconnect; build a fresh session
            existing.update(|state| {
                state.status = InstanceStatus::Initializing;
                state.qr = None;
                state.profile = None;
            });
            if let Err(err) = self.open_session(&existing).await {
                existing.update(|state| state.status = InstanceStatus::Disconnected);
                return Err(err.into());
            }
            return Ok(existing.snapshot());
        }

        let instance = {
            let _admitted = self.admission.lock().await;
            if self.instances.len() >= self.settings.max_instances {
                warn!(
                    "instance limit ({}) reached, rejecting init for '{token}'",
                    self.settings.max_instances
                );
                return Err(AppError::CapacityExhausted);
            }
            let instance = Arc::new(Instance::new(token, self.settings.data_dir.join(token)));
            instance.update(|state| state.status = InstanceStatus::Initializing);
            self.instances.insert(token.to_string(), instance.clone());
            instance
        };

        if let Err(err) = self.open_session(&instance).await {
            self.instances.remove(token);
            return Err(err.into());
        }

        info!("initialized instance '{token}'");
        Ok(instance.snapshot())
    }

    async fn open_session(&self, instance: &Arc<Instance>) -> Result<(), TransportError> {
        // fence out any event loop left over from a previous session
        // before the new one starts emitting
        let generation = instance.next_generation();
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let session = self
            .transport
            .open(instance.token(), instance.session_dir(), tx)
            .await?;
        instance.put_session(session).await;
        events::spawn_event_loop(instance.clone(), rx, generation);
        Ok(())
    }

    /// Current snapshot, or `None` for an unknown token. Never creates
    /// an entry.
    pub fn status(&self, token: &str) -> Option<InstanceSnapshot> {
        self.get(token).map(|instance| instance.snapshot())
    }

    pub fn pairing(&self, token: &str) -> PairingOutcome {
        let Some(instance) = self.get(token) else {
            return PairingOutcome::NotInitialized;
        };
        match instance.status() {
            InstanceStatus::Connected => PairingOutcome::AlreadyConnected,
            InstanceStatus::WaitingForScan => match instance.qr() {
                Some(qr) => PairingOutcome::Ready { qr },
                // transition window: ready event raced the read
                None => PairingOutcome::NotReady {
                    status: InstanceStatus::WaitingForScan,
                },
            },
            status => PairingOutcome::NotReady { status },
        }
    }

    /// Dispatch a text message. Requires `connected`; the recipient is
    /// normalized to the transport's addressing scheme first.
    pub async fn send(
        &self,
        token: &str,
        number: &str,
        message: &str,
    ) -> Result<DispatchedMessage, AppError> {
        let instance = self.require_connected(token)?;
        let to = address::normalize_recipient(number)
            .ok_or_else(|| AppError::BadRequest("invalid recipient number".to_string()))?;

        let guard = instance.session().lock().await;
        let session = guard
            .as_ref()
            .ok_or_else(|| AppError::NotReady("instance has no live session".to_string()))?;
        let receipt = session.send_text(&to, message).await?;

        Ok(DispatchedMessage {
            message_id: receipt.message_id,
            timestamp: receipt.timestamp,
            to,
        })
    }

    /// Check whether a number is registered on the transport.
    pub async fn number_id(&self, token: &str, raw: &str) -> Result<NumberCheck, AppError> {
        let instance = self.require_connected(token)?;
        let number = address::normalize_msisdn(raw)
            .ok_or_else(|| AppError::BadRequest("invalid phone number".to_string()))?;

        let guard = instance.session().lock().await;
        let session = guard
            .as_ref()
            .ok_or_else(|| AppError::NotReady("instance has no live session".to_string()))?;
        let number_id = session.resolve_number(&number).await?;

        Ok(NumberCheck {
            number,
            registered: number_id.is_some(),
            number_id,
        })
    }

    pub fn profile_info(&self, token: &str) -> Result<ProfileInfo, AppError> {
        let instance = self.require_connected(token)?;
        instance
            .profile()
            .ok_or_else(|| AppError::NotReady("profile info not available yet".to_string()))
    }

    /// Transport-level logout. The registry entry is retained so status
    /// queries still resolve; only `remove` deletes it.
    pub async fn logout(&self, token: &str) -> Result<InstanceSnapshot, AppError> {
        // refuse before taking a gate so unknown tokens never grow the
        // gates map
        if !self.instances.contains_key(token) {
            return Err(AppError::NotFound("instance not found".to_string()));
        }
        let gate = self.gate(token);
        let _guard = gate.lock().await;

        let instance = self
            .get(token)
            .ok_or_else(|| AppError::NotFound("instance not found".to_string()))?;

        if let Some(session) = instance.take_session().await {
            if let Err(e) = session.logout().await {
                warn!("instance '{token}': transport logout failed: {e}");
            }
            if let Err(e) = session.close().await {
                warn!("instance '{token}': session close failed: {e}");
            }
        }

        instance.update(|state| {
            state.status = InstanceStatus::Disconnected;
            state.qr = None;
            state.profile = None;
        });
        info!("logged out instance '{token}'");
        Ok(instance.snapshot())
    }

    /// Tear the session down and re-run init after a short delay so the
    /// transport can release its resources. On-disk state is untouched.
    pub async fn restart(&self, token: &str) -> Result<InstanceSnapshot, AppError> {
        if !self.instances.contains_key(token) {
            return Err(AppError::NotFound("instance not found".to_string()));
        }
        let gate = self.gate(token);
        let _guard = gate.lock().await;

        let instance = self
            .get(token)
            .ok_or_else(|| AppError::NotFound("instance not found".to_string()))?;

        if let Some(session) = instance.take_session().await {
            if let Err(e) = session.close().await {
                warn!("instance '{token}': session close failed: {e}");
            }
        }
        self.instances.remove(token);

        tokio::time::sleep(self.settings.restart_delay).await;
        info!("restarting instance '{token}'");
        self.init_locked(token).await
    }

    /// Delete the registry entry and purge the token's on-disk session
    /// directory.
    pub async fn remove(&self, token: &str) -> Result<(), AppError> {
        if !self.instances.contains_key(token) {
            return Err(AppError::NotFound("instance not found".to_string()));
        }
        let gate = self.gate(token);
        let _guard = gate.lock().await;

        let instance = self
            .get(token)
            .ok_or_else(|| AppError::NotFound("instance not found".to_string()))?;

        if let Some(session) = instance.take_session().await {
            if let Err(e) = session.close().await {
                warn!("instance '{token}': session close failed: {e}");
            }
        }
        self.instances.remove(token);

        match tokio::fs::remove_dir_all(instance.session_dir()).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("instance '{token}': session dir purge failed: {e}"),
        }

        info!("removed instance '{token}'");
        Ok(())
    }

    /// Snapshots of all instances, ordered by token.
    pub fn list(&self) -> Vec<InstanceSnapshot> {
        let mut snapshots: Vec<_> = self
            .instances
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect();
        snapshots.sort_by(|a, b| a.token.cmp(&b.token));
        snapshots
    }

    pub fn health(&self) -> HealthSnapshot {
        let mut health = HealthSnapshot {
            total: 0,
            connected: 0,
            waiting_for_scan: 0,
            disconnected: 0,
        };
        for entry in self.instances.iter() {
            health.total += 1;
            match entry.value().status() {
                InstanceStatus::Connected => health.connected += 1,
                InstanceStatus::WaitingForScan => health.waiting_for_scan += 1,
                InstanceStatus::Disconnected => health.disconnected += 1,
                _ => {}
            }
        }
        health
    }

    /// Shutdown barrier: ask every live session to terminate and wait,
    /// bounded by the configured timeout.
    pub async fn shutdown(&self) {
        let drained: Vec<_> = self
            .instances
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        self.instances.clear();

        let mut closes = JoinSet::new();
        for instance in drained {
            closes.spawn(async move {
                if let Some(session) = instance.take_session().await {
                    if let Err(e) = session.close().await {
                        warn!("instance '{}': close during shutdown failed: {e}", instance.token());
                    }
                }
            });
        }

        let drain = async {
            while closes.join_next().await.is_some() {}
        };
        if tokio::time::timeout(self.settings.shutdown_timeout, drain)
            .await
            .is_err()
        {
            warn!(
                "shutdown barrier timed out after {:?}, abandoning remaining sessions",
                self.settings.shutdown_timeout
            );
            closes.abort_all();
        }
    }

    fn require_connected(&self, token: &str) -> Result<Arc<Instance>, AppError> {
        let instance = self
            .get(token)
            .ok_or_else(|| AppError::NotReady("instance not initialized".to_string()))?;
        let status = instance.status();
        if status != InstanceStatus::Connected {
            return Err(AppError::NotReady(format!("instance is {status}")));
        }
        Ok(instance)
    }
}

fn validate_token(token: &str) -> Result<(), AppError> {
    if address::valid_token(token) {
        Ok(())
    } else {
        Err(AppError::BadRequest(
            "invalid instance token format".to_string(),
        ))
    }
}
