//! Per-instance event loop: applies transport lifecycle signals to the
//! instance record.
//!
//! One task per opened session, fed by the transport through an mpsc
//! channel. The task ends when the transport drops its sender.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::instance::{Instance, InstanceStatus};
use crate::transport::TransportEvent;

pub(crate) fn spawn_event_loop(
    instance: Arc<Instance>,
    mut events: mpsc::Receiver<TransportEvent>,
    generation: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            // the instance may have been revived with a newer session;
            // signals from the superseded one must not touch it
            if instance.generation() != generation {
                break;
            }
            apply(&instance, event).await;
        }
    })
}

async fn apply(instance: &Arc<Instance>, event: TransportEvent) {
    let token = instance.token();
    match event {
        TransportEvent::PairingCode(code) => {
            info!("instance '{token}': pairing material available");
            instance.update(|state| {
                state.status = InstanceStatus::WaitingForScan;
                state.qr = Some(code);
                state.profile = None;
            });
        }
        TransportEvent::Authenticated => {
            // intermediate signal, status changes on Ready
            info!("instance '{token}': authenticated");
        }
        TransportEvent::Ready => {
            info!("instance '{token}': session ready");
            instance.update(|state| {
                state.status = InstanceStatus::Connected;
                state.qr = None;
            });
            fetch_profile(instance).await;
        }
        TransportEvent::AuthFailure(reason) => {
            warn!("instance '{token}': authentication failed: {reason}");
            instance.update(|state| {
                state.status = InstanceStatus::Disconnected;
                state.qr = None;
            });
        }
        TransportEvent::Disconnected(reason) => {
            info!("instance '{token}': disconnected: {reason}");
            instance.update(|state| {
                state.status = InstanceStatus::Disconnected;
                state.qr = None;
                state.profile = None;
            });
            // drop the dead session object so a later init builds a
            // fresh one; the registry entry itself stays
            if let Some(session) = instance.take_session().await {
                if let Err(e) = session.close().await {
                    warn!("instance '{token}': session close after disconnect failed: {e}");
                }
            }
        }
    }
}

/// Profile fetch failures leave the connected state untouched.
async fn fetch_profile(instance: &Arc<Instance>) {
    let guard = instance.session().lock().await;
    let Some(session) = guard.as_ref() else {
        return;
    };
    match session.profile().await {
        Ok(profile) => {
            drop(guard);
            instance.update(|state| state.profile = Some(profile));
        }
        Err(e) => {
            warn!("instance '{}': profile fetch failed: {e}", instance.token());
        }
    }
}
