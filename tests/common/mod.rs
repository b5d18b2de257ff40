#![allow(dead_code)]

pub mod http;
pub mod mock_transport;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chatbridge::registry::{Registry, RegistrySettings};

use self::mock_transport::MockTransport;

pub fn test_settings(data_dir: &Path) -> RegistrySettings {
    RegistrySettings {
        data_dir: data_dir.to_path_buf(),
        max_instances: 4,
        restart_delay: Duration::from_millis(10),
        shutdown_timeout: Duration::from_secs(2),
    }
}

pub fn test_registry(transport: Arc<MockTransport>, data_dir: &Path) -> Arc<Registry> {
    Arc::new(Registry::new(transport, test_settings(data_dir)))
}

/// Poll until `condition` holds; events are applied asynchronously, so
/// tests observing transitions need to wait for the event loop.
pub async fn wait_until<F: Fn() -> bool>(condition: F, what: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for: {what}");
}
