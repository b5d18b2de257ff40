//! Scripted transport for tests: records every opened session and hands
//! the event sender back to the test so lifecycle transitions can be
//! driven by hand.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chatbridge::transport::{
    ProfileInfo, SendReceipt, Transport, TransportError, TransportEvent, TransportSession,
};
use tokio::sync::mpsc;

#[derive(Clone)]
pub struct MockHandle {
    pub token: String,
    pub session_dir: PathBuf,
    pub events: mpsc::Sender<TransportEvent>,
    pub closed: Arc<AtomicBool>,
    pub logged_out: Arc<AtomicBool>,
}

#[derive(Default)]
pub struct MockTransport {
    fail_open: AtomicBool,
    open_count: AtomicUsize,
    handles: Mutex<Vec<MockHandle>>,
    sends: Arc<Mutex<Vec<(String, String, String)>>>,
    send_counter: Arc<AtomicUsize>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next_open(&self) {
        self.fail_open.store(true, Ordering::SeqCst);
    }

    pub fn open_count(&self) -> usize {
        self.open_count.load(Ordering::SeqCst)
    }

    /// Most recent session opened for `token`.
    pub fn handle(&self, token: &str) -> MockHandle {
        self.handles
            .lock()
            .expect("handles lock")
            .iter()
            .rev()
            .find(|h| h.token == token)
            .cloned()
            .unwrap_or_else(|| panic!("no session opened for token '{token}'"))
    }

    /// `(token, to, body)` triples in dispatch order.
    pub fn sends(&self) -> Vec<(String, String, String)> {
        self.sends.lock().expect("sends lock").clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(
        &self,
        token: &str,
        session_dir: &Path,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Box<dyn TransportSession>, TransportError> {
        if self.fail_open.swap(false, Ordering::SeqCst) {
            return Err(TransportError::Spawn("scripted failure".to_string()));
        }

        // the real transport persists auth material here
        std::fs::create_dir_all(session_dir)?;
        self.open_count.fetch_add(1, Ordering::SeqCst);

        let handle = MockHandle {
            token: token.to_string(),
            session_dir: session_dir.to_path_buf(),
            events,
            closed: Arc::new(AtomicBool::new(false)),
            logged_out: Arc::new(AtomicBool::new(false)),
        };
        let session = MockSession {
            token: token.to_string(),
            closed: handle.closed.clone(),
            logged_out: handle.logged_out.clone(),
            sends: self.sends.clone(),
            send_counter: self.send_counter.clone(),
        };
        self.handles.lock().expect("handles lock").push(handle);

        Ok(Box::new(session))
    }
}

struct MockSession {
    token: String,
    closed: Arc<AtomicBool>,
    logged_out: Arc<AtomicBool>,
    sends: Arc<Mutex<Vec<(String, String, String)>>>,
    send_counter: Arc<AtomicUsize>,
}

#[async_trait]
impl TransportSession for MockSession {
    async fn send_text(&self, to: &str, body: &str) -> Result<SendReceipt, TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let n = self.send_counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.sends.lock().expect("sends lock").push((
            self.token.clone(),
            to.to_string(),
            body.to_string(),
        ));
        Ok(SendReceipt {
            message_id: format!("msg-{n}"),
            timestamp: 1_700_000_000 + n as i64,
        })
    }

    async fn resolve_number(&self, number: &str) -> Result<Option<String>, TransportError> {
        // numbers starting 999 are scripted as unregistered
        if number.starts_with("999") {
            Ok(None)
        } else {
            Ok(Some(format!("{number}@c.us")))
        }
    }

    async fn profile(&self) -> Result<ProfileInfo, TransportError> {
        Ok(ProfileInfo {
            name: "Test Account".to_string(),
            number: "254700000001".to_string(),
            platform: Some("android".to_string()),
            battery: Some(88),
        })
    }

    async fn logout(&self) -> Result<(), TransportError> {
        self.logged_out.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
