//! Line protocol spoken with the sidecar process.
//!
//! Every line on either side is one JSON object. The sidecar pushes
//! lifecycle events and answers commands; replies are correlated to
//! commands by numeric `id`.

use serde::{Deserialize, Serialize};

/// Parent → child command, written as `{"id": N, "cmd": ..., ...}`.
#[derive(Debug, Serialize)]
pub struct CommandFrame<'a> {
    pub id: u64,
    #[serde(flatten)]
    pub command: Command<'a>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command<'a> {
    Send { to: &'a str, body: &'a str },
    NumberId { number: &'a str },
    Profile,
    Logout,
}

/// Child → parent line: either a command reply or an unsolicited event.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SidecarFrame {
    Reply(CommandReply),
    Event(SidecarEvent),
}

#[derive(Debug, Deserialize)]
pub struct CommandReply {
    pub id: u64,
    pub ok: bool,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SidecarEvent {
    Qr {
        data: String,
    },
    Authenticated,
    Ready,
    AuthFailure {
        #[serde(default)]
        reason: String,
    },
    Disconnected {
        #[serde(default)]
        reason: String,
    },
}

/// `number_id` reply payload.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberIdResult {
    #[serde(default)]
    pub number_id: Option<String>,
}
