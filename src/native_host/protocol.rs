//! Chrome native messaging wire format: a 4-byte little-endian length
//! followed by that many bytes of JSON.

use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};
use thiserror::Error;

use crate::constants::MAX_MESSAGE_SIZE;
use crate::models::{AppStorage, FocusModeConfig};
use crate::notify::Notification;
use crate::password::UnlockOutcome;
use crate::rules::{Rule, RuleLayer};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncomingMessage {
    TrackTime {
        domain: String,
        seconds: f64,
    },
    StartFocus,
    StopFocus,
    GetFocusState,
    RebuildRules,
    TemporaryAllow {
        domain: String,
        minutes: u32,
    },
    /// Merge top-level store keys.
    UpdateStore {
        changes: serde_json::Map<String, serde_json::Value>,
    },
    GetStore,
    ResetAll,
    #[serde(rename_all = "camelCase")]
    BlockCategory {
        category_id: String,
    },
    /// Absent password clears protection.
    SetPassword {
        #[serde(default)]
        password: Option<String>,
    },
    Unlock {
        password: String,
    },
    /// Rule IDs the browser currently has installed.
    #[serde(rename_all = "camelCase")]
    InstalledRules {
        #[serde(default)]
        dynamic_rule_ids: Vec<u32>,
        #[serde(default)]
        session_rule_ids: Vec<u32>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutgoingMessage {
    Ack {
        ok: bool,
    },
    FocusState {
        state: FocusModeConfig,
    },
    /// Unsolicited focus transition broadcast.
    FocusStateUpdate {
        state: FocusModeConfig,
    },
    Notify {
        id: String,
        title: String,
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    ApplyRules {
        layer: RuleLayer,
        remove_rule_ids: Vec<u32>,
        add_rules: Vec<Rule>,
    },
    Error {
        message: String,
    },
    UnlockResult {
        result: UnlockOutcome,
    },
    StoreSnapshot {
        store: Box<AppStorage>,
    },
}

impl From<Notification> for OutgoingMessage {
    fn from(notification: Notification) -> Self {
        OutgoingMessage::Notify {
            id: notification.id,
            title: notification.title,
            message: notification.message,
        }
    }
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The oversized payload has already been skipped.
    #[error("Message too large: {0} bytes (max: {max} bytes)", max = MAX_MESSAGE_SIZE)]
    TooLarge(usize),

    /// The frame was consumed but is not a known message.
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl FrameError {
    /// Whether the stream is still positioned at a frame boundary.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, FrameError::Io(_))
    }
}

pub fn read_message<R: Read>(input: &mut R) -> Result<IncomingMessage, FrameError> {
    // Chrome Native Messaging protocol specifies little-endian byte order
    let mut len_bytes = [0u8; 4];
    input.read_exact(&mut len_bytes)?;
    let len = usize::try_from(u32::from_le_bytes(len_bytes))
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    if len > MAX_MESSAGE_SIZE {
        let limit = u64::try_from(len).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        io::copy(&mut input.by_ref().take(limit), &mut io::sink())?;
        return Err(FrameError::TooLarge(len));
    }

    let mut buffer = vec![0u8; len];
    input.read_exact(&mut buffer)?;

    Ok(serde_json::from_slice(&buffer)?)
}

pub fn write_message<W: Write>(output: &mut W, message: &OutgoingMessage) -> io::Result<()> {
    let json = serde_json::to_vec(message)?;
    let len = u32::try_from(json.len())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    // Chrome Native Messaging protocol specifies little-endian byte order
    output.write_all(&len.to_le_bytes())?;
    output.write_all(&json)?;
    output.flush()
}
