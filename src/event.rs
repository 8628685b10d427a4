//! Event — the tagged message types for `Inkboard`.
//!
//! ARCHITECTURE
//! ============
//! Every communication is a tagged JSON event. Clients send `ClientEvent`s
//! over WebSocket, the server runs them through one per-connection state
//! machine, and the results flow back out as `ServerEvent`s. The `type` tag
//! selects the variant; unknown tags fail deserialization at the boundary so
//! nothing malformed reaches the core.
//!
//! DESIGN
//! ======
//! - Each event kind enumerates its required/optional fields explicitly.
//!   There is no generic payload map for inbound traffic.
//! - Outbound errors carry a grepable `code` via the `ErrorCode` trait so
//!   clients can render distinguishable notices.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// =============================================================================
// TIME
// =============================================================================

/// Current time as milliseconds since Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

// =============================================================================
// ROLES
// =============================================================================

/// Participant role. Administrators bypass per-item ownership checks and are
/// the only role allowed to wipe the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Standard,
    Administrator,
}

// =============================================================================
// PAYLOADS
// =============================================================================

/// One point on a stroke path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// A drawn stroke: point path plus style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrokePayload {
    pub points: Vec<Point>,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default = "default_width")]
    pub width: f64,
}

fn default_color() -> String {
    "#000000".into()
}

fn default_width() -> f64 {
    2.0
}

/// A text note: content, position, size, and the self-declared owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextPayload {
    pub content: String,
    pub x: f64,
    pub y: f64,
    #[serde(default = "default_font_size")]
    pub font_size: f64,
    /// Self-declared at creation; trusted (cooperative model, not a security
    /// boundary). Defaults to the sender's username when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

fn default_font_size() -> f64 {
    16.0
}

// =============================================================================
// INBOUND EVENTS
// =============================================================================

/// Everything a client may send over the live channel.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientEvent {
    Join {
        username: String,
        #[serde(default)]
        role: Role,
    },
    Draw {
        stroke: StrokePayload,
    },
    CreateText {
        text: TextPayload,
    },
    UpdateText {
        id: i64,
        content: String,
        /// Declared owner, checked against the sender's username.
        owner: Option<String>,
    },
    MoveText {
        id: i64,
        x: f64,
        y: f64,
        owner: Option<String>,
    },
    DeleteText {
        id: i64,
    },
    Clear,
}

// =============================================================================
// OUTBOUND EVENTS
// =============================================================================

/// Roster entry published to clients. Never exposes connection ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub username: String,
    pub role: Role,
    pub joined_at: i64,
}

/// Everything the server may push to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerEvent {
    ParticipantJoined {
        username: String,
        role: Role,
    },
    ParticipantLeft {
        username: String,
    },
    ActiveParticipants {
        participants: Vec<ParticipantInfo>,
    },
    Draw {
        id: i64,
        stroke: StrokePayload,
        by: String,
        ts: i64,
    },
    /// A created text note (also used for replay-on-join).
    Text {
        id: i64,
        text: TextPayload,
        by: Option<String>,
        ts: i64,
    },
    UpdateText {
        id: i64,
        content: String,
    },
    MoveText {
        id: i64,
        x: f64,
        y: f64,
    },
    DeleteText {
        id: i64,
    },
    /// Full reset: every client wipes its canvas, originator included.
    BoardCleared,
    ClearError {
        message: String,
    },
    Error {
        code: String,
        message: String,
    },
    Notification {
        message: String,
    },
}

// =============================================================================
// ERROR CODES
// =============================================================================

/// Grepable error code for structured error events.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;
}

impl ServerEvent {
    /// Build an `error` event from a typed error.
    pub fn error_from(err: &(impl ErrorCode + ?Sized)) -> Self {
        Self::Error { code: err.error_code().to_string(), message: err.to_string() }
    }

    /// Build an `error` event from a code and plain message.
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error { code: code.into(), message: message.into() }
    }
}

#[cfg(test)]
#[path = "event_test.rs"]
mod tests;
