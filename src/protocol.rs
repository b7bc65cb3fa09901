//! Wire formats for the panel boundary and the chat backend.
//!
//! Two contracts live here:
//!
//! - **Boundary messages** cross the isolation barrier between the
//!   presentation surface and the host bridge. They are JSON objects tagged
//!   by `command` and travel as serialized strings, FIFO per direction.
//! - **Backend envelopes** are the bodies of `POST /chat` and its reply.
//!
//! # Example
//!
//! ```rust
//! use air_chat::protocol::{HostMessage, RequestId, encode};
//!
//! let msg = HostMessage::ErrorMessage {
//!     id: Some(RequestId(7)),
//!     text: "backend unavailable".to_string(),
//! };
//! let raw = encode(&msg).unwrap();
//! assert!(raw.contains(r#""command":"errorMessage""#));
//! ```

use std::fmt;

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::Result;
use crate::transcript::TranscriptEntry;

/// Correlates a `sendMessage` with the host reply it produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend envelopes
// ─────────────────────────────────────────────────────────────────────────────

/// Body of `POST /chat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequestEnvelope {
    /// The new user message.
    pub request: String,
    /// Conversation so far, including the new user message.
    #[serde(default)]
    pub history: Vec<TranscriptEntry>,
}

/// Legacy request body understood by older backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyChatRequest {
    pub message: String,
}

/// The `value` carried by a `sendMessage`, in either accepted shape.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OutboundValue {
    Envelope(ChatRequestEnvelope),
    Legacy(LegacyChatRequest),
}

impl OutboundValue {
    /// Parse the JSON string found in `sendMessage.value`.
    pub fn parse(value: &str) -> Result<Self> {
        Ok(serde_json::from_str(value)?)
    }

    /// Normalize to the `{ request, history }` form.
    #[must_use]
    pub fn into_envelope(self) -> ChatRequestEnvelope {
        match self {
            Self::Envelope(envelope) => envelope,
            Self::Legacy(LegacyChatRequest { message }) => ChatRequestEnvelope {
                request: message,
                history: Vec::new(),
            },
        }
    }
}

/// Reply body of `POST /chat`.
///
/// `history` is kept as raw JSON: a malformed history must not sink an
/// otherwise valid answer, it is just not used for replay.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ChatResponseBody {
    Error {
        error: String,
    },
    Reply {
        response: String,
        #[serde(default)]
        history: Option<serde_json::Value>,
    },
}

/// Extract a replayable history from a raw JSON value.
///
/// Returns `None` unless the value is a non-empty array of well-formed
/// transcript entries.
#[must_use]
pub fn parse_history(value: serde_json::Value) -> Option<Vec<TranscriptEntry>> {
    serde_json::from_value::<Vec<TranscriptEntry>>(value)
        .ok()
        .filter(|entries| !entries.is_empty())
}

// ─────────────────────────────────────────────────────────────────────────────
// Boundary messages
// ─────────────────────────────────────────────────────────────────────────────

/// Payload of a successful `getResponse`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostPayload {
    /// Assistant answer.
    pub content: String,
    /// Server-authoritative history, when the backend returned one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<TranscriptEntry>>,
}

/// Host → surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum HostMessage {
    GetResponse {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<RequestId>,
        payload: HostPayload,
    },
    ErrorMessage {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<RequestId>,
        text: String,
    },
}

impl HostMessage {
    /// Request id this message answers, if any.
    #[must_use]
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            Self::GetResponse { id, .. } | Self::ErrorMessage { id, .. } => *id,
        }
    }
}

/// Surface → host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum SurfaceMessage {
    /// `value` is a JSON-encoded [`ChatRequestEnvelope`] (or legacy body).
    SendMessage {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<RequestId>,
        value: String,
    },
    Alert {
        text: String,
    },
}

/// Serialize a boundary message for the channel.
pub fn encode<T: Serialize>(message: &T) -> Result<String> {
    Ok(serde_json::to_string(message)?)
}

/// Deserialize a boundary message received from the channel.
pub fn decode<T: DeserializeOwned>(raw: &str) -> Result<T> {
    Ok(serde_json::from_str(raw)?)
}
