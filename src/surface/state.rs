//! Presentation surface state machine.

use serde::Serialize;
use tracing::debug;

use crate::error::Result;
use crate::protocol::{ChatRequestEnvelope, HostMessage, HostPayload, RequestId, SurfaceMessage};
use crate::transcript::{Transcript, TranscriptEntry};

use super::render::{RenderedSurface, render_transcript};

/// Whether a request is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SurfaceState {
    Idle,
    AwaitingResponse { request_id: RequestId },
}

/// The sandboxed chat view: transcript, busy guard and request ids.
///
/// The surface never talks to the backend. It produces [`SurfaceMessage`]s
/// for the host and consumes [`HostMessage`]s from it.
#[derive(Debug, Clone)]
pub struct PresentationSurface {
    transcript: Transcript,
    state: SurfaceState,
    next_id: u64,
}

impl Default for PresentationSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl PresentationSurface {
    #[must_use]
    pub fn new() -> Self {
        Self::from_transcript(Transcript::new())
    }

    /// Restore a surface from a previously saved transcript.
    #[must_use]
    pub fn from_transcript(transcript: Transcript) -> Self {
        Self {
            transcript,
            state: SurfaceState::Idle,
            next_id: 1,
        }
    }

    #[must_use]
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    #[must_use]
    pub fn state(&self) -> SurfaceState {
        self.state
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(self.state, SurfaceState::AwaitingResponse { .. })
    }

    /// Submit user input.
    ///
    /// Returns `Ok(None)` without touching the transcript when the input is
    /// blank or a request is still outstanding. Otherwise appends the user
    /// entry, enters [`SurfaceState::AwaitingResponse`] and returns the
    /// `sendMessage` to post to the host.
    pub fn submit(&mut self, text: &str) -> Result<Option<SurfaceMessage>> {
        let text = text.trim();
        if text.is_empty() || self.is_busy() {
            return Ok(None);
        }

        let entry = TranscriptEntry::user(text);
        let mut history = self.transcript.outbound_history();
        history.push(entry.clone());
        let value = serde_json::to_string(&ChatRequestEnvelope {
            request: text.to_string(),
            history,
        })?;

        let request_id = RequestId(self.next_id);
        self.next_id += 1;
        self.transcript.push(entry);
        self.state = SurfaceState::AwaitingResponse { request_id };

        Ok(Some(SurfaceMessage::SendMessage {
            id: Some(request_id),
            value,
        }))
    }

    /// Apply a message from the host.
    ///
    /// Replies that do not answer the outstanding request are dropped and
    /// turned into an `alert` for the host.
    pub fn on_host_message(&mut self, message: HostMessage) -> Option<SurfaceMessage> {
        let reply_id = message.request_id();
        if !self.accepts(reply_id) {
            debug!(reply_id = ?reply_id, state = ?self.state, "Dropping stale host message");
            let id = reply_id.map_or_else(|| "none".to_string(), |id| id.to_string());
            return Some(self.alert(format!("Ignored reply for request {id}: no matching request in flight")));
        }

        match message {
            HostMessage::GetResponse { payload, .. } => self.apply_response(payload),
            HostMessage::ErrorMessage { text, .. } => {
                self.transcript.push(TranscriptEntry::error(&text));
            }
        }
        self.state = SurfaceState::Idle;
        None
    }

    /// Build an `alert` for the host.
    #[must_use]
    pub fn alert(&self, text: impl Into<String>) -> SurfaceMessage {
        SurfaceMessage::Alert { text: text.into() }
    }

    /// Render the transcript and busy flag.
    #[must_use]
    pub fn render(&self) -> RenderedSurface {
        RenderedSurface {
            html: render_transcript(&self.transcript),
            busy: self.is_busy(),
        }
    }

    fn accepts(&self, reply_id: Option<RequestId>) -> bool {
        match self.state {
            SurfaceState::Idle => false,
            SurfaceState::AwaitingResponse { request_id } => {
                reply_id.is_none_or(|id| id == request_id)
            }
        }
    }

    fn apply_response(&mut self, payload: HostPayload) {
        let answer = TranscriptEntry::assistant(payload.content);
        let replaced = match payload.history {
            Some(history) if !history.is_empty() => {
                self.transcript.replace(history);
                true
            }
            _ => false,
        };
        // An authoritative history may already end with this answer.
        if replaced && self.transcript.last() == Some(&answer) {
            return;
        }
        self.transcript.push(answer);
    }
}
