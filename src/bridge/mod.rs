//! Host bridge.
//!
//! The privileged side of the panel: it owns the panel lifecycle, relays
//! `sendMessage` requests to the chat backend and turns the outcome into
//! host messages for the surface.
//!
//! # Architecture
//!
//! - [`HostBridge`]: stateless relay from one [`SurfaceMessage`] to at most
//!   one [`HostMessage`]
//! - [`backend`]: the [`ChatBackend`] seam and its HTTP implementation
//! - [`notify`]: host-level notifications
//! - [`panel`]: the owned panel handle and its relay tasks

pub mod backend;
pub mod notify;
pub mod panel;

pub use backend::{ChatBackend, ChatReply, HttpChatBackend, RequestFormat};
pub use notify::{Notification, NotificationLog, Notifier};
pub use panel::{Panel, PanelManager, PanelSnapshot, PanelState};

use std::sync::Arc;

use tracing::{info, warn};

use crate::protocol::{HostMessage, OutboundValue, RequestId, SurfaceMessage};

/// Relays surface requests to the chat backend.
#[derive(Debug, Clone)]
pub struct HostBridge {
    backend: Arc<dyn ChatBackend>,
    notifier: Arc<dyn Notifier>,
}

impl HostBridge {
    #[must_use]
    pub fn new(backend: Arc<dyn ChatBackend>, notifier: Arc<dyn Notifier>) -> Self {
        Self { backend, notifier }
    }

    /// Handle one boundary message from the surface.
    ///
    /// Alerts are shown as host notifications and produce no reply.
    pub async fn handle(&self, message: SurfaceMessage) -> Option<HostMessage> {
        match message {
            SurfaceMessage::SendMessage { id, value } => Some(self.relay(id, &value).await),
            SurfaceMessage::Alert { text } => {
                self.notifier.error(&text);
                None
            }
        }
    }

    async fn relay(&self, id: Option<RequestId>, value: &str) -> HostMessage {
        let envelope = match OutboundValue::parse(value) {
            Ok(parsed) => parsed.into_envelope(),
            Err(e) => {
                warn!(request_id = ?id, error = %e, "Malformed sendMessage value");
                let text = format!("Invalid chat request: {e}");
                self.notifier.error(&text);
                return HostMessage::ErrorMessage { id, text };
            }
        };

        info!(
            name: "bridge.request",
            request_id = ?id,
            request_length = envelope.request.len(),
            history_length = envelope.history.len(),
            "Relaying chat request"
        );

        match self.backend.chat(envelope).await {
            Ok(ChatReply::Answer(payload)) => {
                info!(
                    name: "bridge.response",
                    request_id = ?id,
                    content_length = payload.content.len(),
                    has_history = payload.history.is_some(),
                    "Chat backend answered"
                );
                HostMessage::GetResponse { id, payload }
            }
            Ok(ChatReply::Rejected(text)) => {
                warn!(request_id = ?id, error = %text, "Chat backend returned an error");
                HostMessage::ErrorMessage { id, text }
            }
            Err(e) => {
                let text = format!("Error on connecting server: {e}");
                self.notifier.error(&text);
                HostMessage::ErrorMessage { id, text }
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{Script, bridge};
    use super::*;

    fn send(id: u64, value: &str) -> SurfaceMessage {
        SurfaceMessage::SendMessage {
            id: Some(RequestId(id)),
            value: value.to_string(),
        }
    }

    #[tokio::test]
    async fn test_answer_is_relayed_with_request_id() {
        let (bridge, backend, log) = bridge(Script::Echo);

        let reply = bridge
            .handle(send(4, r#"{"request":"hello","history":[]}"#))
            .await
            .unwrap();

        match reply {
            HostMessage::GetResponse { id, payload } => {
                assert_eq!(id, Some(RequestId(4)));
                assert_eq!(payload.content, "echo: hello");
            }
            HostMessage::ErrorMessage { .. } => panic!("expected getResponse"),
        }
        assert_eq!(backend.received.lock().unwrap().len(), 1);
        assert!(log.recent().is_empty());
    }

    #[tokio::test]
    async fn test_backend_error_field_is_relayed_not_notified() {
        let (bridge, _backend, log) = bridge(Script::Reject("model offline".to_string()));

        let reply = bridge.handle(send(1, r#"{"request":"hi"}"#)).await.unwrap();

        assert_eq!(
            reply,
            HostMessage::ErrorMessage {
                id: Some(RequestId(1)),
                text: "model offline".to_string()
            }
        );
        assert!(log.recent().is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_notifies_and_relays() {
        let (bridge, _backend, log) = bridge(Script::Fail);

        let reply = bridge.handle(send(2, r#"{"request":"hi"}"#)).await.unwrap();

        assert!(matches!(
            reply,
            HostMessage::ErrorMessage { id: Some(RequestId(2)), ref text } if text.starts_with("Error on connecting server")
        ));
        assert_eq!(log.recent().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_value_never_reaches_backend() {
        let (bridge, backend, log) = bridge(Script::Echo);

        let reply = bridge.handle(send(3, "{not json")).await.unwrap();

        assert!(matches!(reply, HostMessage::ErrorMessage { .. }));
        assert!(backend.received.lock().unwrap().is_empty());
        assert_eq!(log.recent().len(), 1);
    }

    #[tokio::test]
    async fn test_legacy_value_is_accepted() {
        let (bridge, backend, _log) = bridge(Script::Echo);

        bridge.handle(send(1, r#"{"message":"ping"}"#)).await.unwrap();

        assert_eq!(backend.received.lock().unwrap()[0].request, "ping");
    }

    #[tokio::test]
    async fn test_alert_becomes_notification() {
        let (bridge, backend, log) = bridge(Script::Echo);

        let reply = bridge
            .handle(SurfaceMessage::Alert {
                text: "something odd".to_string(),
            })
            .await;

        assert!(reply.is_none());
        assert_eq!(log.recent()[0].message, "something odd");
        assert!(backend.received.lock().unwrap().is_empty());
    }
}
