//! Air Chat
//!
//! A chat panel host: it serves a sandboxed transcript view, relays the
//! user's messages to a locally running chat backend over HTTP and pushes
//! the answers back into the view.
//!
//! # Architecture
//!
//! - **Presentation surface**: transcript, single-flight guard and request
//!   ids, rendered server-side to HTML fragments
//! - **Host bridge**: owns the panel lifecycle and relays boundary messages
//!   to the chat backend
//! - **Server**: Axum app serving the panel page, submissions and an SSE
//!   stream of rendered frames
//!
//! # Modules
//!
//! - [`bridge`]: host bridge, backend client, notifications, panel lifecycle
//! - [`protocol`]: boundary messages and backend envelopes
//! - [`surface`]: presentation surface state machine and rendering
//! - [`transcript`]: conversation entries

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::unused_async)]
#![allow(clippy::needless_pass_by_value)]

pub mod bridge;
pub mod config;
pub mod error;
pub mod page;
pub mod protocol;
pub mod server;
pub mod surface;
pub mod transcript;

use std::sync::Arc;
use std::time::Duration;

use crate::bridge::{ChatBackend, HostBridge, HttpChatBackend, NotificationLog, Notifier, PanelManager};
use crate::config::AppConfig;
use crate::error::Result;

/// Application state shared across all handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Owner of the single chat panel.
    pub panels: Arc<PanelManager>,
    /// Host-level notifications.
    pub notifications: Arc<NotificationLog>,
    /// Global Configuration
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Build state with the HTTP backend described by `config`.
    pub fn new(config: Arc<AppConfig>) -> Result<Self> {
        let backend = HttpChatBackend::new(&config.backend.url, &config.backend.path)?
            .with_format(config.backend.format)
            .with_timeout(config.backend.timeout_secs.map(Duration::from_secs));
        Ok(Self::with_backend(config, Arc::new(backend)))
    }

    /// Build state around any [`ChatBackend`].
    pub fn with_backend(config: Arc<AppConfig>, backend: Arc<dyn ChatBackend>) -> Self {
        let notifications = Arc::new(NotificationLog::new(config.panel.notification_capacity));
        let bridge = HostBridge::new(backend, Arc::clone(&notifications) as Arc<dyn Notifier>);
        let panels = Arc::new(PanelManager::new(bridge, config.panel.title.clone()));
        Self {
            panels,
            notifications,
            config,
        }
    }
}
