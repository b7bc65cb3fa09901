//! Host-level notifications.
//!
//! Transport failures and surface alerts are reported to the user through
//! the host, not the transcript. [`NotificationLog`] is the default sink:
//! it logs every notification and keeps the most recent ones for
//! `GET /api/notifications`.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Receiver of host-level error notifications.
pub trait Notifier: Send + Sync + std::fmt::Debug {
    /// Show an error to the user outside the transcript.
    fn error(&self, message: &str);
}

/// A recorded notification.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Bounded, in-memory notification sink.
#[derive(Debug)]
pub struct NotificationLog {
    capacity: usize,
    entries: Mutex<VecDeque<Notification>>,
}

impl NotificationLog {
    /// Keep at most `capacity` notifications (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Recorded notifications, oldest first.
    #[must_use]
    pub fn recent(&self) -> Vec<Notification> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

impl Notifier for NotificationLog {
    fn error(&self, message: &str) {
        tracing::error!(name: "host.notification", message = %message, "Host error notification");

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(Notification {
            message: message.to_string(),
            at: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_is_bounded() {
        let log = NotificationLog::new(2);
        log.error("one");
        log.error("two");
        log.error("three");

        let messages: Vec<String> = log.recent().into_iter().map(|n| n.message).collect();
        assert_eq!(messages, ["two", "three"]);
    }

    #[test]
    fn test_zero_capacity_still_keeps_latest() {
        let log = NotificationLog::new(0);
        log.error("only");
        assert_eq!(log.recent().len(), 1);
    }
}
