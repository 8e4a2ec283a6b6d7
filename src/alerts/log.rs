//! Record of every dispatch attempt, for operator visibility

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use super::NotificationAttempt;

/// Entries kept by [`MemoryAlertLog`]
pub const ALERT_LOG_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Failed,
    Suppressed,
}

/// What the dispatcher hands to the log
#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub timestamp: DateTime<Utc>,
    pub to: Option<String>,
    pub subject: String,
    pub status: DeliveryStatus,
    pub attempt: NotificationAttempt,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertLogEntry {
    pub id: Uuid,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,

    pub to: Option<String>,
    pub subject: String,
    pub status: DeliveryStatus,

    #[serde(rename = "alert")]
    pub attempt: NotificationAttempt,
}

/// Storage collaborator for alert outcomes
pub trait AlertLog: Send + Sync {
    fn append(&self, entry: NewLogEntry) -> AlertLogEntry;

    /// Every retained entry, most recent first
    fn list(&self) -> Vec<AlertLogEntry>;

    fn clear(&self);
}

/// Bounded in-memory log; the oldest entries fall off first
pub struct MemoryAlertLog {
    entries: Mutex<VecDeque<AlertLogEntry>>,
    capacity: usize,
}

impl MemoryAlertLog {
    pub fn new() -> Self {
        Self::with_capacity(ALERT_LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }
}

impl Default for MemoryAlertLog {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertLog for MemoryAlertLog {
    fn append(&self, entry: NewLogEntry) -> AlertLogEntry {
        let entry = AlertLogEntry {
            id: Uuid::new_v4(),
            timestamp: entry.timestamp,
            to: entry.to,
            subject: entry.subject,
            status: entry.status,
            attempt: entry.attempt,
        };

        let mut entries = self.entries.lock();
        entries.push_back(entry.clone());
        while entries.len() > self.capacity {
            entries.pop_front();
        }

        debug!(
            id = %entry.id,
            status = ?entry.status,
            "recorded alert log entry"
        );
        entry
    }

    fn list(&self) -> Vec<AlertLogEntry> {
        self.entries.lock().iter().rev().cloned().collect()
    }

    fn clear(&self) {
        self.entries.lock().clear();
    }
}
