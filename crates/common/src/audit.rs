use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// Ten years; keeps the retention window inside chrono's representable range.
const MAX_RETENTION_SECS: u64 = 10 * 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Allowed,
    Denied,
    Failed,
}

/// A single security-relevant decision taken by the gateway or auth layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub service: Option<String>,
    pub user_id: Option<String>,
    pub action: String,
    pub outcome: AuditOutcome,
    pub detail: String,
}

impl AuditEvent {
    pub fn new(action: impl Into<String>, outcome: AuditOutcome) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            service: None,
            user_id: None,
            action: action.into(),
            outcome,
            detail: String::new(),
        }
    }

    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }
}

/// Append-only destination for audit events.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// In-memory audit log with time-bounded retention and a hard capacity.
///
/// Every event is also emitted on the `audit` tracing target so that log
/// shipping keeps a durable copy.
pub struct AuditLog {
    entries: Mutex<VecDeque<AuditEvent>>,
    retention: Duration,
    capacity: usize,
}

impl AuditLog {
    pub fn new(retention_secs: u64, capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            retention: Duration::seconds(retention_secs.min(MAX_RETENTION_SECS) as i64),
            capacity: capacity.max(1),
        }
    }

    /// Snapshot of retained events, oldest first.
    pub fn entries(&self) -> Vec<AuditEvent> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        self.prune(&mut entries, Utc::now());
        entries.iter().cloned().collect()
    }

    /// Number of retained events.
    pub fn len(&self) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        self.prune(&mut entries, Utc::now());
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn prune(&self, entries: &mut VecDeque<AuditEvent>, now: DateTime<Utc>) {
        let cutoff = now - self.retention;
        while entries.front().is_some_and(|e| e.timestamp < cutoff) {
            entries.pop_front();
        }
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }
}

impl AuditSink for AuditLog {
    fn record(&self, event: AuditEvent) {
        tracing::info!(
            target: "audit",
            id = %event.id,
            service = event.service.as_deref().unwrap_or("-"),
            user_id = event.user_id.as_deref().unwrap_or("-"),
            action = %event.action,
            outcome = ?event.outcome,
            detail = %event.detail,
            "audit event"
        );

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let now = event.timestamp;
        entries.push_back(event);
        self.prune(&mut entries, now);
    }
}
