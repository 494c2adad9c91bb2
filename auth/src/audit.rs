//! Verification event logging.
//!
//! The verifier reports every outcome to an optional, caller supplied
//! [`VerificationLogger`]. Whether one is attached never changes the result.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{FailureKind, VerifyError};

const DEFAULT_MAX_ENTRIES: usize = 10000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VerificationOutcome {
    Success { principal_id: Option<String> },
    Failure { kind: FailureKind, detail: String },
}

impl VerificationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, VerificationOutcome::Success { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationEvent {
    pub timestamp: DateTime<Utc>,
    pub addon_key: Option<String>,
    pub client_key: Option<String>,
    pub outcome: VerificationOutcome,
}

impl VerificationEvent {
    pub fn success(addon_key: &str, client_key: &str, principal_id: Option<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            addon_key: Some(addon_key.to_string()),
            client_key: Some(client_key.to_string()),
            outcome: VerificationOutcome::Success { principal_id },
        }
    }

    pub fn failure(addon_key: Option<&str>, err: &VerifyError) -> Self {
        Self {
            timestamp: Utc::now(),
            addon_key: addon_key.map(str::to_string),
            client_key: err.client_key().map(str::to_string),
            outcome: VerificationOutcome::Failure {
                kind: err.kind(),
                detail: err.to_string(),
            },
        }
    }
}

/// Sink for verification events.
pub trait VerificationLogger: Send + Sync {
    fn log(&self, event: &VerificationEvent);
}

/// Forwards events to `tracing`: failures at `warn`, successes at `debug`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl VerificationLogger for TracingLogger {
    fn log(&self, event: &VerificationEvent) {
        let addon_key = event.addon_key.as_deref().unwrap_or("-");
        let client_key = event.client_key.as_deref().unwrap_or("-");
        match &event.outcome {
            VerificationOutcome::Success { principal_id } => debug!(
                addon_key,
                client_key,
                principal_id = principal_id.as_deref().unwrap_or("-"),
                "Connect token verified"
            ),
            VerificationOutcome::Failure { kind, detail } => warn!(
                addon_key,
                client_key,
                kind = kind.as_str(),
                detail = %detail,
                "Connect token rejected"
            ),
        }
    }
}

/// Bounded in-memory log of recent verification events.
#[derive(Debug)]
pub struct AuditLog {
    entries: RwLock<VecDeque<VerificationEvent>>,
    max_entries: usize,
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_ENTRIES)
    }

    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::with_capacity(max_entries.min(1024))),
            max_entries: max_entries.max(1),
        }
    }

    pub fn record(&self, event: VerificationEvent) {
        let mut entries = self.entries.write();
        if entries.len() >= self.max_entries {
            entries.pop_front();
        }
        entries.push_back(event);
    }

    /// Most recent first.
    pub fn recent(&self, limit: usize) -> Vec<VerificationEvent> {
        self.entries
            .read()
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn failures_for_tenant(&self, client_key: &str) -> Vec<VerificationEvent> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.client_key.as_deref() == Some(client_key) && !e.outcome.is_success())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl VerificationLogger for AuditLog {
    fn log(&self, event: &VerificationEvent) {
        self.record(event.clone());
    }
}
