//! Security audit events
//!
//! Every security-relevant decision in the lifecycle (state issued, callback
//! attempted, credential revoked) emits one structured event through the
//! [`AuditRecorder`] sink. Events carry classification codes and identifiers,
//! never token material.

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use std::sync::Mutex;
use uuid::Uuid;

/// A single audit record.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub event: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integration_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_age_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(event: impl Into<String>, success: bool) -> Self {
        Self {
            event: event.into(),
            success,
            tenant_id: None,
            integration_id: None,
            user_id: None,
            error_code: None,
            state_age_ms: None,
            provider: None,
            timestamp: Utc::now(),
        }
    }
}

/// Sink for audit events.
///
/// Recording is infallible by contract: a sink that cannot deliver must drop
/// the event after logging locally rather than fail the guarded operation.
pub trait AuditRecorder: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Production recorder: structured log line under the `audit` target plus a
/// labeled counter.
#[derive(Debug, Default)]
pub struct TracingAuditRecorder;

impl AuditRecorder for TracingAuditRecorder {
    fn record(&self, event: AuditEvent) {
        let metric_labels = vec![
            ("event", event.event.clone()),
            ("success", event.success.to_string()),
        ];
        counter!("security_audit_events_total", &metric_labels).increment(1);

        tracing::info!(
            target: "audit",
            event = %event.event,
            success = event.success,
            tenant_id = ?event.tenant_id,
            integration_id = ?event.integration_id,
            user_id = ?event.user_id,
            error_code = ?event.error_code,
            state_age_ms = ?event.state_age_ms,
            provider = ?event.provider,
            timestamp = %event.timestamp.to_rfc3339(),
            "security audit event"
        );
    }
}

/// Recorder that keeps events in memory for assertions.
#[derive(Debug, Default)]
pub struct MemoryAuditRecorder {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn last(&self) -> Option<AuditEvent> {
        self.events().last().cloned()
    }
}

impl AuditRecorder for MemoryAuditRecorder {
    fn record(&self, event: AuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
