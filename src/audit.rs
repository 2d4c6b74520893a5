//! Audit-log emission contract
//!
//! Every state-changing administrative or system action on a transaction
//! emits exactly one audit event. The sink is append-only and external;
//! a failed write never unwinds the underlying state transition, but it is
//! surfaced to operational monitoring through an error-level log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use thiserror::Error;

/// Event categories emitted by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    TransactionCreated,
    TransactionConfirmed,
    PaymentRequested,
    PaymentConfirmed,
    PaymentFailed,
    TransactionReopened,
    StatusChanged,
    RefundProcessed,
    ReconciliationFlagged,
}

impl AuditEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditEventType::TransactionCreated => "transaction_created",
            AuditEventType::TransactionConfirmed => "transaction_confirmed",
            AuditEventType::PaymentRequested => "payment_requested",
            AuditEventType::PaymentConfirmed => "payment_confirmed",
            AuditEventType::PaymentFailed => "payment_failed",
            AuditEventType::TransactionReopened => "transaction_reopened",
            AuditEventType::StatusChanged => "status_changed",
            AuditEventType::RefundProcessed => "refund_processed",
            AuditEventType::ReconciliationFlagged => "reconciliation_flagged",
        }
    }
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How urgently operations should look at an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
    Info,
    Warning,
    Critical,
}

/// One append-only audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_type: AuditEventType,
    pub description: String,
    /// Who caused the change: an administrator email or `"system"`
    pub actor: String,
    pub severity: AuditSeverity,
    /// Structured context (transaction id, amounts, resulting status)
    pub metadata: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        event_type: AuditEventType,
        description: impl Into<String>,
        actor: impl Into<String>,
        severity: AuditSeverity,
        metadata: serde_json::Value,
    ) -> Self {
        AuditEvent {
            event_type,
            description: description.into(),
            actor: actor.into(),
            severity,
            metadata,
            recorded_at: Utc::now(),
        }
    }
}

/// Failure to append an audit event
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuditError {
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
}

/// Append-only audit sink
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent) -> Result<(), AuditError>;
}

/// Sink that forwards events to the `tracing` subscriber under the
/// `audit` target; the default in deployments where compliance tooling
/// tails structured logs
#[derive(Debug, Default, Clone)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        tracing::info!(
            target: "audit",
            event_type = %event.event_type,
            actor = %event.actor,
            severity = ?event.severity,
            metadata = %event.metadata,
            "{}",
            event.description
        );
        Ok(())
    }
}

/// In-process sink that keeps events in memory
///
/// Used by tests and by embedders that flush the log themselves.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded events, in insertion order
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().expect("audit log poisoned").clone()
    }

    /// Number of recorded events of the given type
    pub fn count(&self, event_type: AuditEventType) -> usize {
        self.events
            .lock()
            .expect("audit log poisoned")
            .iter()
            .filter(|event| event.event_type == event_type)
            .count()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        self.events.lock().expect("audit log poisoned").push(event);
        Ok(())
    }
}
