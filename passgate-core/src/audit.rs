//! Audit event sink interface.
//!
//! Ceremony and step-up outcomes are reported to an [`AuditSink`]
//! collaborator. The production sink emits structured `tracing` records
//! under the `audit` target; tests capture events in memory.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Mutex;
use uuid::Uuid;

/// Kind of audited event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuditKind {
    RegistrationStarted,
    RegistrationSucceeded,
    RegistrationFailed,
    AuthenticationStarted,
    AuthenticationSucceeded,
    AuthenticationFailed,
    StepUpCreated,
    StepUpResolved,
    StepUpFailed,
}

/// A single audit record.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub kind: AuditKind,
    pub user_id: Uuid,
    pub at: DateTime<Utc>,
    /// Free-form detail (failure reason, credential digest, operation id).
    pub detail: serde_json::Value,
}

impl AuditEvent {
    /// Record stamped with the wall clock. Audit timestamps never feed back
    /// into verification, so they stay on real time even under a test clock.
    pub fn now(kind: AuditKind, user_id: Uuid, detail: serde_json::Value) -> Self {
        Self {
            kind,
            user_id,
            at: Utc::now(),
            detail,
        }
    }
}

/// Receives ceremony and step-up outcomes.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent);
}

/// Production sink: structured log records under the `audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: AuditEvent) {
        tracing::info!(
            target: "audit",
            kind = ?event.kind,
            user_id = %event.user_id,
            at = %event.at,
            detail = %event.detail,
            "audit event"
        );
    }
}

/// In-memory sink for tests.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().expect("audit lock poisoned").clone()
    }

    pub fn kinds(&self) -> Vec<AuditKind> {
        self.events().iter().map(|e| e.kind).collect()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, event: AuditEvent) {
        self.events.lock().expect("audit lock poisoned").push(event);
    }
}
