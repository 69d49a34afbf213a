//! Audit trail of submission events.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cohort_model::{FileId, SubmissionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventKind {
    UploadAccepted,
    ValidationCompleted,
    FileAcknowledged,
    StatusChanged,
}

impl AuditEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventKind::UploadAccepted => "upload_accepted",
            AuditEventKind::ValidationCompleted => "validation_completed",
            AuditEventKind::FileAcknowledged => "file_acknowledged",
            AuditEventKind::StatusChanged => "status_changed",
        }
    }
}

impl fmt::Display for AuditEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub kind: AuditEventKind,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
    pub submission_id: SubmissionId,
    pub file_id: Option<FileId>,
    /// Free-form detail, e.g. `draft -> in_progress`.
    pub detail: Option<String>,
}

impl AuditEvent {
    pub fn new(
        kind: AuditEventKind,
        actor: impl Into<String>,
        submission_id: SubmissionId,
        file_id: Option<FileId>,
    ) -> Self {
        Self {
            kind,
            actor: actor.into(),
            timestamp: Utc::now(),
            submission_id,
            file_id,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Destination for audit events.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Emits audit events as structured records on the `audit` tracing target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        tracing::info!(
            target: "audit",
            kind = %event.kind,
            actor = %event.actor,
            timestamp = %event.timestamp.to_rfc3339(),
            submission = %event.submission_id,
            file_id = event.file_id.map(FileId::get),
            detail = event.detail.as_deref(),
            "audit event"
        );
    }
}

/// Keeps events in memory, in arrival order.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn events_of(&self, kind: AuditEventKind) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.kind == kind)
            .collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
