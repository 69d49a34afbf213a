//! Submission lifecycle for cohort data validation.
//!
//! [`SubmissionService`] accepts versioned file uploads, runs the load and
//! validation pipeline in the background and tracks acknowledgment until a
//! submission is complete. Configuration and definitions are loaded with
//! [`EngineConfig::load`] and [`load_definitions`].

pub mod audit;
pub mod config;
pub mod definitions;
pub mod error;
pub mod service;
pub mod state;

pub use audit::{AuditEvent, AuditEventKind, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use config::{EngineConfig, SubmissionOptions};
pub use definitions::load_definitions;
pub use error::{ConfigError, PreconditionError, Result, SubmitError};
pub use service::{SYSTEM_ACTOR, SubmissionService, TaskEvent, UploadReceipt, content_hash};
pub use state::{
    Acknowledgment, Completion, ExtractedIds, LoadSuccess, StatusChange, SubmissionState,
    UploadPlan, UploadRequest,
};
