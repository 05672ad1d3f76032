//! Audit trail for reconstruction attempts
//!
//! Every finished attempt emits one JSON line per rejected shard plus one for
//! the outcome, on the `audit` tracing target. The full report follows at
//! debug level on the same target.

use crate::error::Stage;
use crate::reconstruct::{IntegrityLevel, ReconstructionReport};
use crate::verifier::ShardStatus;
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

/// Audit event types
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEvent {
    /// Shard that could not be used for decoding
    ShardRejected {
        attempt_id: Uuid,
        index: usize,
        status: ShardStatus,
        reason: Option<String>,
    },

    /// Attempt finished with recovered bytes
    ReconstructionSucceeded {
        attempt_id: Uuid,
        reconstructed_size: Option<usize>,
        shards_used: Vec<usize>,
        fast_path: bool,
        integrity: Option<IntegrityLevel>,
        warnings: Vec<String>,
    },

    /// Attempt ended at a failing stage
    ReconstructionFailed {
        attempt_id: Uuid,
        stage: Stage,
        reason: String,
    },
}

/// Structured audit log entry
#[derive(Debug, Serialize)]
struct AuditLogEntry {
    timestamp: String,
    event_type: String,
    event: AuditEvent,
}

/// Emit a structured audit log entry via tracing
pub fn audit_log(event: AuditEvent) {
    let event_type = match &event {
        AuditEvent::ShardRejected { .. } => "shard_rejected",
        AuditEvent::ReconstructionSucceeded { .. } => "reconstruction_succeeded",
        AuditEvent::ReconstructionFailed { .. } => "reconstruction_failed",
    };

    let entry = AuditLogEntry {
        timestamp: Utc::now().to_rfc3339(),
        event_type: event_type.to_string(),
        event,
    };

    if let Ok(json) = serde_json::to_string(&entry) {
        info!(target: "audit", "{}", json);
    }
}

/// Events describing a finished report
pub fn report_events(report: &ReconstructionReport) -> Vec<AuditEvent> {
    let mut events: Vec<AuditEvent> = report
        .shard_details
        .iter()
        .filter(|s| matches!(s.status, ShardStatus::HashMismatch | ShardStatus::FetchError))
        .map(|s| AuditEvent::ShardRejected {
            attempt_id: report.attempt_id,
            index: s.index,
            status: s.status,
            reason: s.error.clone(),
        })
        .collect();

    events.push(match &report.failure {
        None => AuditEvent::ReconstructionSucceeded {
            attempt_id: report.attempt_id,
            reconstructed_size: report.reconstructed_size,
            shards_used: report.shards_used.clone(),
            fast_path: report.fast_path,
            integrity: report.integrity,
            warnings: report.warnings.clone(),
        },
        Some(failure) => AuditEvent::ReconstructionFailed {
            attempt_id: report.attempt_id,
            stage: failure.stage,
            reason: failure.reason.clone(),
        },
    });
    events
}

/// Emit the audit trail of a finished report, then the full report
pub fn audit_report(report: &ReconstructionReport) {
    for event in report_events(report) {
        audit_log(event);
    }
    if let Ok(json) = serde_json::to_string(report) {
        debug!(target: "audit", "{}", json);
    }
}
