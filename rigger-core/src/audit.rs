//! Audit trail for reconciliation runs.
//!
//! Every mutating call and every outcome an operator has to act on is emitted
//! as a structured tracing event on the `audit` target, so it can be routed
//! separately from operational logs (e.g. `RUST_LOG=audit=info`).

use std::sync::Arc;

use uuid::Uuid;

use crate::model::{FieldDrift, ResourceId};
use crate::report::{ReportSummary, RunOutcome};

/// Severity of an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditLevel {
    Audit,
    Info,
    Warn,
    Error,
}

/// Audit logger for one component of a run.
pub struct ReconcileAuditLogger {
    component: String,
    enabled: bool,
}

impl ReconcileAuditLogger {
    pub fn new(component: &str) -> Self {
        Self {
            component: component.to_string(),
            enabled: true,
        }
    }

    /// Logger that drops every event (for tests).
    pub fn new_noop() -> Self {
        Self {
            component: String::new(),
            enabled: false,
        }
    }

    pub fn log(&self, level: AuditLevel, message: impl Into<String>, object_ids: &[String]) {
        if !self.enabled {
            return;
        }
        let message = message.into();
        match level {
            AuditLevel::Error => {
                tracing::error!(
                    target: "audit",
                    component = %self.component,
                    objects = ?object_ids,
                    "{}",
                    message
                )
            }
            AuditLevel::Warn => {
                tracing::warn!(
                    target: "audit",
                    component = %self.component,
                    objects = ?object_ids,
                    "{}",
                    message
                )
            }
            AuditLevel::Audit | AuditLevel::Info => {
                tracing::info!(
                    target: "audit",
                    component = %self.component,
                    objects = ?object_ids,
                    "{}",
                    message
                )
            }
        }
    }

    pub fn run_started(&self, run_id: Uuid, resources: usize, dry_run: bool) {
        let mode = if dry_run { "dry run" } else { "run" };
        self.log(
            AuditLevel::Info,
            format!("Reconciliation {} started for {} resources", mode, resources),
            &[run_id.to_string()],
        );
    }

    pub fn plan_rejected(&self, run_id: Uuid, reason: &str) {
        self.log(
            AuditLevel::Error,
            format!("Plan rejected before any control plane call: {}", reason),
            &[run_id.to_string()],
        );
    }

    pub fn resource_created(&self, id: &ResourceId) {
        self.log(
            AuditLevel::Audit,
            format!("Resource created: {}", id),
            &[id.to_string()],
        );
    }

    pub fn resource_divergent(&self, id: &ResourceId, drift: &[FieldDrift]) {
        let fields: Vec<&str> = drift.iter().map(|d| d.field.as_str()).collect();
        self.log(
            AuditLevel::Warn,
            format!(
                "Resource {} differs from its declaration on [{}]; manual reconciliation required",
                id,
                fields.join(", ")
            ),
            &[id.to_string()],
        );
    }

    pub fn resource_failed(&self, id: &ResourceId, reason: &str) {
        self.log(
            AuditLevel::Error,
            format!("Resource {} failed: {}", id, reason),
            &[id.to_string()],
        );
    }

    pub fn resource_blocked(&self, id: &ResourceId, dependency: &ResourceId) {
        self.log(
            AuditLevel::Warn,
            format!("Resource {} skipped: dependency {} is unavailable", id, dependency),
            &[id.to_string(), dependency.to_string()],
        );
    }

    pub fn run_cancelled(&self, run_id: Uuid, remaining: usize) {
        self.log(
            AuditLevel::Warn,
            format!("Reconciliation cancelled with {} resources not started", remaining),
            &[run_id.to_string()],
        );
    }

    pub fn run_finished(&self, run_id: Uuid, outcome: RunOutcome, summary: &ReportSummary) {
        let level = match outcome {
            RunOutcome::Success => AuditLevel::Info,
            RunOutcome::Partial => AuditLevel::Warn,
            RunOutcome::Failed => AuditLevel::Error,
        };
        self.log(
            level,
            format!(
                concat!(
                    "Reconciliation finished: {} ",
                    "(present={}, created={}, divergent={}, failed={}, pending={})"
                ),
                outcome,
                summary.present,
                summary.created,
                summary.divergent,
                summary.failed,
                summary.pending
            ),
            &[run_id.to_string()],
        );
    }
}

/// Create a shared audit logger.
pub fn create_audit_logger(component: &str) -> Arc<ReconcileAuditLogger> {
    Arc::new(ReconcileAuditLogger::new(component))
}
