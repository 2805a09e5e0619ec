//! Reconciliation report: the result of one run.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PlanError;
use crate::model::{ResourceDeclaration, ResourceError, ResourceId, ResourceState, ResourceStatus};

/// Overall result of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunOutcome {
    Success,
    Partial,
    Failed,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Success => "SUCCESS",
            RunOutcome::Partial => "PARTIAL",
            RunOutcome::Failed => "FAILED",
        }
    }

    /// Process exit code for this outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Success => 0,
            RunOutcome::Partial => 1,
            RunOutcome::Failed => 2,
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exit code for a plan that could not be loaded or validated.
pub const EXIT_INVALID_PLAN: i32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub declaration: ResourceDeclaration,
    pub state: ResourceState,
}

impl ReportEntry {
    pub fn id(&self) -> ResourceId {
        self.declaration.id()
    }
}

/// Counts of entries per final status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total: usize,
    pub present: usize,
    pub absent: usize,
    pub divergent: usize,
    pub failed: usize,
    pub pending: usize,
    /// Present entries created by this run.
    pub created: usize,
}

impl ReportSummary {
    fn tally(entries: &[ReportEntry]) -> Self {
        let mut summary = ReportSummary {
            total: entries.len(),
            ..Default::default()
        };
        for entry in entries {
            match entry.state.status {
                ResourceStatus::Present => summary.present += 1,
                ResourceStatus::Absent => summary.absent += 1,
                ResourceStatus::Divergent => summary.divergent += 1,
                ResourceStatus::Failed => summary.failed += 1,
                ResourceStatus::Pending | ResourceStatus::Creating => summary.pending += 1,
            }
            if entry.state.created {
                summary.created += 1;
            }
        }
        summary
    }
}

/// Immutable record of one run, in execution order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    dry_run: bool,
    outcome: RunOutcome,
    cancelled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    plan_error: Option<String>,
    summary: ReportSummary,
    entries: Vec<ReportEntry>,
}

impl ReconciliationReport {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn outcome(&self) -> RunOutcome {
        self.outcome
    }

    pub fn cancelled(&self) -> bool {
        self.cancelled
    }

    /// Why the plan was rejected, if it was.
    pub fn plan_error(&self) -> Option<&str> {
        self.plan_error.as_deref()
    }

    pub fn summary(&self) -> &ReportSummary {
        &self.summary
    }

    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    pub fn entry(&self, id: &ResourceId) -> Option<&ReportEntry> {
        self.entries.iter().find(|e| e.declaration.kind == id.kind && e.declaration.name == id.name)
    }

    pub fn state(&self, id: &ResourceId) -> Option<&ResourceState> {
        self.entry(id).map(|e| &e.state)
    }

    pub fn exit_code(&self) -> i32 {
        if self.plan_error.is_some() {
            EXIT_INVALID_PLAN
        } else {
            self.outcome.exit_code()
        }
    }
}

/// Assembles a report over the course of a run.
pub(crate) struct ReportBuilder {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    dry_run: bool,
}

impl ReportBuilder {
    pub(crate) fn start(dry_run: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            dry_run,
        }
    }

    pub(crate) fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub(crate) fn finish(self, entries: Vec<ReportEntry>, cancelled: bool) -> ReconciliationReport {
        let outcome = if cancelled {
            RunOutcome::Partial
        } else {
            outcome_of(&entries, self.dry_run)
        };
        self.build(entries, outcome, cancelled, None)
    }

    /// Report for a plan that failed validation: every declaration FAILED.
    pub(crate) fn rejected(
        self,
        declarations: &[ResourceDeclaration],
        error: &PlanError,
    ) -> ReconciliationReport {
        let entries = declarations
            .iter()
            .map(|declaration| ReportEntry {
                declaration: declaration.clone(),
                state: ResourceState::failed(ResourceError::new(error.class(), error.to_string())),
            })
            .collect();
        self.build(entries, RunOutcome::Failed, false, Some(error.to_string()))
    }

    fn build(
        self,
        entries: Vec<ReportEntry>,
        outcome: RunOutcome,
        cancelled: bool,
        plan_error: Option<String>,
    ) -> ReconciliationReport {
        ReconciliationReport {
            run_id: self.run_id,
            started_at: self.started_at,
            finished_at: Utc::now(),
            dry_run: self.dry_run,
            outcome,
            cancelled,
            plan_error,
            summary: ReportSummary::tally(&entries),
            entries,
        }
    }
}

fn outcome_of(entries: &[ReportEntry], dry_run: bool) -> RunOutcome {
    let settled = |state: &ResourceState| {
        state.status == ResourceStatus::Present
            || (dry_run && state.status == ResourceStatus::Absent)
    };

    if entries.iter().all(|e| settled(&e.state)) {
        RunOutcome::Success
    } else if entries.iter().all(|e| e.state.status == ResourceStatus::Failed) {
        RunOutcome::Failed
    } else {
        RunOutcome::Partial
    }
}
