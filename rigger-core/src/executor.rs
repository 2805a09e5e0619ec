//! Plan executor: validate, order, then probe and reconcile one declaration
//! at a time.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::audit::ReconcileAuditLogger;
use crate::client::ControlPlane;
use crate::error::ErrorClass;
use crate::model::{ResourceDeclaration, ResourceError, ResourceId, ResourceState, ResourceStatus};
use crate::plan::{Plan, PlannedResource};
use crate::probe::Probe;
use crate::reconciler::Reconciler;
use crate::report::{ReconciliationReport, ReportBuilder, ReportEntry};
use crate::retry::RetryPolicy;

/// Knobs for one executor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutorOptions {
    pub retry: RetryPolicy,
    /// Probe only; never create.
    pub dry_run: bool,
}

pub struct PlanExecutor {
    probe: Probe,
    reconciler: Reconciler,
    audit: Arc<ReconcileAuditLogger>,
    dry_run: bool,
}

impl PlanExecutor {
    pub fn new(client: Arc<dyn ControlPlane>, options: ExecutorOptions) -> Self {
        Self::with_audit(client, options, Arc::new(ReconcileAuditLogger::new("executor")))
    }

    pub fn with_audit(
        client: Arc<dyn ControlPlane>,
        options: ExecutorOptions,
        audit: Arc<ReconcileAuditLogger>,
    ) -> Self {
        Self {
            probe: Probe::new(client.clone(), options.retry),
            reconciler: Reconciler::new(client, audit.clone()).dry_run(options.dry_run),
            audit,
            dry_run: options.dry_run,
        }
    }

    /// Run to completion. Never fails: every outcome is in the report.
    pub async fn run(&self, declarations: &[ResourceDeclaration]) -> ReconciliationReport {
        // The sender is kept alive so the channel never reports closed.
        let (_keep, cancel) = watch::channel(false);
        self.run_with_cancel(declarations, cancel).await
    }

    /// Like [`run`](Self::run), but stops before the next declaration once
    /// `cancel` turns true. In-flight calls are never interrupted.
    pub async fn run_with_cancel(
        &self,
        declarations: &[ResourceDeclaration],
        cancel: watch::Receiver<bool>,
    ) -> ReconciliationReport {
        let builder = ReportBuilder::start(self.dry_run);
        let run_id = builder.run_id();

        let plan = match Plan::build(declarations) {
            Ok(plan) => plan,
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "Plan rejected");
                self.audit.plan_rejected(run_id, &e.to_string());
                let report = builder.rejected(declarations, &e);
                self.audit.run_finished(run_id, report.outcome(), report.summary());
                return report;
            }
        };

        info!(
            run_id = %run_id,
            resources = plan.len(),
            dry_run = self.dry_run,
            "Starting reconciliation"
        );
        self.audit.run_started(run_id, plan.len(), self.dry_run);

        let mut states: HashMap<ResourceId, ResourceState> = HashMap::new();
        let mut cancelled = false;

        for (position, resource) in plan.resources().iter().enumerate() {
            if *cancel.borrow() {
                let remaining = plan.len() - position;
                warn!(run_id = %run_id, remaining, "Reconciliation cancelled");
                self.audit.run_cancelled(run_id, remaining);
                cancelled = true;
                break;
            }

            let state = self.visit(resource, &states).await;
            info!(resource = %resource.id, status = %state.status, "Resource reconciled");
            states.insert(resource.id.clone(), state);
        }

        let entries = plan
            .resources()
            .iter()
            .map(|resource| ReportEntry {
                declaration: resource.declaration.clone(),
                state: states
                    .remove(&resource.id)
                    .unwrap_or_else(ResourceState::pending),
            })
            .collect();

        let report = builder.finish(entries, cancelled);
        info!(
            run_id = %run_id,
            outcome = %report.outcome(),
            created = report.summary().created,
            "Reconciliation finished"
        );
        self.audit.run_finished(run_id, report.outcome(), report.summary());
        report
    }

    async fn visit(
        &self,
        resource: &PlannedResource,
        states: &HashMap<ResourceId, ResourceState>,
    ) -> ResourceState {
        if let Some(blocker) = self.blocking_dependency(resource, states) {
            self.audit.resource_blocked(&resource.id, blocker);
            return ResourceState::failed(ResourceError::new(
                ErrorClass::Dependency,
                format!("dependency {} is not available", blocker),
            ));
        }

        let probed = self.probe.probe(&resource.declaration).await;
        self.reconciler.reconcile(&resource.declaration, probed).await
    }

    /// First dependency that did not reach a usable state.
    fn blocking_dependency<'a>(
        &self,
        resource: &'a PlannedResource,
        states: &HashMap<ResourceId, ResourceState>,
    ) -> Option<&'a ResourceId> {
        resource.dependencies.iter().find(|dependency| {
            match states.get(*dependency).map(|s| s.status) {
                Some(ResourceStatus::Present) => false,
                Some(ResourceStatus::Absent) => !self.dry_run,
                _ => true,
            }
        })
    }
}
