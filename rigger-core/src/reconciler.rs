//! Reconciler - turns a probe result into at most one create call.
//!
//! Only absent resources are acted on. Divergent resources are reported and
//! left alone; nothing is ever updated or deleted.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::audit::ReconcileAuditLogger;
use crate::client::ControlPlane;
use crate::model::{ResourceDeclaration, ResourceError, ResourceState, ResourceStatus};

pub struct Reconciler {
    client: Arc<dyn ControlPlane>,
    audit: Arc<ReconcileAuditLogger>,
    dry_run: bool,
}

impl Reconciler {
    pub fn new(client: Arc<dyn ControlPlane>, audit: Arc<ReconcileAuditLogger>) -> Self {
        Self {
            client,
            audit,
            dry_run: false,
        }
    }

    /// In dry-run mode absent resources are reported but not created.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub async fn reconcile(
        &self,
        declaration: &ResourceDeclaration,
        probed: ResourceState,
    ) -> ResourceState {
        let id = declaration.id();
        match probed.status {
            ResourceStatus::Absent if self.dry_run => {
                info!(resource = %id, "Would create");
                probed
            }
            ResourceStatus::Absent => {
                let attempts = probed.attempts;
                info!(resource = %id, status = %ResourceStatus::Creating, "Creating");

                match self.client.create(&id, &declaration.config).await {
                    Ok(observed) => {
                        self.audit.resource_created(&id);
                        let mut state = ResourceState::present(observed, attempts);
                        state.created = true;
                        state
                    }
                    Err(e) => {
                        error!(resource = %id, error = %e, "Create failed");
                        self.audit.resource_failed(&id, &e.to_string());
                        ResourceState::failed(ResourceError::from(&e)).with_attempts(attempts)
                    }
                }
            }
            ResourceStatus::Divergent => {
                warn!(resource = %id, "Observed configuration differs, leaving it untouched");
                self.audit.resource_divergent(&id, &probed.drift);
                probed
            }
            ResourceStatus::Failed => {
                if let Some(e) = &probed.last_error {
                    self.audit.resource_failed(&id, &e.to_string());
                }
                probed
            }
            ResourceStatus::Present | ResourceStatus::Pending | ResourceStatus::Creating => probed,
        }
    }
}
