pub mod audit;
pub mod client;
pub mod error;
pub mod executor;
pub mod model;
pub mod plan;
pub mod probe;
pub mod reconciler;
pub mod report;
pub mod retry;

pub use audit::{ReconcileAuditLogger, create_audit_logger};
pub use client::{ControlPlane, FileControlPlane, HttpControlPlane, MemoryControlPlane};
pub use error::{ControlPlaneError, ErrorClass, PlanError};
pub use executor::{ExecutorOptions, PlanExecutor};
pub use model::{
    Config, FieldDrift, ResourceDeclaration, ResourceError, ResourceId, ResourceKind,
    ResourceState, ResourceStatus,
};
pub use plan::{Plan, PlanFile, PlanFormat};
pub use probe::Probe;
pub use reconciler::Reconciler;
pub use report::{EXIT_INVALID_PLAN, ReconciliationReport, ReportEntry, ReportSummary, RunOutcome};
pub use retry::RetryPolicy;
