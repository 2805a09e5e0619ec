//! End-to-end executor tests against the in-memory control plane.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rigger_core::client::ControlPlaneCall;
use rigger_core::{
    Config, ControlPlane, ControlPlaneError, ErrorClass, ExecutorOptions, MemoryControlPlane,
    PlanExecutor, ReconcileAuditLogger, ResourceDeclaration, ResourceId, ResourceKind,
    ResourceStatus, RetryPolicy, RunOutcome,
};
use serde_json::json;
use tokio::sync::watch;

fn options() -> ExecutorOptions {
    ExecutorOptions {
        retry: RetryPolicy::new(3, Duration::ZERO),
        dry_run: false,
    }
}

fn executor(plane: &Arc<MemoryControlPlane>, options: ExecutorOptions) -> PlanExecutor {
    PlanExecutor::with_audit(
        plane.clone(),
        options,
        Arc::new(ReconcileAuditLogger::new_noop()),
    )
}

fn id(kind: ResourceKind, name: &str) -> ResourceId {
    ResourceId::new(kind, name)
}

/// Network -> SecurityGroup -> Service.
fn web_stack() -> Vec<ResourceDeclaration> {
    vec![
        ResourceDeclaration::new(ResourceKind::Service, "svc1")
            .depends_on("sg1")
            .with("image", "app:1.0")
            .with("cpu", 256),
        ResourceDeclaration::new(ResourceKind::SecurityGroup, "sg1")
            .depends_on("net1")
            .with("ingress", json!([{"port": 80, "cidr": "0.0.0.0/0"}])),
        ResourceDeclaration::new(ResourceKind::Network, "net1").with("cidr", "10.0.0.0/16"),
    ]
}

#[tokio::test]
async fn test_end_to_end_creates_in_dependency_order() {
    let plane = Arc::new(MemoryControlPlane::new());
    let report = executor(&plane, options()).run(&web_stack()).await;

    assert_eq!(report.outcome(), RunOutcome::Success);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(
        plane.create_calls().await,
        vec![
            id(ResourceKind::Network, "net1"),
            id(ResourceKind::SecurityGroup, "sg1"),
            id(ResourceKind::Service, "svc1"),
        ]
    );

    let names: Vec<&str> = report
        .entries()
        .iter()
        .map(|e| e.declaration.name.as_str())
        .collect();
    assert_eq!(names, vec!["net1", "sg1", "svc1"]);
    assert!(report.entries().iter().all(|e| e.state.created));
    assert_eq!(report.summary().created, 3);
}

#[tokio::test]
async fn test_each_declaration_is_visited_exactly_once() {
    let plane = Arc::new(MemoryControlPlane::new());
    let declarations = vec![
        ResourceDeclaration::new(ResourceKind::Registry, "app"),
        ResourceDeclaration::new(ResourceKind::Role, "deployer").depends_on("app"),
        ResourceDeclaration::new(ResourceKind::Cluster, "main").depends_on("deployer"),
        ResourceDeclaration::new(ResourceKind::Service, "web")
            .depends_on("main")
            .depends_on("registry/app"),
    ];

    let report = executor(&plane, options()).run(&declarations).await;
    assert_eq!(report.outcome(), RunOutcome::Success);

    let calls = plane.calls().await;
    for declaration in &declarations {
        let describes = calls
            .iter()
            .filter(|c| **c == ControlPlaneCall::Describe(declaration.id()))
            .count();
        assert_eq!(describes, 1, "{} probed more than once", declaration.id());
    }
    assert_eq!(report.entries().len(), declarations.len());
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let plane = Arc::new(MemoryControlPlane::new());
    let executor = executor(&plane, options());

    let first = executor.run(&web_stack()).await;
    assert_eq!(first.outcome(), RunOutcome::Success);

    plane.clear_calls().await;
    let second = executor.run(&web_stack()).await;

    assert_eq!(second.outcome(), RunOutcome::Success);
    assert!(plane.create_calls().await.is_empty());
    assert_eq!(second.summary().created, 0);
    assert_eq!(second.summary().present, 3);
    assert_ne!(first.run_id(), second.run_id());
}

#[tokio::test]
async fn test_cycle_is_rejected_without_network_calls() {
    let plane = Arc::new(MemoryControlPlane::new());
    let declarations = vec![
        ResourceDeclaration::new(ResourceKind::Network, "a").depends_on("b"),
        ResourceDeclaration::new(ResourceKind::Network, "b").depends_on("a"),
        ResourceDeclaration::new(ResourceKind::Role, "c"),
    ];

    let report = executor(&plane, options()).run(&declarations).await;

    assert_eq!(report.outcome(), RunOutcome::Failed);
    assert_eq!(report.exit_code(), 3);
    assert!(report.plan_error().unwrap().contains("cycle"));
    assert_eq!(report.entries().len(), 3);
    for entry in report.entries() {
        assert_eq!(entry.state.status, ResourceStatus::Failed);
        assert_eq!(
            entry.state.last_error.as_ref().map(|e| e.class),
            Some(ErrorClass::Config)
        );
    }
    assert!(plane.calls().await.is_empty());
}

#[tokio::test]
async fn test_unknown_dependency_is_rejected_without_network_calls() {
    let plane = Arc::new(MemoryControlPlane::new());
    let declarations =
        vec![ResourceDeclaration::new(ResourceKind::Service, "web").depends_on("missing")];

    let report = executor(&plane, options()).run(&declarations).await;

    assert_eq!(report.outcome(), RunOutcome::Failed);
    assert!(report.plan_error().is_some());
    assert!(plane.calls().await.is_empty());
}

#[tokio::test]
async fn test_failure_is_contained_to_dependents() {
    let plane = Arc::new(MemoryControlPlane::new());
    let x = id(ResourceKind::Cluster, "x");
    plane
        .fail_create(x.clone(), ControlPlaneError::Provider("quota exceeded".into()))
        .await;

    let declarations = vec![
        ResourceDeclaration::new(ResourceKind::Cluster, "x"),
        ResourceDeclaration::new(ResourceKind::Service, "y").depends_on("x"),
        ResourceDeclaration::new(ResourceKind::LogGroup, "z"),
    ];
    let report = executor(&plane, options()).run(&declarations).await;

    assert_eq!(report.outcome(), RunOutcome::Partial);
    assert_eq!(report.exit_code(), 1);

    let x_state = report.state(&x).unwrap();
    assert_eq!(x_state.status, ResourceStatus::Failed);
    assert_eq!(x_state.last_error.as_ref().unwrap().message, "quota exceeded");

    let y = id(ResourceKind::Service, "y");
    let y_state = report.state(&y).unwrap();
    assert_eq!(y_state.status, ResourceStatus::Failed);
    let y_error = y_state.last_error.as_ref().unwrap();
    assert_eq!(y_error.class, ErrorClass::Dependency);
    assert!(y_error.message.contains("cluster/x"));

    let z = id(ResourceKind::LogGroup, "z");
    assert_eq!(report.state(&z).unwrap().status, ResourceStatus::Present);

    // y was never probed nor created
    let calls = plane.calls().await;
    assert!(!calls.contains(&ControlPlaneCall::Describe(y.clone())));
    assert!(!calls.contains(&ControlPlaneCall::Create(y)));
}

#[tokio::test]
async fn test_transitive_dependents_are_blocked() {
    let plane = Arc::new(MemoryControlPlane::new());
    plane
        .fail_describe(
            id(ResourceKind::Network, "net1"),
            [ControlPlaneError::Permission("denied".into())],
        )
        .await;

    let report = executor(&plane, options()).run(&web_stack()).await;

    assert_eq!(report.outcome(), RunOutcome::Failed);
    assert_eq!(report.exit_code(), 2);
    let sg = report.state(&id(ResourceKind::SecurityGroup, "sg1")).unwrap();
    assert_eq!(sg.last_error.as_ref().unwrap().class, ErrorClass::Dependency);
    let svc = report.state(&id(ResourceKind::Service, "svc1")).unwrap();
    assert_eq!(svc.last_error.as_ref().unwrap().class, ErrorClass::Dependency);
    assert!(plane.create_calls().await.is_empty());
}

#[tokio::test]
async fn test_divergence_is_reported_not_corrected() {
    let plane = Arc::new(MemoryControlPlane::new());
    let observed = Config::from([
        ("image".to_string(), json!("app:0.9")),
        ("cpu".to_string(), json!(256)),
        ("arn".to_string(), json!("svc-123")),
    ]);
    let svc = id(ResourceKind::Service, "svc1");
    plane.insert(svc.clone(), observed.clone()).await;

    let report = executor(&plane, options()).run(&web_stack()).await;

    let state = report.state(&svc).unwrap();
    assert_eq!(state.status, ResourceStatus::Divergent);
    assert_eq!(state.last_error.as_ref().unwrap().class, ErrorClass::Conflict);
    assert_eq!(state.drift.len(), 1);
    assert_eq!(state.drift[0].field, "image");
    assert_eq!(state.observed_config.as_ref(), Some(&observed));

    // Untouched on the control plane, never recreated.
    assert_eq!(plane.get(&svc).await, Some(observed));
    assert!(!plane.create_calls().await.contains(&svc));
    assert_eq!(report.outcome(), RunOutcome::Partial);
}

#[tokio::test]
async fn test_divergent_dependency_blocks_dependents() {
    let plane = Arc::new(MemoryControlPlane::new());
    let net = id(ResourceKind::Network, "net1");
    plane
        .insert(net.clone(), Config::from([("cidr".to_string(), json!("10.1.0.0/16"))]))
        .await;

    let report = executor(&plane, options()).run(&web_stack()).await;

    assert_eq!(report.state(&net).unwrap().status, ResourceStatus::Divergent);
    let sg = report.state(&id(ResourceKind::SecurityGroup, "sg1")).unwrap();
    assert_eq!(sg.status, ResourceStatus::Failed);
    assert_eq!(report.outcome(), RunOutcome::Partial);
}

#[tokio::test]
async fn test_transient_probe_failures_recover() {
    let plane = Arc::new(MemoryControlPlane::new());
    let net = id(ResourceKind::Network, "net1");
    plane
        .fail_describe(
            net.clone(),
            [
                ControlPlaneError::Transient("HTTP 503".into()),
                ControlPlaneError::Transient("HTTP 429".into()),
            ],
        )
        .await;

    let report = executor(&plane, options()).run(&web_stack()).await;

    assert_eq!(report.outcome(), RunOutcome::Success);
    assert_eq!(report.state(&net).unwrap().attempts, 3);
}

#[tokio::test]
async fn test_transient_probe_failures_exhaust_retries() {
    let plane = Arc::new(MemoryControlPlane::new());
    let role = id(ResourceKind::Role, "deployer");
    plane
        .fail_describe(
            role.clone(),
            std::iter::repeat_n(ControlPlaneError::Transient("timeout".into()), 3),
        )
        .await;

    let declarations = vec![ResourceDeclaration::new(ResourceKind::Role, "deployer")];
    let report = executor(&plane, options()).run(&declarations).await;

    let state = report.state(&role).unwrap();
    assert_eq!(state.status, ResourceStatus::Failed);
    assert_eq!(state.attempts, 3);
    assert_eq!(state.last_error.as_ref().unwrap().class, ErrorClass::Transient);
    assert_eq!(report.outcome(), RunOutcome::Failed);
    assert!(plane.create_calls().await.is_empty());
}

#[tokio::test]
async fn test_permission_errors_are_not_retried() {
    let plane = Arc::new(MemoryControlPlane::new());
    let registry = id(ResourceKind::Registry, "app");
    plane
        .fail_describe(
            registry.clone(),
            [ControlPlaneError::Permission("not authorized".into())],
        )
        .await;

    let declarations = vec![ResourceDeclaration::new(ResourceKind::Registry, "app")];
    let report = executor(&plane, options()).run(&declarations).await;

    let state = report.state(&registry).unwrap();
    assert_eq!(state.attempts, 1);
    assert_eq!(state.last_error.as_ref().unwrap().class, ErrorClass::Permission);
    assert_eq!(plane.calls().await.len(), 1);
}

#[tokio::test]
async fn test_dry_run_creates_nothing() {
    let plane = Arc::new(MemoryControlPlane::new());
    let options = ExecutorOptions {
        dry_run: true,
        ..options()
    };

    let report = executor(&plane, options).run(&web_stack()).await;

    assert!(report.dry_run());
    assert_eq!(report.outcome(), RunOutcome::Success);
    assert_eq!(report.summary().absent, 3);
    assert!(plane.create_calls().await.is_empty());
    assert_eq!(plane.resource_count().await, 0);
}

#[tokio::test]
async fn test_cancellation_leaves_remaining_pending() {
    let plane = Arc::new(MemoryControlPlane::new());
    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();

    let report = executor(&plane, options())
        .run_with_cancel(&web_stack(), rx)
        .await;

    assert!(report.cancelled());
    assert_eq!(report.outcome(), RunOutcome::Partial);
    assert_eq!(report.summary().pending, 3);
    assert!(plane.calls().await.is_empty());
}

/// Requests cancellation while `trigger` is being created.
struct CancelDuringCreate {
    inner: MemoryControlPlane,
    trigger: ResourceId,
    cancel: watch::Sender<bool>,
}

#[async_trait]
impl ControlPlane for CancelDuringCreate {
    async fn describe(&self, id: &ResourceId) -> Result<Option<Config>, ControlPlaneError> {
        self.inner.describe(id).await
    }

    async fn create(&self, id: &ResourceId, config: &Config) -> Result<Config, ControlPlaneError> {
        if *id == self.trigger {
            let _ = self.cancel.send(true);
        }
        self.inner.create(id, config).await
    }
}

#[tokio::test]
async fn test_cancellation_finishes_in_flight_resource() {
    let (tx, rx) = watch::channel(false);
    let a = id(ResourceKind::Network, "a");
    let plane = Arc::new(CancelDuringCreate {
        inner: MemoryControlPlane::new(),
        trigger: a.clone(),
        cancel: tx,
    });
    let declarations = vec![
        ResourceDeclaration::new(ResourceKind::Network, "a"),
        ResourceDeclaration::new(ResourceKind::Network, "b"),
        ResourceDeclaration::new(ResourceKind::SecurityGroup, "c").depends_on("a"),
    ];

    let report = PlanExecutor::with_audit(
        plane.clone(),
        options(),
        Arc::new(ReconcileAuditLogger::new_noop()),
    )
    .run_with_cancel(&declarations, rx)
    .await;

    assert!(report.cancelled());
    assert_eq!(report.outcome(), RunOutcome::Partial);

    let a_state = report.state(&a).unwrap();
    assert_eq!(a_state.status, ResourceStatus::Present);
    assert!(a_state.created);

    for pending in [id(ResourceKind::Network, "b"), id(ResourceKind::SecurityGroup, "c")] {
        assert_eq!(report.state(&pending).unwrap().status, ResourceStatus::Pending);
    }
    assert_eq!(report.summary().pending, 2);
    assert_eq!(plane.inner.create_calls().await, vec![a]);
}

#[tokio::test]
async fn test_empty_plan_succeeds() {
    let plane = Arc::new(MemoryControlPlane::new());
    let report = executor(&plane, options()).run(&[]).await;

    assert_eq!(report.outcome(), RunOutcome::Success);
    assert!(report.entries().is_empty());
}
