//! `rigger init` - write a starter plan.
//!
//! The starter plan provisions what a container app needs before its first
//! deploy: an image registry, a log group, an execution role, a cluster, a
//! network with a security group, and the service itself.

use std::path::Path;

use anyhow::{Context, Result};
use rigger_core::{Plan, PlanFile, ResourceDeclaration, ResourceKind};
use serde_json::json;

pub fn starter_plan() -> PlanFile {
    let resources = vec![
        ResourceDeclaration::new(ResourceKind::Registry, "app-images")
            .with("scan_on_push", true)
            .with("image_tag_mutability", "MUTABLE"),
        ResourceDeclaration::new(ResourceKind::LogGroup, "app-logs").with("retention_days", 14),
        ResourceDeclaration::new(ResourceKind::Role, "app-task-execution")
            .with("assumed_by", "tasks")
            .with("policies", json!(["pull-images", "write-logs"])),
        ResourceDeclaration::new(ResourceKind::Cluster, "app-cluster")
            .with("capacity", "on-demand"),
        ResourceDeclaration::new(ResourceKind::Network, "app-network").with("cidr", "10.0.0.0/16"),
        ResourceDeclaration::new(ResourceKind::SecurityGroup, "app-web")
            .depends_on("app-network")
            .with("ingress", json!([{"protocol": "tcp", "port": 80, "cidr": "0.0.0.0/0"}])),
        ResourceDeclaration::new(ResourceKind::Service, "app")
            .depends_on("app-cluster")
            .depends_on("app-images")
            .depends_on("app-logs")
            .depends_on("app-task-execution")
            .depends_on("security-group/app-web")
            .with("image", "app-images:latest")
            .with("desired_count", 1)
            .with("cpu", 256)
            .with("memory", 512)
            .with("port", 80),
    ];
    PlanFile { resources }
}

/// Run the `rigger init` command.
pub async fn run(output: &Path, force: bool) -> Result<()> {
    if tokio::fs::try_exists(output).await.unwrap_or(false) && !force {
        anyhow::bail!(
            "{} already exists. Use --force to overwrite.",
            output.display()
        );
    }

    let plan = starter_plan();
    let contents = plan.to_yaml().context("Failed to render starter plan")?;
    tokio::fs::write(output, contents)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;

    let order: Vec<String> = Plan::build(&plan.resources)?
        .order()
        .map(ToString::to_string)
        .collect();
    println!("Wrote {} ({} resources)", output.display(), order.len());
    println!("Execution order: {}", order.join(" -> "));
    Ok(())
}
