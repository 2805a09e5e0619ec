//! Report rendering.

use anyhow::Result;
use clap::ValueEnum;
use rigger_core::{ReconciliationReport, ReportEntry, ResourceStatus};
use tabled::{Table, Tabled};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Tabled)]
struct ResourceRow {
    #[tabled(rename = "RESOURCE")]
    resource: String,
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "ACTION")]
    action: String,
    #[tabled(rename = "ERROR")]
    error: String,
}

impl ResourceRow {
    fn new(entry: &ReportEntry, dry_run: bool) -> Self {
        let state = &entry.state;
        let action = if state.created {
            "created".to_string()
        } else {
            match state.status {
                ResourceStatus::Absent if dry_run => "would create".to_string(),
                ResourceStatus::Present => "none".to_string(),
                ResourceStatus::Divergent => "manual".to_string(),
                _ => "-".to_string(),
            }
        };
        let error = match &state.last_error {
            Some(e) if state.drift.is_empty() => e.to_string(),
            Some(e) => {
                let fields: Vec<String> = state
                    .drift
                    .iter()
                    .map(|d| {
                        let observed = d
                            .observed
                            .as_ref()
                            .map(ToString::to_string)
                            .unwrap_or_else(|| "<missing>".to_string());
                        format!("{}: want {}, have {}", d.field, d.desired, observed)
                    })
                    .collect();
                format!("{} ({})", e.class, fields.join("; "))
            }
            None => "-".to_string(),
        };

        Self {
            resource: entry.id().to_string(),
            status: state.status.to_string(),
            action,
            error,
        }
    }
}

pub fn render(report: &ReconciliationReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
        OutputFormat::Table => Ok(render_table(report)),
    }
}

fn render_table(report: &ReconciliationReport) -> String {
    let mut out = String::new();

    if let Some(error) = report.plan_error() {
        out.push_str(&format!("Plan rejected: {}\n", error));
    }

    if !report.entries().is_empty() {
        let rows: Vec<ResourceRow> = report
            .entries()
            .iter()
            .map(|entry| ResourceRow::new(entry, report.dry_run()))
            .collect();
        out.push_str(&Table::new(rows).to_string());
        out.push('\n');
    }

    let summary = report.summary();
    let elapsed = report.finished_at() - report.started_at();
    out.push_str(&format!(
        "{}{}: {} resources, {} present ({} created), {} absent, ",
        report.outcome(),
        if report.cancelled() { " (cancelled)" } else { "" },
        summary.total,
        summary.present,
        summary.created,
        summary.absent,
    ));
    out.push_str(&format!(
        "{} divergent, {} failed, {} pending in {}ms\n",
        summary.divergent,
        summary.failed,
        summary.pending,
        elapsed.num_milliseconds()
    ));
    out.push_str(&format!("run {}\n", report.run_id()));
    out
}
