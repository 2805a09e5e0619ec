//! Resource probe: classify the remote state of a declaration.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::client::ControlPlane;
use crate::model::{Config, FieldDrift, ResourceDeclaration, ResourceError, ResourceState};
use crate::retry::RetryPolicy;

/// Looks up declared resources on the control plane.
pub struct Probe {
    client: Arc<dyn ControlPlane>,
    retry: RetryPolicy,
}

impl Probe {
    pub fn new(client: Arc<dyn ControlPlane>, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    /// Returns ABSENT, PRESENT, DIVERGENT or FAILED. Never mutates anything.
    pub async fn probe(&self, declaration: &ResourceDeclaration) -> ResourceState {
        let id = declaration.id();
        let (result, attempts) = self.retry.run(|| self.client.describe(&id)).await;

        match result {
            Ok(None) => {
                debug!(resource = %id, attempts, "Resource absent");
                ResourceState::absent(attempts)
            }
            Ok(Some(observed)) => {
                let drift = diff(&declaration.config, &observed);
                if drift.is_empty() {
                    debug!(resource = %id, attempts, "Resource present");
                    ResourceState::present(observed, attempts)
                } else {
                    debug!(resource = %id, drifted = drift.len(), "Resource divergent");
                    ResourceState::divergent(observed, drift, attempts)
                }
            }
            Err(e) => {
                debug!(resource = %id, attempts, error = %e, "Probe failed");
                ResourceState::failed(ResourceError::from(&e)).with_attempts(attempts)
            }
        }
    }
}

/// Managed fields of `desired` whose observed value differs or is missing.
///
/// Keys present only in `observed` are provider-owned and ignored.
pub fn diff(desired: &Config, observed: &Config) -> Vec<FieldDrift> {
    desired
        .iter()
        .filter_map(|(field, want)| match observed.get(field) {
            Some(have) if values_match(want, have) => None,
            have => Some(FieldDrift {
                field: field.clone(),
                desired: want.clone(),
                observed: have.cloned(),
            }),
        })
        .collect()
}

fn values_match(desired: &Value, observed: &Value) -> bool {
    match (desired, observed) {
        (Value::Number(a), Value::Number(b)) if a.is_f64() || b.is_f64() => {
            a.as_f64() == b.as_f64()
        }
        (Value::Number(a), Value::Number(b)) => as_integer(a) == as_integer(b),
        (Value::Object(want), Value::Object(have)) => want.iter().all(|(key, value)| {
            have.get(key)
                .is_some_and(|observed| values_match(value, observed))
        }),
        _ => desired == observed,
    }
}

fn as_integer(n: &serde_json::Number) -> Option<i128> {
    n.as_i64()
        .map(i128::from)
        .or_else(|| n.as_u64().map(i128::from))
}
