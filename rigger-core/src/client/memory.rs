//! In-process control plane with a call log and fault injection.

use std::collections::{BTreeMap, HashMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::ControlPlane;
use crate::error::ControlPlaneError;
use crate::model::{Config, ResourceId};

/// A call observed by [`MemoryControlPlane`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlPlaneCall {
    Describe(ResourceId),
    Create(ResourceId),
}

#[derive(Default)]
struct Inner {
    resources: BTreeMap<ResourceId, Config>,
    calls: Vec<ControlPlaneCall>,
    /// Consumed one per describe call.
    describe_faults: HashMap<ResourceId, VecDeque<ControlPlaneError>>,
    /// Returned for every create call.
    create_faults: HashMap<ResourceId, ControlPlaneError>,
}

/// Control plane that keeps resources in memory.
#[derive(Default)]
pub struct MemoryControlPlane {
    inner: Mutex<Inner>,
}

impl MemoryControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an existing resource.
    pub async fn insert(&self, id: ResourceId, config: Config) {
        self.inner.lock().await.resources.insert(id, config);
    }

    pub async fn get(&self, id: &ResourceId) -> Option<Config> {
        self.inner.lock().await.resources.get(id).cloned()
    }

    pub async fn resource_count(&self) -> usize {
        self.inner.lock().await.resources.len()
    }

    /// Fail the next describe calls for `id` with `errors`, in order.
    pub async fn fail_describe(
        &self,
        id: ResourceId,
        errors: impl IntoIterator<Item = ControlPlaneError>,
    ) {
        self.inner
            .lock()
            .await
            .describe_faults
            .entry(id)
            .or_default()
            .extend(errors);
    }

    /// Fail every create call for `id` with `error`.
    pub async fn fail_create(&self, id: ResourceId, error: ControlPlaneError) {
        self.inner.lock().await.create_faults.insert(id, error);
    }

    pub async fn calls(&self) -> Vec<ControlPlaneCall> {
        self.inner.lock().await.calls.clone()
    }

    /// Resources for which a create call was issued, in call order.
    pub async fn create_calls(&self) -> Vec<ResourceId> {
        self.inner
            .lock()
            .await
            .calls
            .iter()
            .filter_map(|call| match call {
                ControlPlaneCall::Create(id) => Some(id.clone()),
                ControlPlaneCall::Describe(_) => None,
            })
            .collect()
    }

    pub async fn clear_calls(&self) {
        self.inner.lock().await.calls.clear();
    }
}

#[async_trait]
impl ControlPlane for MemoryControlPlane {
    async fn describe(&self, id: &ResourceId) -> Result<Option<Config>, ControlPlaneError> {
        let mut inner = self.inner.lock().await;
        inner.calls.push(ControlPlaneCall::Describe(id.clone()));

        if let Some(error) = inner
            .describe_faults
            .get_mut(id)
            .and_then(VecDeque::pop_front)
        {
            debug!(resource = %id, error = %error, "Injected describe fault");
            return Err(error);
        }

        Ok(inner.resources.get(id).cloned())
    }

    async fn create(&self, id: &ResourceId, config: &Config) -> Result<Config, ControlPlaneError> {
        let mut inner = self.inner.lock().await;
        inner.calls.push(ControlPlaneCall::Create(id.clone()));

        if let Some(error) = inner.create_faults.get(id) {
            debug!(resource = %id, error = %error, "Injected create fault");
            return Err(error.clone());
        }
        if inner.resources.contains_key(id) {
            return Err(ControlPlaneError::Conflict(format!("{} already exists", id)));
        }

        inner.resources.insert(id.clone(), config.clone());
        Ok(config.clone())
    }
}
