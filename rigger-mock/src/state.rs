//! In-memory state of the mock control plane.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use rigger_core::audit::ReconcileAuditLogger;
use rigger_core::client::file::read_state;
use rigger_core::{Config, ControlPlaneError, ResourceId};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// Shared application state
pub struct AppState {
    resources: RwLock<BTreeMap<ResourceId, Config>>,
    /// HTTP status codes to answer with instead of serving, per resource.
    faults: Mutex<HashMap<ResourceId, VecDeque<u16>>>,
    pub token: Option<String>,
    pub audit: Arc<ReconcileAuditLogger>,
}

impl AppState {
    pub fn new(token: Option<String>, audit: Arc<ReconcileAuditLogger>) -> Self {
        Self {
            resources: RwLock::new(BTreeMap::new()),
            faults: Mutex::new(HashMap::new()),
            token,
            audit,
        }
    }

    /// Load resources from a state file as written by the file backend.
    pub async fn seed_from(&self, path: &Path) -> Result<usize, ControlPlaneError> {
        let entries = read_state(path).await?.entries()?;
        let count = entries.len();
        for (id, config) in entries {
            self.insert(id, config).await;
        }
        Ok(count)
    }

    pub async fn insert(&self, id: ResourceId, config: Config) {
        self.resources.write().await.insert(id, config);
    }

    pub async fn get(&self, id: &ResourceId) -> Option<Config> {
        self.resources.read().await.get(id).cloned()
    }

    pub async fn list(&self) -> Vec<(ResourceId, Config)> {
        self.resources
            .read()
            .await
            .iter()
            .map(|(id, config)| (id.clone(), config.clone()))
            .collect()
    }

    /// Store a new resource. Provider-assigned fields (`id`, `created_at`)
    /// are added to the returned configuration. `None` if it already exists.
    pub async fn create(&self, id: ResourceId, mut config: Config) -> Option<Config> {
        let mut resources = self.resources.write().await;
        if resources.contains_key(&id) {
            return None;
        }

        config.insert("id".to_string(), Uuid::new_v4().to_string().into());
        config.insert("created_at".to_string(), Utc::now().to_rfc3339().into());
        resources.insert(id, config.clone());
        Some(config)
    }

    /// Answer the next `count` requests for `id` with `status`.
    pub async fn inject_failures(&self, id: ResourceId, status: u16, count: usize) {
        self.faults
            .lock()
            .await
            .entry(id)
            .or_default()
            .extend(std::iter::repeat_n(status, count));
    }

    pub(crate) async fn take_fault(&self, id: &ResourceId) -> Option<u16> {
        self.faults.lock().await.get_mut(id)?.pop_front()
    }
}
