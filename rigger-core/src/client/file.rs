//! Control plane backed by a local JSON state file.
//!
//! Stands in for a remote control plane when walking through a plan offline.
//! The file maps `kind/name` keys to resource configurations; a missing file
//! is an empty control plane.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use super::ControlPlane;
use crate::error::ControlPlaneError;
use crate::model::{Config, ResourceId};

/// Contents of a state file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDocument {
    #[serde(default)]
    pub resources: BTreeMap<String, Config>,
}

impl StateDocument {
    /// Entries keyed by parsed identity. Fails on keys that are not `kind/name`.
    pub fn entries(&self) -> Result<Vec<(ResourceId, Config)>, ControlPlaneError> {
        self.resources
            .iter()
            .map(|(key, config)| {
                key.parse::<ResourceId>()
                    .map(|id| (id, config.clone()))
                    .map_err(|e| ControlPlaneError::Provider(format!("invalid state key: {}", e)))
            })
            .collect()
    }
}

/// Read a state file. A missing file reads as an empty document.
pub async fn read_state(path: &Path) -> Result<StateDocument, ControlPlaneError> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
            ControlPlaneError::Provider(format!("corrupt state file {}: {}", path.display(), e))
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(StateDocument::default()),
        Err(e) => Err(io_error(path, e)),
    }
}

fn io_error(path: &Path, e: std::io::Error) -> ControlPlaneError {
    let message = format!("{}: {}", path.display(), e);
    if e.kind() == ErrorKind::PermissionDenied {
        ControlPlaneError::Permission(message)
    } else {
        ControlPlaneError::Provider(message)
    }
}

/// Control plane persisted in a JSON file.
pub struct FileControlPlane {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileControlPlane {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Write through a temporary file so a crash never leaves a torn state file.
    async fn write_state(&self, state: &StateDocument) -> Result<(), ControlPlaneError> {
        let contents = serde_json::to_string_pretty(state)
            .map_err(|e| ControlPlaneError::Provider(format!("failed to encode state: {}", e)))?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, contents)
            .await
            .map_err(|e| io_error(&tmp, e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| io_error(&self.path, e))
    }
}

#[async_trait]
impl ControlPlane for FileControlPlane {
    async fn describe(&self, id: &ResourceId) -> Result<Option<Config>, ControlPlaneError> {
        let _guard = self.lock.lock().await;
        let state = read_state(&self.path).await?;
        Ok(state.resources.get(&id.to_string()).cloned())
    }

    async fn create(&self, id: &ResourceId, config: &Config) -> Result<Config, ControlPlaneError> {
        let _guard = self.lock.lock().await;
        let mut state = read_state(&self.path).await?;
        let key = id.to_string();
        if state.resources.contains_key(&key) {
            return Err(ControlPlaneError::Conflict(format!("{} already exists", id)));
        }

        state.resources.insert(key, config.clone());
        self.write_state(&state).await?;
        debug!(resource = %id, path = %self.path.display(), "Recorded resource in state file");
        Ok(config.clone())
    }
}
