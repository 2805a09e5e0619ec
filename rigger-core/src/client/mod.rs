//! Control plane clients.
//!
//! The [`ControlPlane`] trait is the only seam through which rigger touches
//! remote infrastructure:
//! - [`HttpControlPlane`]: JSON over HTTP(S) with bearer token auth
//! - [`FileControlPlane`]: a local JSON state file
//! - [`MemoryControlPlane`]: in-process store with fault injection

pub mod file;
pub mod http;
pub mod memory;
pub mod wire;

use async_trait::async_trait;

use crate::error::ControlPlaneError;
use crate::model::{Config, ResourceId};

pub use file::FileControlPlane;
pub use http::HttpControlPlane;
pub use memory::{ControlPlaneCall, MemoryControlPlane};

/// Read and create access to a remote control plane.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Look up a resource. `Ok(None)` means it does not exist.
    async fn describe(&self, id: &ResourceId) -> Result<Option<Config>, ControlPlaneError>;

    /// Create a resource and return its configuration as observed after creation.
    async fn create(&self, id: &ResourceId, config: &Config) -> Result<Config, ControlPlaneError>;
}
