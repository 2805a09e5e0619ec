//! HTTP wire types shared by [`HttpControlPlane`](super::HttpControlPlane)
//! and the mock control plane server.
//!
//! Routes, relative to `{endpoint}/api/v1`:
//! - `GET /resources/{kind}/{name}`: 200 with a [`ResourceDocument`], or 404
//! - `POST /resources/{kind}/{name}`: body [`CreateResourceRequest`], 201 with
//!   a [`ResourceDocument`], or 409 if the resource exists

use serde::{Deserialize, Serialize};

use crate::model::{Config, ResourceKind};

/// A resource as the control plane reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDocument {
    pub kind: ResourceKind,
    pub name: String,
    pub config: Config,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateResourceRequest {
    pub config: Config,
}

/// Error body returned with every non-2xx response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    pub code: u16,
}
