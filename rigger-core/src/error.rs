//! Error types and the error taxonomy used in reports.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{ResourceId, ResourceKind};

/// Classification of every failure a run can record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorClass {
    /// Malformed or cyclic declaration set. Detected before any network call.
    Config,
    /// Network, timeout or throttling failure. Retried while probing.
    Transient,
    /// Authorization denial. Never retried.
    Permission,
    /// Resource exists with a configuration other than the declared one.
    Conflict,
    /// Any other fault reported by the control plane.
    Provider,
    /// A dependency never became available.
    Dependency,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Config => "CONFIG",
            ErrorClass::Transient => "TRANSIENT",
            ErrorClass::Permission => "PERMISSION",
            ErrorClass::Conflict => "CONFLICT",
            ErrorClass::Provider => "PROVIDER",
            ErrorClass::Dependency => "DEPENDENCY",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by a [`ControlPlane`](crate::client::ControlPlane).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlPlaneError {
    /// Timeout, connection failure, 5xx or throttling.
    #[error("transient failure: {0}")]
    Transient(String),

    /// The caller is not allowed to perform the operation.
    #[error("permission denied: {0}")]
    Permission(String),

    /// The resource already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Validation errors, quota exhaustion and anything else.
    #[error("provider error: {0}")]
    Provider(String),
}

impl ControlPlaneError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ControlPlaneError::Transient(_) => ErrorClass::Transient,
            ControlPlaneError::Permission(_) => ErrorClass::Permission,
            ControlPlaneError::Conflict(_) => ErrorClass::Conflict,
            ControlPlaneError::Provider(_) => ErrorClass::Provider,
        }
    }

    /// Only transient failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ControlPlaneError::Transient(_))
    }

    /// The message as reported by the provider.
    pub fn message(&self) -> &str {
        match self {
            ControlPlaneError::Transient(m)
            | ControlPlaneError::Permission(m)
            | ControlPlaneError::Conflict(m)
            | ControlPlaneError::Provider(m) => m,
        }
    }
}

/// A declaration set that cannot be executed. Always [`ErrorClass::Config`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("failed to read plan {path}: {message}")]
    Read { path: String, message: String },

    #[error("failed to parse plan {path}: {message}")]
    Parse { path: String, message: String },

    #[error("{0} declaration has an empty name")]
    EmptyName(ResourceKind),

    #[error("duplicate declaration {0}")]
    Duplicate(ResourceId),

    #[error("{0} depends on itself")]
    SelfDependency(ResourceId),

    #[error("{resource} depends on unknown resource '{reference}'")]
    UnknownDependency {
        resource: ResourceId,
        reference: String,
    },

    #[error(
        "{resource} dependency '{reference}' is ambiguous ({candidates}); qualify it as kind/name"
    )]
    AmbiguousDependency {
        resource: ResourceId,
        reference: String,
        candidates: String,
    },

    #[error("dependency cycle detected: {}", format_cycle(.0))]
    Cycle(Vec<ResourceId>),
}

impl PlanError {
    pub fn class(&self) -> ErrorClass {
        ErrorClass::Config
    }
}

fn format_cycle(cycle: &[ResourceId]) -> String {
    cycle
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// A string that does not name a [`ResourceKind`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown resource kind '{0}'")]
pub struct UnknownKind(pub String);
