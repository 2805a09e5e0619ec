//! Resource model: declarations and the per-run state of each declaration.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ControlPlaneError, ErrorClass, UnknownKind};

/// Desired or observed configuration of a resource.
///
/// Ordered so that reports and state files render deterministically.
pub type Config = BTreeMap<String, Value>;

/// Kind of infrastructure a declaration asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    #[serde(alias = "Registry")]
    Registry,
    #[serde(alias = "Cluster")]
    Cluster,
    #[serde(alias = "LogGroup")]
    LogGroup,
    #[serde(alias = "Role")]
    Role,
    #[serde(alias = "Network")]
    Network,
    #[serde(alias = "SecurityGroup")]
    SecurityGroup,
    #[serde(alias = "Service")]
    Service,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 7] = [
        ResourceKind::Registry,
        ResourceKind::Cluster,
        ResourceKind::LogGroup,
        ResourceKind::Role,
        ResourceKind::Network,
        ResourceKind::SecurityGroup,
        ResourceKind::Service,
    ];

    /// Wire name, also used in URLs and state file keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Registry => "registry",
            ResourceKind::Cluster => "cluster",
            ResourceKind::LogGroup => "log-group",
            ResourceKind::Role => "role",
            ResourceKind::Network => "network",
            ResourceKind::SecurityGroup => "security-group",
            ResourceKind::Service => "service",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = UnknownKind;

    /// Accepts `log-group`, `log_group` and `LogGroup` alike.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .flat_map(char::to_lowercase)
            .collect();

        ResourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().replace('-', "") == normalized)
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

/// Identity of a declaration: names are unique within a kind.
///
/// Ordering is by name first, then kind, which is the tie-break rule used for
/// deterministic execution order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceId {
    pub kind: ResourceKind,
    pub name: String,
}

impl ResourceId {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl Ord for ResourceId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.kind.cmp(&other.kind))
    }
}

impl PartialOrd for ResourceId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

impl FromStr for ResourceId {
    type Err = UnknownKind;

    /// Parses the `kind/name` form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, name) = s.split_once('/').ok_or_else(|| UnknownKind(s.to_string()))?;
        Ok(ResourceId::new(kind.parse()?, name))
    }
}

/// A named, typed request for a piece of infrastructure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceDeclaration {
    pub kind: ResourceKind,
    pub name: String,
    /// References to other declarations, either `name` or `kind/name`.
    #[serde(default, alias = "dependsOn", skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    /// Desired configuration. Its keys are the fields rigger manages.
    #[serde(
        default,
        alias = "desiredConfig",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub config: Config,
}

impl ResourceDeclaration {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            depends_on: Vec::new(),
            config: Config::new(),
        }
    }

    /// Add a dependency reference.
    pub fn depends_on(mut self, reference: impl Into<String>) -> Self {
        self.depends_on.push(reference.into());
        self
    }

    /// Set a desired configuration field.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> ResourceId {
        ResourceId::new(self.kind, self.name.clone())
    }
}

/// Where a declaration stands within the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceStatus {
    Pending,
    Absent,
    Creating,
    Present,
    Divergent,
    Failed,
}

impl ResourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceStatus::Pending => "pending",
            ResourceStatus::Absent => "absent",
            ResourceStatus::Creating => "creating",
            ResourceStatus::Present => "present",
            ResourceStatus::Divergent => "divergent",
            ResourceStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error recorded against a single declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceError {
    pub class: ErrorClass,
    pub message: String,
}

impl ResourceError {
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.class, self.message)
    }
}

impl From<&ControlPlaneError> for ResourceError {
    fn from(e: &ControlPlaneError) -> Self {
        ResourceError::new(e.class(), e.message())
    }
}

/// One managed field whose observed value differs from the desired one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDrift {
    pub field: String,
    pub desired: Value,
    /// `None` when the field is missing from the observed configuration.
    pub observed: Option<Value>,
}

/// Working record of one declaration's outcome during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    pub status: ResourceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_config: Option<Config>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<ResourceError>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub drift: Vec<FieldDrift>,
    /// Whether this run issued the create call that made the resource present.
    #[serde(default)]
    pub created: bool,
    /// Describe calls issued while probing.
    #[serde(default)]
    pub attempts: u32,
}

impl ResourceState {
    pub fn pending() -> Self {
        Self {
            status: ResourceStatus::Pending,
            observed_config: None,
            last_error: None,
            drift: Vec::new(),
            created: false,
            attempts: 0,
        }
    }

    pub fn absent(attempts: u32) -> Self {
        Self {
            status: ResourceStatus::Absent,
            attempts,
            ..Self::pending()
        }
    }

    pub fn present(observed: Config, attempts: u32) -> Self {
        Self {
            status: ResourceStatus::Present,
            observed_config: Some(observed),
            attempts,
            ..Self::pending()
        }
    }

    pub fn divergent(observed: Config, drift: Vec<FieldDrift>, attempts: u32) -> Self {
        let fields: Vec<&str> = drift.iter().map(|d| d.field.as_str()).collect();
        Self {
            status: ResourceStatus::Divergent,
            observed_config: Some(observed),
            last_error: Some(ResourceError::new(
                ErrorClass::Conflict,
                format!("observed configuration differs on: {}", fields.join(", ")),
            )),
            drift,
            attempts,
            ..Self::pending()
        }
    }

    pub fn failed(error: ResourceError) -> Self {
        Self {
            status: ResourceStatus::Failed,
            last_error: Some(error),
            ..Self::pending()
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_parsing_accepts_common_spellings() {
        assert_eq!("log-group".parse::<ResourceKind>().unwrap(), ResourceKind::LogGroup);
        assert_eq!("log_group".parse::<ResourceKind>().unwrap(), ResourceKind::LogGroup);
        assert_eq!("LogGroup".parse::<ResourceKind>().unwrap(), ResourceKind::LogGroup);
        assert_eq!(
            "SecurityGroup".parse::<ResourceKind>().unwrap(),
            ResourceKind::SecurityGroup
        );
        assert!("bucket".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn test_resource_id_orders_by_name_then_kind() {
        let mut ids = vec![
            ResourceId::new(ResourceKind::Service, "b"),
            ResourceId::new(ResourceKind::Role, "a"),
            ResourceId::new(ResourceKind::Cluster, "b"),
        ];
        ids.sort();
        assert_eq!(
            ids,
            vec![
                ResourceId::new(ResourceKind::Role, "a"),
                ResourceId::new(ResourceKind::Cluster, "b"),
                ResourceId::new(ResourceKind::Service, "b"),
            ]
        );
    }

    #[test]
    fn test_resource_id_round_trips_through_display() {
        let id = ResourceId::new(ResourceKind::SecurityGroup, "web");
        assert_eq!(id.to_string(), "security-group/web");
        assert_eq!("security-group/web".parse::<ResourceId>().unwrap(), id);
        assert!("web".parse::<ResourceId>().is_err());
    }

    #[test]
    fn test_declaration_accepts_camel_case_aliases() {
        let decl: ResourceDeclaration = serde_json::from_value(json!({
            "kind": "Service",
            "name": "svc1",
            "dependsOn": ["sg1"],
            "desiredConfig": {"cpu": 256}
        }))
        .unwrap();
        assert_eq!(decl.kind, ResourceKind::Service);
        assert_eq!(decl.depends_on, vec!["sg1".to_string()]);
        assert_eq!(decl.config.get("cpu"), Some(&json!(256)));
    }

    #[test]
    fn test_declaration_rejects_unknown_fields() {
        let result: Result<ResourceDeclaration, _> = serde_json::from_value(json!({
            "kind": "role",
            "name": "deployer",
            "depends": ["x"]
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_divergent_state_records_conflict() {
        let drift = vec![FieldDrift {
            field: "cpu".to_string(),
            desired: json!(512),
            observed: Some(json!(256)),
        }];
        let state = ResourceState::divergent(Config::new(), drift, 1);
        assert_eq!(state.status, ResourceStatus::Divergent);
        let error = state.last_error.unwrap();
        assert_eq!(error.class, ErrorClass::Conflict);
        assert!(error.message.contains("cpu"));
    }
}
