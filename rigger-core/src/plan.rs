//! Plan loading, validation and dependency ordering.
//!
//! A [`Plan`] is a validated declaration set in execution order:
//! - every `(kind, name)` is unique and named
//! - every dependency reference resolves to exactly one declaration
//! - the dependency graph is acyclic
//!
//! Ordering is a topological sort in which ties are broken by name, then
//! kind, so the same declarations always produce the same order.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PlanError;
use crate::model::{ResourceDeclaration, ResourceId, ResourceKind};

/// On-disk shape of a plan file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanFile {
    #[serde(default)]
    pub resources: Vec<ResourceDeclaration>,
}

/// Serialization format of a plan file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanFormat {
    Yaml,
    Json,
}

impl PlanFormat {
    /// `.json` files are JSON; everything else is read as YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => PlanFormat::Json,
            _ => PlanFormat::Yaml,
        }
    }
}

impl PlanFile {
    /// Read and parse a plan file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, PlanError> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| PlanError::Read {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        Self::parse(&contents, PlanFormat::from_path(path), &path.display().to_string())
    }

    /// Parse plan contents. `origin` names the source in error messages.
    pub fn parse(contents: &str, format: PlanFormat, origin: &str) -> Result<Self, PlanError> {
        let parsed = match format {
            PlanFormat::Yaml => serde_yaml::from_str(contents).map_err(|e| e.to_string()),
            PlanFormat::Json => serde_json::from_str(contents).map_err(|e| e.to_string()),
        };
        parsed.map_err(|message| PlanError::Parse {
            path: origin.to_string(),
            message,
        })
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

/// A declaration with its dependencies resolved to identities.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedResource {
    pub id: ResourceId,
    pub declaration: ResourceDeclaration,
    /// Sorted and deduplicated.
    pub dependencies: Vec<ResourceId>,
}

/// A validated declaration set in execution order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    resources: Vec<PlannedResource>,
}

impl Plan {
    /// Validate `declarations` and order them by dependency.
    pub fn build(declarations: &[ResourceDeclaration]) -> Result<Self, PlanError> {
        let mut index: BTreeMap<ResourceId, usize> = BTreeMap::new();
        for (position, declaration) in declarations.iter().enumerate() {
            if declaration.name.trim().is_empty() {
                return Err(PlanError::EmptyName(declaration.kind));
            }
            let id = declaration.id();
            if index.insert(id.clone(), position).is_some() {
                return Err(PlanError::Duplicate(id));
            }
        }

        let mut dependencies: BTreeMap<ResourceId, BTreeSet<ResourceId>> = BTreeMap::new();
        for declaration in declarations {
            let id = declaration.id();
            let mut resolved = BTreeSet::new();
            for reference in &declaration.depends_on {
                let dependency = resolve(&id, reference, &index)?;
                if dependency == id {
                    return Err(PlanError::SelfDependency(id));
                }
                resolved.insert(dependency);
            }
            dependencies.insert(id, resolved);
        }

        let order = topological_order(&dependencies)?;

        let resources = order
            .into_iter()
            .map(|id| {
                let declaration = declarations[index[&id]].clone();
                let dependencies = dependencies
                    .remove(&id)
                    .map(|deps| deps.into_iter().collect())
                    .unwrap_or_default();
                PlannedResource {
                    id,
                    declaration,
                    dependencies,
                }
            })
            .collect();

        Ok(Plan { resources })
    }

    /// Resources in execution order.
    pub fn resources(&self) -> &[PlannedResource] {
        &self.resources
    }

    pub fn order(&self) -> impl Iterator<Item = &ResourceId> {
        self.resources.iter().map(|r| &r.id)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// Resolve a `name` or `kind/name` reference made by `owner`.
fn resolve(
    owner: &ResourceId,
    reference: &str,
    index: &BTreeMap<ResourceId, usize>,
) -> Result<ResourceId, PlanError> {
    let reference = reference.trim();

    if let Some((kind, name)) = reference.split_once('/')
        && let Ok(kind) = kind.parse::<ResourceKind>()
    {
        let id = ResourceId::new(kind, name);
        return if index.contains_key(&id) {
            Ok(id)
        } else {
            Err(PlanError::UnknownDependency {
                resource: owner.clone(),
                reference: reference.to_string(),
            })
        };
    }

    let candidates: Vec<&ResourceId> = index.keys().filter(|id| id.name == reference).collect();
    match candidates.as_slice() {
        [] => Err(PlanError::UnknownDependency {
            resource: owner.clone(),
            reference: reference.to_string(),
        }),
        [only] => Ok((*only).clone()),
        many => Err(PlanError::AmbiguousDependency {
            resource: owner.clone(),
            reference: reference.to_string(),
            candidates: many
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
        }),
    }
}

/// Kahn's algorithm over `resource -> dependencies`. The ready set is ordered,
/// so the smallest ready identity is always emitted first.
fn topological_order(
    dependencies: &BTreeMap<ResourceId, BTreeSet<ResourceId>>,
) -> Result<Vec<ResourceId>, PlanError> {
    let mut remaining: BTreeMap<&ResourceId, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&ResourceId, Vec<&ResourceId>> = BTreeMap::new();

    for (id, deps) in dependencies {
        remaining.insert(id, deps.len());
        for dep in deps {
            dependents.entry(dep).or_default().push(id);
        }
    }

    let mut ready: BTreeSet<&ResourceId> = remaining
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut order = Vec::with_capacity(dependencies.len());

    while let Some(next) = ready.pop_first() {
        order.push(next.clone());
        for dependent in dependents.get(next).into_iter().flatten() {
            if let Some(count) = remaining.get_mut(dependent) {
                *count -= 1;
                if *count == 0 {
                    ready.insert(*dependent);
                }
            }
        }
    }

    if order.len() < dependencies.len() {
        let emitted: BTreeSet<&ResourceId> = order.iter().collect();
        return Err(PlanError::Cycle(find_cycle(dependencies, &emitted)));
    }

    Ok(order)
}

/// Every resource left over by the sort has at least one left-over
/// dependency, so following those edges must revisit a resource.
fn find_cycle(
    dependencies: &BTreeMap<ResourceId, BTreeSet<ResourceId>>,
    emitted: &BTreeSet<&ResourceId>,
) -> Vec<ResourceId> {
    let Some(start) = dependencies.keys().find(|id| !emitted.contains(id)) else {
        return Vec::new();
    };

    let mut path: Vec<&ResourceId> = vec![start];
    let mut current = start;
    loop {
        let next = dependencies
            .get(current)
            .and_then(|deps| deps.iter().find(|dep| !emitted.contains(dep)));
        let Some(next) = next else {
            return path.into_iter().cloned().collect();
        };
        if let Some(position) = path.iter().position(|id| *id == next) {
            let mut cycle: Vec<ResourceId> =
                path[position..].iter().map(|id| (*id).clone()).collect();
            cycle.push(next.clone());
            return cycle;
        }
        path.push(next);
        current = next;
    }
}
