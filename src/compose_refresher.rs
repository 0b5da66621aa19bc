//! Fleet refresher.
//!
//! Recomputes the set of resources a project believes it owns from a
//! recorded [`ProjectStatus`] and the live listings. Nothing is mutated
//! remotely; drift is only reported.

use std::collections::BTreeSet;
use std::fmt;

use tracing::{debug, warn};

use crate::cloud_client::{InstanceApi, RemoteInstance, ResourceKind, ServiceGroupApi};
use crate::compose_naming;
use crate::compose_planner::DEFAULT_NETWORK;
use crate::compose_project::Project;
use crate::compose_state::{InstanceEntry, NetworkEntry, ProjectStatus};
use crate::error::{ComposeError, Result};

/// Drift between recorded status, project and live platform.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum DriftWarning {
    /// Owned and live, but no service of the project produces this name anymore.
    OrphanInstance(String),
    /// Live instance with a project service's name that the project does not own.
    UnlinkedInstance(String),
    /// Live service group with a project network's name that the project does not own.
    UnlinkedServiceGroup(String),
}

impl fmt::Display for DriftWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OrphanInstance(name) => write!(f, "orphan machine {name}"),
            Self::UnlinkedInstance(name) => {
                write!(f, "instance {name} exists but is not linked to the project")
            }
            Self::UnlinkedServiceGroup(name) => {
                write!(f, "service group {name} exists but is not linked to the project")
            }
        }
    }
}

/// Result of a refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshReport {
    /// Corrected status: recorded entries still present remotely.
    pub status: ProjectStatus,
    /// Drift found on the way, sorted.
    pub warnings: Vec<DriftWarning>,
}

/// Read-only revalidation of a recorded status.
pub struct FleetRefresher<'a, P> {
    platform: &'a P,
}

impl<'a, P: InstanceApi + ServiceGroupApi> FleetRefresher<'a, P> {
    /// Create a refresher over the given platform.
    #[must_use]
    pub const fn new(platform: &'a P) -> Self {
        Self { platform }
    }

    /// Revalidate `status` against live listings and the current project.
    ///
    /// # Errors
    ///
    /// Returns [`ComposeError::Remote`] if a listing fails.
    pub async fn refresh(&self, project: &Project, status: &ProjectStatus) -> Result<RefreshReport> {
        let live_instances = self
            .platform
            .list_instances()
            .await
            .map_err(|e| ComposeError::remote(ResourceKind::Instance, "*", e))?;
        let live_groups = self
            .platform
            .list_service_groups()
            .await
            .map_err(|e| ComposeError::remote(ResourceKind::ServiceGroup, "*", e))?;

        let declared_instances: BTreeSet<String> = project
            .services
            .iter()
            .map(|(alias, service)| compose_naming::instance_name(&project.name, alias, service))
            .collect();

        let mut warnings = Vec::new();

        let mut instances = Vec::new();
        for entry in &status.instances {
            let Some(live) = find_instance(&live_instances, entry) else {
                debug!(instance = %entry.name, "recorded instance no longer exists");
                continue;
            };
            if !declared_instances.contains(&live.name) {
                warnings.push(DriftWarning::OrphanInstance(live.name.clone()));
            }
            instances.push(InstanceEntry::from(live));
        }

        let owned: BTreeSet<&str> = instances.iter().map(|e| e.name.as_str()).collect();
        for live in &live_instances {
            if declared_instances.contains(&live.name) && !owned.contains(live.name.as_str()) {
                warnings.push(DriftWarning::UnlinkedInstance(live.name.clone()));
            }
        }

        let mut networks = Vec::new();
        for entry in &status.networks {
            let name = compose_naming::expand_private(&project.name, &entry.name);
            let found = live_groups.iter().find(|g| {
                g.name == name || entry.uuid.as_deref().is_some_and(|uuid| g.uuid == uuid)
            });
            match found {
                Some(group) => networks.push(NetworkEntry::from(group)),
                None => debug!(network = %name, "recorded service group no longer exists"),
            }
        }

        let owned: BTreeSet<&str> = networks.iter().map(|e| e.name.as_str()).collect();
        for name in declared_networks(project) {
            if !owned.contains(name.as_str()) && live_groups.iter().any(|g| g.name == name) {
                warnings.push(DriftWarning::UnlinkedServiceGroup(name));
            }
        }

        warnings.sort();
        warnings.dedup();
        for warning in &warnings {
            warn!(project = %project.name, "{warning}");
        }

        Ok(RefreshReport {
            status: ProjectStatus {
                instances,
                networks,
                ..status.clone()
            },
            warnings,
        })
    }
}

fn find_instance<'l>(live: &'l [RemoteInstance], entry: &InstanceEntry) -> Option<&'l RemoteInstance> {
    entry
        .uuid
        .as_deref()
        .and_then(|uuid| live.iter().find(|i| i.uuid == uuid))
        .or_else(|| live.iter().find(|i| i.name == entry.name))
}

/// Group names the project may produce: every declared network, plus the
/// synthesized default group.
fn declared_networks(project: &Project) -> BTreeSet<String> {
    let mut names: BTreeSet<String> = project
        .networks
        .iter()
        .map(|(alias, network)| compose_naming::network_name(&project.name, alias, Some(network)))
        .collect();
    if !project.networks.contains_key(DEFAULT_NETWORK) {
        names.insert(compose_naming::network_name(&project.name, DEFAULT_NETWORK, None));
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose_project::Network;

    #[test]
    fn declared_networks_include_default() {
        let mut project = Project::new("shop");
        project.networks.insert(
            "front".into(),
            Network {
                name: Some("_edge".into()),
            },
        );

        let names = declared_networks(&project);
        assert_eq!(
            names,
            BTreeSet::from(["shop-edge".to_string(), "shop-default".to_string()])
        );
    }

    #[test]
    fn drift_warnings_read_naturally() {
        assert_eq!(
            DriftWarning::OrphanInstance("shop-old".into()).to_string(),
            "orphan machine shop-old"
        );
        assert_eq!(
            DriftWarning::UnlinkedInstance("shop-web".into()).to_string(),
            "instance shop-web exists but is not linked to the project"
        );
    }
}
