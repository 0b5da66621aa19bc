//! Port and network planning.
//!
//! Unique responsibility: turn the published ports and the single network
//! membership of each requested service into service-group specifications,
//! then make sure those groups exist remotely (create or adopt).
//!
//! Planning ([`plan_networks`]) is pure and runs before any remote call, so a
//! configuration error never leaves half-created resources behind.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{info, warn};

use crate::cloud_client::{
    CreateServiceGroupRequest, Handler, Listener, RemoteServiceGroup, ResourceKind, ResourceRef,
    ServiceGroupApi,
};
use crate::compose_naming;
use crate::compose_project::{PortConfig, Project, Service};
use crate::error::{ComposeError, Result};

/// Alias of the group synthesized when no requested service joins a network.
pub const DEFAULT_NETWORK: &str = "default";

/// Public HTTPS port; gets an extra HTTP redirect listener.
const HTTPS_PORT: u16 = 443;

/// Public HTTP port used for the redirect listener.
const HTTP_PORT: u16 = 80;

/// Desired shape of one service group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceGroupPlan {
    /// Network alias.
    pub alias: String,
    /// Remote group name.
    pub name: String,
    /// De-duplicated listeners.
    pub listeners: BTreeSet<Listener>,
    /// Domain bindings.
    pub domains: BTreeSet<String>,
    /// Service aliases joining the group.
    pub members: BTreeSet<String>,
}

impl ServiceGroupPlan {
    fn new(alias: &str, name: String) -> Self {
        Self {
            alias: alias.to_string(),
            name,
            listeners: BTreeSet::new(),
            domains: BTreeSet::new(),
            members: BTreeSet::new(),
        }
    }

    /// Creation request for this group.
    #[must_use]
    pub fn request(&self) -> CreateServiceGroupRequest {
        CreateServiceGroupRequest {
            name: self.name.clone(),
            listeners: self.listeners.iter().cloned().collect(),
            domains: self.domains.iter().cloned().collect(),
        }
    }

    fn add_listener(&mut self, listener: Listener) -> Result<()> {
        let clash = self
            .listeners
            .iter()
            .any(|l| l.port == listener.port && *l != listener);
        if clash {
            return Err(ComposeError::ConflictingListener {
                group: self.alias.clone(),
                port: listener.port,
            });
        }
        self.listeners.insert(listener);
        Ok(())
    }
}

/// Service groups for a set of requested services.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkPlan {
    /// Network alias -> group plan.
    pub groups: BTreeMap<String, ServiceGroupPlan>,
    /// Service alias -> network alias.
    pub membership: BTreeMap<String, String>,
}

impl NetworkPlan {
    /// Network alias a service was placed in.
    #[must_use]
    pub fn network_of(&self, service: &str) -> Option<&str> {
        self.membership.get(service).map(String::as_str)
    }
}

/// The network a service joins, rejecting multi-network membership.
///
/// # Errors
///
/// Returns [`ComposeError::MultipleNetworks`] if more than one is declared.
pub fn service_network<'a>(alias: &str, service: &'a Service) -> Result<Option<&'a str>> {
    match service.networks.as_slice() {
        [] => Ok(None),
        [one] => Ok(Some(one.as_str())),
        many => Err(ComposeError::MultipleNetworks {
            service: alias.to_string(),
            count: many.len(),
        }),
    }
}

/// Listeners for one published port.
///
/// Port 443 gets `{http, tls}` plus an `{http, redirect}` listener on 80;
/// any other port gets a single `{tls}` listener.
///
/// # Errors
///
/// Returns [`ComposeError::UnsupportedProtocol`] for protocols other than
/// `tls`, `tcp` or empty.
pub fn listeners_for(alias: &str, port: &PortConfig) -> Result<Vec<Listener>> {
    match port.protocol.trim().to_ascii_lowercase().as_str() {
        "" | "tls" | "tcp" => {}
        _ => {
            return Err(ComposeError::UnsupportedProtocol {
                service: alias.to_string(),
                port: port.published,
                protocol: port.protocol.clone(),
            });
        }
    }

    if port.published == HTTPS_PORT {
        Ok(vec![
            Listener::new(HTTPS_PORT, port.target, &[Handler::Http, Handler::Tls]),
            Listener::new(HTTP_PORT, HTTPS_PORT, &[Handler::Http, Handler::Redirect]),
        ])
    } else {
        Ok(vec![Listener::new(port.published, port.target, &[Handler::Tls])])
    }
}

/// Plan the service groups of the requested services.
///
/// # Errors
///
/// Returns a configuration error for unknown aliases, multi-network services,
/// unsupported protocols or conflicting listeners.
pub fn plan_networks(project: &Project, aliases: &[String]) -> Result<NetworkPlan> {
    let mut requested = Vec::with_capacity(aliases.len());
    for alias in aliases {
        let service = project
            .services
            .get(alias)
            .ok_or_else(|| ComposeError::UnknownService(alias.clone()))?;
        requested.push((alias.as_str(), service, service_network(alias, service)?));
    }

    let synthesize_default = requested.iter().all(|(_, _, net)| net.is_none());

    let mut plan = NetworkPlan::default();
    for (alias, service, net) in requested {
        let Some(net_alias) = net.or(synthesize_default.then_some(DEFAULT_NETWORK)) else {
            continue;
        };

        let group = plan
            .groups
            .entry(net_alias.to_string())
            .or_insert_with(|| {
                let name = compose_naming::network_name(
                    &project.name,
                    net_alias,
                    project.networks.get(net_alias),
                );
                ServiceGroupPlan::new(net_alias, name)
            });

        for port in &service.ports {
            for listener in listeners_for(alias, port)? {
                group.add_listener(listener)?;
            }
        }

        if let Some(domain) = service
            .domainname
            .as_deref()
            .and_then(compose_naming::normalize_domain)
        {
            group.domains.insert(domain);
        }

        group.members.insert(alias.to_string());
        plan.membership
            .insert(alias.to_string(), net_alias.to_string());
    }

    Ok(plan)
}

/// Make sure every planned group exists, adopting same-named groups.
///
/// Groups without listeners that do not already exist are skipped.
/// Returns network alias -> remote group.
///
/// # Errors
///
/// Returns [`ComposeError::Remote`] if a lookup or creation fails.
pub async fn ensure_service_groups<P: ServiceGroupApi>(
    platform: &P,
    plan: &NetworkPlan,
) -> Result<BTreeMap<String, RemoteServiceGroup>> {
    let mut resolved = BTreeMap::new();

    for group in plan.groups.values() {
        match platform
            .get_service_group(&ResourceRef::name(&group.name))
            .await
        {
            Ok(existing) => {
                warn!(network = %group.alias, name = %existing.name, "service group already exists, adopting it");
                resolved.insert(group.alias.clone(), existing);
            }
            Err(e) if e.is_not_found() => {
                if group.listeners.is_empty() {
                    warn!(network = %group.alias, name = %group.name, "no published ports, skipping service group");
                    continue;
                }

                let created = platform
                    .create_service_group(&group.request())
                    .await
                    .map_err(|e| ComposeError::remote(ResourceKind::ServiceGroup, &group.name, e))?;
                info!(network = %group.alias, name = %created.name, uuid = %created.uuid, "created service group");
                resolved.insert(group.alias.clone(), created);
            }
            Err(e) => {
                return Err(ComposeError::remote(
                    ResourceKind::ServiceGroup,
                    &group.name,
                    e,
                ));
            }
        }
    }

    Ok(resolved)
}
