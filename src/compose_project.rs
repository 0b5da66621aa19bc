//! In-memory project model.
//!
//! The project description is parsed elsewhere; this module only holds the
//! already-normalised result. Collections are keyed by alias and unordered:
//! nothing derived from a project may depend on map iteration order.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A multi-service deployment description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Project name, used as namespace prefix for every remote resource.
    pub name: String,
    /// Service alias -> service.
    #[serde(default)]
    pub services: HashMap<String, Service>,
    /// Network alias -> network.
    #[serde(default)]
    pub networks: HashMap<String, Network>,
    /// Volume alias -> volume.
    #[serde(default)]
    pub volumes: HashMap<String, Volume>,
}

impl Project {
    /// Create an empty project.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Service aliases in stable (sorted) order, for deterministic logging.
    #[must_use]
    pub fn service_aliases(&self) -> Vec<String> {
        let mut aliases: Vec<String> = self.services.keys().cloned().collect();
        aliases.sort();
        aliases
    }

    /// Expand an empty alias selection to every service.
    #[must_use]
    pub fn select(&self, aliases: &[String]) -> Vec<String> {
        if aliases.is_empty() {
            self.service_aliases()
        } else {
            aliases.to_vec()
        }
    }
}

/// One declared service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    /// Service name as written in the description.
    #[serde(default)]
    pub name: String,
    /// Explicit remote instance name.
    #[serde(default)]
    pub container_name: Option<String>,
    /// Build context, if the service can be built from source.
    #[serde(default)]
    pub build: Option<BuildContext>,
    /// Image reference; filled in by the reconciler once resolved.
    #[serde(default)]
    pub image: Option<String>,
    /// Entrypoint override.
    #[serde(default)]
    pub entrypoint: Vec<String>,
    /// Command arguments.
    #[serde(default)]
    pub command: Vec<String>,
    /// Environment; an empty value inherits from the local environment.
    #[serde(default)]
    pub environment: HashMap<String, String>,
    /// Memory limit in bytes.
    #[serde(default)]
    pub mem_limit: Option<u64>,
    /// Memory reservation in bytes.
    #[serde(default)]
    pub mem_reservation: Option<u64>,
    /// Published ports.
    #[serde(default)]
    pub ports: Vec<PortConfig>,
    /// Domain name to bind on the service group.
    #[serde(default)]
    pub domainname: Option<String>,
    /// Volume mounts.
    #[serde(default)]
    pub volumes: Vec<VolumeMount>,
    /// Network aliases this service joins (at most one is accepted).
    #[serde(default)]
    pub networks: Vec<String>,
}

/// Where and how a service is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildContext {
    /// Working directory of the build.
    pub context: PathBuf,
    /// Dockerfile relative to the context, if any.
    #[serde(default)]
    pub dockerfile: Option<PathBuf>,
}

/// A published port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortConfig {
    /// Publicly exposed port.
    pub published: u16,
    /// Port inside the instance.
    pub target: u16,
    /// Protocol: `tls`, `tcp` or empty.
    #[serde(default)]
    pub protocol: String,
}

impl PortConfig {
    /// Port published as-is with an empty protocol.
    #[must_use]
    pub const fn new(published: u16, target: u16) -> Self {
        Self {
            published,
            target,
            protocol: String::new(),
        }
    }
}

/// Mount of a project volume into a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    /// Volume alias.
    pub source: String,
    /// Mount path inside the instance.
    pub target: String,
}

/// A declared network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    /// Explicit network name; derived from project and alias when absent.
    #[serde(default)]
    pub name: Option<String>,
}

/// A declared volume.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    /// Explicit volume name; derived from project and alias when absent.
    #[serde(default)]
    pub name: Option<String>,
    /// Driver options; `size` carries a human-readable byte string.
    #[serde(default)]
    pub driver_opts: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_selection_means_every_service_sorted() {
        let mut project = Project::new("shop");
        project.services.insert("web".into(), Service::default());
        project.services.insert("api".into(), Service::default());

        assert_eq!(project.select(&[]), vec!["api".to_string(), "web".to_string()]);
        assert_eq!(project.select(&["web".to_string()]), vec!["web".to_string()]);
    }

    #[test]
    fn deserializes_minimal_yaml() {
        let yaml = r"
name: shop
services:
  web:
    image: nginx
    ports:
      - { published: 443, target: 8080 }
volumes:
  data:
    driver_opts: { size: 512MB }
";
        let project: Project = serde_yaml::from_str(yaml).unwrap();
        let web = &project.services["web"];
        assert_eq!(web.image.as_deref(), Some("nginx"));
        assert_eq!(web.ports, vec![PortConfig::new(443, 8080)]);
        assert_eq!(project.volumes["data"].driver_opts["size"], "512MB");
    }
}
