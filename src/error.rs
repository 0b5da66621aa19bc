//! Crate-wide error taxonomy.
//!
//! Configuration errors abort before any remote call is issued. Remote errors
//! carry the kind and name of the resource that failed. Adoption notices and
//! drift warnings are never errors: they are logged and processing continues.

use thiserror::Error;

use crate::cloud_client::{CloudError, ResourceKind};
use crate::compose_state::StatusStoreError;

/// Result alias used throughout the core.
pub type Result<T> = std::result::Result<T, ComposeError>;

/// Error type for reconciliation, refresh and lifecycle operations.
#[derive(Debug, Error)]
pub enum ComposeError {
    /// A service joins more than one network.
    #[error("service '{service}' declares {count} networks, at most one is supported")]
    MultipleNetworks {
        /// Service alias.
        service: String,
        /// Number of declared networks.
        count: usize,
    },

    /// A published port uses a protocol the platform cannot expose.
    #[error("service '{service}' publishes port {port} with unsupported protocol '{protocol}'")]
    UnsupportedProtocol {
        /// Service alias.
        service: String,
        /// Published port.
        port: u16,
        /// Offending protocol value.
        protocol: String,
    },

    /// A requested service alias is not declared by the project.
    #[error("no such service: {0}")]
    UnknownService(String),

    /// Two services expose the same public port of one group on different targets.
    #[error("service group '{group}' has conflicting listeners on port {port}")]
    ConflictingListener {
        /// Service group alias.
        group: String,
        /// Public port claimed twice.
        port: u16,
    },

    /// A volume `size` driver option could not be parsed.
    #[error("volume '{volume}' has invalid size '{value}': {reason}")]
    InvalidVolumeSize {
        /// Volume alias.
        volume: String,
        /// Raw option value.
        value: String,
        /// Why the value was rejected.
        reason: &'static str,
    },

    /// No image candidate exists remotely and none could be built.
    #[error("no image available for service '{service}' (tried: {tried})")]
    ImageUnavailable {
        /// Service alias.
        service: String,
        /// Candidates that were looked up, comma separated.
        tried: String,
    },

    /// A remote call failed for something other than "not found".
    #[error("{kind} '{name}': {source}")]
    Remote {
        /// Kind of resource being handled.
        kind: ResourceKind,
        /// Remote name (or reference) of the resource.
        name: String,
        /// Underlying client error.
        #[source]
        source: CloudError,
    },

    /// The build collaborator failed.
    #[error("build failed for service '{service}': {reason}")]
    Build {
        /// Service alias.
        service: String,
        /// Collaborator-provided reason.
        reason: String,
    },

    /// Reading or writing the local status snapshot failed.
    #[error(transparent)]
    Store(#[from] StatusStoreError),
}

impl ComposeError {
    /// Wrap a client error with the resource it concerns.
    pub fn remote(kind: ResourceKind, name: impl Into<String>, source: CloudError) -> Self {
        Self::Remote {
            kind,
            name: name.into(),
            source,
        }
    }

    /// Whether the user has to fix the project description.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::MultipleNetworks { .. }
                | Self::UnsupportedProtocol { .. }
                | Self::UnknownService(_)
                | Self::ConflictingListener { .. }
                | Self::InvalidVolumeSize { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_error_names_kind_and_resource() {
        let err = ComposeError::remote(
            ResourceKind::Volume,
            "shop-data",
            CloudError::Item {
                reference: "shop-data".into(),
                message: "quota exceeded".into(),
            },
        );
        let msg = err.to_string();
        assert!(msg.starts_with("volume 'shop-data'"), "{msg}");
        assert!(!err.is_configuration());
    }

    #[test]
    fn configuration_errors_are_classified() {
        assert!(ComposeError::UnknownService("db".into()).is_configuration());
        assert!(
            ComposeError::MultipleNetworks {
                service: "web".into(),
                count: 2
            }
            .is_configuration()
        );
    }
}
