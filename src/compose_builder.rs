//! Build and package collaborator.
//!
//! Turning source into a deployable image is not done here. The reconciler
//! only asks an [`ImageBuilder`] for an image when no candidate exists in the
//! remote catalog.

use std::path::PathBuf;

use thiserror::Error;

/// What the reconciler asks the builder for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    /// Service alias being built.
    pub service: String,
    /// Target image name (`name:tag`).
    pub image: String,
    /// Build working directory.
    pub workdir: PathBuf,
    /// Dockerfile, if the context provides one.
    pub dockerfile: Option<PathBuf>,
    /// Runtime override for this service (`--runtime <service>=<ref>`).
    pub runtime: Option<String>,
    /// Push the result to the remote catalog.
    pub push: bool,
}

/// Result of a build attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    /// Built; content-addressed image reference.
    Built(String),
    /// Nothing to build from. Not fatal.
    NotBuildable,
}

/// Failure reported by a builder.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct BuildError(pub String);

/// Build/package pipeline seam.
#[allow(async_fn_in_trait)]
pub trait ImageBuilder {
    /// Build and package an image for one service.
    async fn build(&self, request: &BuildRequest) -> Result<BuildOutcome, BuildError>;
}

/// Builder used when no packaging pipeline is wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBuilder;

impl ImageBuilder for NoBuilder {
    async fn build(&self, _request: &BuildRequest) -> Result<BuildOutcome, BuildError> {
        Ok(BuildOutcome::NotBuildable)
    }
}
