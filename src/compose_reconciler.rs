//! Resource reconciler.
//!
//! High-level create-or-adopt orchestration of a whole project:
//! 1. Plan service groups for the requested services (pure, validates config)
//! 2. Ensure service groups exist
//! 3. Ensure project volumes exist
//! 4. Per service: resolve the image, then create or adopt the instance
//!
//! Groups and volumes always exist before the instances that reference them.
//! Nothing pre-existing is ever deleted or mutated: every resource is looked
//! up by name first and adopted when present, so running twice against an
//! unchanged project only issues lookups. A failure aborts the run without
//! rollback; whatever was created is adopted on retry.

use std::{collections::BTreeMap, env};

use tracing::{debug, info};

use crate::cloud_client::{
    CloudPlatform, CreateInstanceRequest, RemoteInstance, RemoteServiceGroup, RemoteVolume,
    ResourceKind, ResourceRef, VolumeAttachment,
};
use crate::compose_builder::{BuildOutcome, BuildRequest, ImageBuilder};
use crate::compose_naming;
use crate::compose_planner::{self, NetworkPlan};
use crate::compose_project::{Project, Service};
use crate::compose_provisioner::{self, VolumeProvisioner};
use crate::error::{ComposeError, Result};

const MIB: u64 = 1024 * 1024;

/// Configuration for the reconciler.
#[derive(Clone, Debug, Default)]
pub struct ReconcilerConfig {
    /// Never call the build collaborator.
    /// Env: `COMPOSE_NO_BUILD` (default: false)
    pub no_build: bool,

    /// Ask the build collaborator to push what it builds.
    /// Env: `COMPOSE_PUSH` (default: false)
    pub push: bool,

    /// Service alias -> runtime reference handed to the builder.
    pub runtimes: BTreeMap<String, String>,

    /// Prefix for synthesized image names, e.g. a catalog user.
    /// Env: `COMPOSE_IMAGE_NAMESPACE` (optional)
    pub image_namespace: Option<String>,
}

impl ReconcilerConfig {
    /// Load configuration from environment variables.
    ///
    /// Runtimes are never read from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        Self {
            no_build: parse_bool_env("COMPOSE_NO_BUILD", false),
            push: parse_bool_env("COMPOSE_PUSH", false),
            runtimes: BTreeMap::new(),
            image_namespace: env::var("COMPOSE_IMAGE_NAMESPACE")
                .ok()
                .filter(|s| !s.trim().is_empty()),
        }
    }
}

/// What a reconciliation resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Created or adopted instances, in request order.
    pub instances: Vec<RemoteInstance>,
    /// Network alias -> created or adopted service group.
    pub service_groups: BTreeMap<String, RemoteServiceGroup>,
    /// Volume alias -> created or adopted volume.
    pub volumes: BTreeMap<String, RemoteVolume>,
}

/// Reconciler turning a project into remote resources.
pub struct Reconciler<'a, P, B> {
    cfg: ReconcilerConfig,
    platform: &'a P,
    builder: &'a B,
}

impl<'a, P: CloudPlatform, B: ImageBuilder> Reconciler<'a, P, B> {
    /// Create a reconciler over the given platform and build collaborator.
    #[must_use]
    pub const fn new(cfg: ReconcilerConfig, platform: &'a P, builder: &'a B) -> Self {
        Self {
            cfg,
            platform,
            builder,
        }
    }

    /// Get a reference to the current configuration.
    #[must_use]
    pub const fn config(&self) -> &ReconcilerConfig {
        &self.cfg
    }

    /// Reconcile the requested services (all of them when `aliases` is empty).
    ///
    /// Resolved image references are written back into `project`.
    ///
    /// # Errors
    ///
    /// Configuration errors are returned before any remote call. Remote
    /// failures abort the run and name the resource kind and name.
    pub async fn reconcile(
        &self,
        project: &mut Project,
        aliases: &[String],
    ) -> Result<Reconciliation> {
        let aliases = project.select(aliases);

        let plan = compose_planner::plan_networks(project, &aliases)?;
        for (alias, volume) in &project.volumes {
            compose_provisioner::volume_size_mb(alias, volume)?;
        }

        let service_groups = compose_planner::ensure_service_groups(self.platform, &plan).await?;
        let volumes = VolumeProvisioner::new(self.platform)
            .ensure_volumes(project)
            .await?;

        let mut instances = Vec::with_capacity(aliases.len());
        for alias in &aliases {
            let image = self.resolve_image(project, alias).await?;
            if let Some(service) = project.services.get_mut(alias) {
                service.image = Some(image.clone());
            }

            let instance = self
                .ensure_instance(project, alias, &image, &plan, &service_groups, &volumes)
                .await?;
            instances.push(instance);
        }

        Ok(Reconciliation {
            instances,
            service_groups,
            volumes,
        })
    }

    /// Resolve the image a service runs.
    ///
    /// Candidates, first hit in the remote catalog wins: the configured image
    /// (tag defaulted to `latest`), then a name synthesized from project and
    /// service. When none exists the build collaborator is asked, unless
    /// building is disabled.
    ///
    /// # Errors
    ///
    /// Returns [`ComposeError::ImageUnavailable`] when nothing can be found or
    /// built, [`ComposeError::Build`] when the builder fails, and
    /// [`ComposeError::Remote`] when a catalog lookup fails.
    pub async fn resolve_image(&self, project: &Project, alias: &str) -> Result<String> {
        let service = lookup(project, alias)?;
        let synthesized = compose_naming::synthesized_image(
            &project.name,
            alias,
            self.cfg.image_namespace.as_deref(),
        );

        let mut candidates = Vec::with_capacity(2);
        if let Some(image) = service.image.as_deref().filter(|s| !s.trim().is_empty()) {
            candidates.push(compose_naming::with_default_tag(image.trim()));
        }
        if !candidates.contains(&synthesized) {
            candidates.push(synthesized.clone());
        }

        for candidate in &candidates {
            match self.platform.get_image(candidate).await {
                Ok(found) => {
                    debug!(service = %alias, image = %candidate, digest = %found.digest, "image found");
                    return Ok(candidate.clone());
                }
                Err(e) if e.is_not_found() => {
                    debug!(service = %alias, image = %candidate, "image not in catalog");
                }
                Err(e) => return Err(ComposeError::remote(ResourceKind::Image, candidate, e)),
            }
        }

        if !self.cfg.no_build
            && let Some(build) = &service.build
        {
            let request = BuildRequest {
                service: alias.to_string(),
                image: synthesized,
                workdir: build.context.clone(),
                dockerfile: build.dockerfile.clone(),
                runtime: self.cfg.runtimes.get(alias).cloned(),
                push: self.cfg.push,
            };
            info!(service = %alias, workdir = %request.workdir.display(), "building image");
            match self.builder.build(&request).await {
                Ok(BuildOutcome::Built(image)) => return Ok(image),
                Ok(BuildOutcome::NotBuildable) => {
                    debug!(service = %alias, "build context is not buildable");
                }
                Err(e) => {
                    return Err(ComposeError::Build {
                        service: alias.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        Err(ComposeError::ImageUnavailable {
            service: alias.to_string(),
            tried: candidates.join(", "),
        })
    }

    async fn ensure_instance(
        &self,
        project: &Project,
        alias: &str,
        image: &str,
        plan: &NetworkPlan,
        service_groups: &BTreeMap<String, RemoteServiceGroup>,
        volumes: &BTreeMap<String, RemoteVolume>,
    ) -> Result<RemoteInstance> {
        let service = lookup(project, alias)?;
        let name = compose_naming::instance_name(&project.name, alias, service);

        match self.platform.get_instance(&ResourceRef::name(&name)).await {
            Ok(existing) => {
                info!(service = %alias, name = %existing.name, state = %existing.state, "instance already exists");
                return Ok(existing);
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(ComposeError::remote(ResourceKind::Instance, &name, e)),
        }

        let service_group = plan
            .network_of(alias)
            .and_then(|network| service_groups.get(network))
            .map(|group| ResourceRef::uuid(&group.uuid));

        let request = CreateInstanceRequest {
            name: name.clone(),
            image: image.to_string(),
            memory_mb: memory_mb(service),
            args: service
                .entrypoint
                .iter()
                .chain(&service.command)
                .cloned()
                .collect(),
            env: resolve_environment(alias, service),
            volumes: attachments(alias, service, volumes),
            service_group,
            autostart: false,
        };

        let created = self
            .platform
            .create_instance(&request)
            .await
            .map_err(|e| ComposeError::remote(ResourceKind::Instance, &name, e))?;
        info!(service = %alias, name = %created.name, uuid = %created.uuid, "created instance");

        Ok(created)
    }
}

/// Memory in megabytes; the limit is preferred over the reservation.
#[must_use]
pub fn memory_mb(service: &Service) -> Option<u64> {
    service
        .mem_limit
        .or(service.mem_reservation)
        .map(|bytes| bytes / MIB)
        .filter(|mb| *mb > 0)
}

/// Environment for a new instance.
///
/// Empty values are read from the local process environment now, not when
/// the project was loaded. Variables unset locally are left out.
#[must_use]
pub fn resolve_environment(alias: &str, service: &Service) -> BTreeMap<String, String> {
    service
        .environment
        .iter()
        .filter_map(|(key, value)| {
            if !value.is_empty() {
                return Some((key.clone(), value.clone()));
            }
            if let Ok(inherited) = env::var(key) {
                Some((key.clone(), inherited))
            } else {
                debug!(service = %alias, variable = %key, "not set locally, skipping");
                None
            }
        })
        .collect()
}

/// Volume attachments; mounts of unknown volume aliases are skipped.
#[must_use]
pub fn attachments(
    alias: &str,
    service: &Service,
    volumes: &BTreeMap<String, RemoteVolume>,
) -> Vec<VolumeAttachment> {
    service
        .volumes
        .iter()
        .filter_map(|mount| {
            let Some(volume) = volumes.get(&mount.source) else {
                debug!(service = %alias, volume = %mount.source, "unresolved volume, skipping mount");
                return None;
            };
            Some(VolumeAttachment {
                uuid: volume.uuid.clone(),
                at: mount.target.clone(),
            })
        })
        .collect()
}

fn lookup<'p>(project: &'p Project, alias: &str) -> Result<&'p Service> {
    project
        .services
        .get(alias)
        .ok_or_else(|| ComposeError::UnknownService(alias.to_string()))
}

fn parse_bool_env(key: &'static str, default: bool) -> bool {
    env::var(key).map_or(default, |v| {
        matches!(v.to_lowercase().as_str(), "true" | "1" | "yes")
    })
}
