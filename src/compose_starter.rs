//! Lifecycle driver (start/stop/logs/down).
//!
//! Unique responsibility: drive already-reconciled instances through their
//! lifecycle, and tear a project down on request.
//!
//! Start and stop are sent as one batched call. A target the platform
//! rejects is logged and reported; it never blocks its siblings. Only a
//! failure of the batched call itself is an error.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::cloud_client::{BatchItem, CloudError, CloudPlatform, ResourceKind, ResourceRef};
use crate::compose_naming;
use crate::compose_project::Project;
use crate::compose_state::{ProjectStatus, now_unix_ms};
use crate::error::{ComposeError, Result};

/// A target the platform rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// Target name.
    pub name: String,
    /// Platform message.
    pub reason: String,
}

/// Per-target outcome of a fan-out operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LifecycleReport {
    /// Targets the platform accepted.
    pub succeeded: Vec<String>,
    /// Targets the platform rejected.
    pub failed: Vec<Failure>,
}

impl LifecycleReport {
    fn accept(&mut self, name: String) {
        self.succeeded.push(name);
    }

    fn reject(&mut self, action: &'static str, name: String, reason: String) {
        warn!(target_name = %name, %reason, "{action} failed");
        self.failed.push(Failure { name, reason });
    }

    fn absorb(&mut self, action: &'static str, items: Vec<BatchItem>) {
        for item in items {
            if item.ok {
                self.accept(item.target);
            } else {
                let reason = item.message.unwrap_or_else(|| "rejected".to_string());
                self.reject(action, item.target, reason);
            }
        }
    }

    /// Whether every target succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Console output of one instance.
#[derive(Debug)]
pub struct InstanceLogs {
    /// Instance name.
    pub name: String,
    /// Output, or why it could not be fetched.
    pub output: std::result::Result<String, CloudError>,
}

/// Outcome of a teardown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    /// Instance deletions.
    pub instances: LifecycleReport,
    /// Service group deletions.
    pub service_groups: LifecycleReport,
    /// Volume deletions (empty unless requested).
    pub volumes: LifecycleReport,
}

/// Resolve service aliases to instance names.
///
/// An empty selection means every instance the project owns.
///
/// # Errors
///
/// Returns [`ComposeError::UnknownService`] for an alias the project does not
/// declare.
pub fn target_names(project: &Project, status: &ProjectStatus, aliases: &[String]) -> Result<Vec<String>> {
    if aliases.is_empty() {
        return Ok(status.instance_names());
    }
    aliases
        .iter()
        .map(|alias| {
            project
                .services
                .get(alias)
                .map(|service| compose_naming::instance_name(&project.name, alias, service))
                .ok_or_else(|| ComposeError::UnknownService(alias.clone()))
        })
        .collect()
}

/// Start/stop/logs/down over named instances.
pub struct LifecycleDriver<'a, P> {
    platform: &'a P,
}

impl<'a, P: CloudPlatform> LifecycleDriver<'a, P> {
    /// Create a driver over the given platform.
    #[must_use]
    pub const fn new(platform: &'a P) -> Self {
        Self { platform }
    }

    /// Start instances. A zero `wait` does not wait for readiness; a positive
    /// one asks the platform to hold the call for at most that long.
    ///
    /// # Errors
    ///
    /// Returns [`ComposeError::Remote`] if the batched call fails.
    pub async fn start(&self, names: &[String], wait: Duration) -> Result<LifecycleReport> {
        if names.is_empty() {
            debug!("nothing to start");
            return Ok(LifecycleReport::default());
        }
        let targets = refs(names);
        let items = self
            .platform
            .start_instances(&targets, wait)
            .await
            .map_err(|e| ComposeError::remote(ResourceKind::Instance, names.join(","), e))?;

        let mut report = LifecycleReport::default();
        report.absorb("start", items);
        info!(started = report.succeeded.len(), failed = report.failed.len(), ?wait, "start finished");
        Ok(report)
    }

    /// Stop instances, draining connections for up to `drain`.
    ///
    /// # Errors
    ///
    /// Returns [`ComposeError::Remote`] if the batched call fails.
    pub async fn stop(&self, names: &[String], drain: Duration, force: bool) -> Result<LifecycleReport> {
        if names.is_empty() {
            debug!("nothing to stop");
            return Ok(LifecycleReport::default());
        }
        let targets = refs(names);
        let items = self
            .platform
            .stop_instances(&targets, drain, force)
            .await
            .map_err(|e| ComposeError::remote(ResourceKind::Instance, names.join(","), e))?;

        let mut report = LifecycleReport::default();
        report.absorb("stop", items);
        info!(stopped = report.succeeded.len(), failed = report.failed.len(), force, "stop finished");
        Ok(report)
    }

    /// Fetch console output of each instance. One failing instance does not
    /// block the others.
    pub async fn logs(&self, names: &[String], tail: Option<u32>) -> Vec<InstanceLogs> {
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            let output = self.platform.instance_logs(&ResourceRef::name(name), tail).await;
            if let Err(e) = &output {
                warn!(instance = %name, error = %e, "failed to fetch logs");
            }
            out.push(InstanceLogs {
                name: name.clone(),
                output,
            });
        }
        out
    }

    /// Tear down what `status` owns: force-stop and delete its instances, then
    /// delete its service groups, then (if asked) the project's volumes.
    ///
    /// `status` should be freshly refreshed. Deleted entries are removed from it.
    ///
    /// # Errors
    ///
    /// Returns [`ComposeError::Remote`] if a batched instance call fails.
    /// Per-target failures are only reported.
    pub async fn down(
        &self,
        project: &Project,
        status: &mut ProjectStatus,
        remove_volumes: bool,
    ) -> Result<TeardownReport> {
        let mut report = TeardownReport::default();

        let names = status.instance_names();
        if !names.is_empty() {
            let stopped = self.stop(&names, Duration::ZERO, true).await?;
            for failure in &stopped.failed {
                debug!(instance = %failure.name, "continuing teardown after stop failure");
            }

            let items = self
                .platform
                .delete_instances(&refs(&names))
                .await
                .map_err(|e| ComposeError::remote(ResourceKind::Instance, names.join(","), e))?;
            report.instances.absorb("delete instance", items);
            status.forget_instances(&report.instances.succeeded, now_unix_ms());
        }

        for entry in status.networks.clone() {
            match self.platform.delete_service_group(&entry.reference()).await {
                Ok(()) => {
                    info!(service_group = %entry.name, "deleted service group");
                    report.service_groups.accept(entry.name);
                }
                Err(e) => report
                    .service_groups
                    .reject("delete service group", entry.name, e.to_string()),
            }
        }
        status.forget_networks(&report.service_groups.succeeded, now_unix_ms());

        if remove_volumes {
            let mut aliases: Vec<&String> = project.volumes.keys().collect();
            aliases.sort();
            for alias in aliases {
                let name = compose_naming::volume_name(&project.name, alias, &project.volumes[alias]);
                match self.platform.delete_volume(&ResourceRef::name(&name)).await {
                    Ok(()) => {
                        info!(volume = %alias, %name, "deleted volume");
                        report.volumes.accept(name);
                    }
                    Err(e) if e.is_not_found() => debug!(volume = %alias, %name, "volume already gone"),
                    Err(e) => report.volumes.reject("delete volume", name, e.to_string()),
                }
            }
        }

        Ok(report)
    }
}

fn refs(names: &[String]) -> Vec<ResourceRef> {
    names.iter().map(ResourceRef::name).collect()
}
