//! Shared fixtures: an in-memory platform and project builders.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use cloud_compose::cloud_client::{
    BatchItem, CloudError, CreateInstanceRequest, CreateServiceGroupRequest, CreateVolumeRequest,
    ImageApi, InstanceApi, InstanceState, RemoteImage, RemoteInstance, RemoteServiceGroup,
    RemoteVolume, ResourceKind, ResourceRef, ServiceGroupApi, VolumeApi,
};
use cloud_compose::compose_project::{PortConfig, Project, Service};

/// Everything the fake platform holds and every mutating call it received.
#[derive(Debug, Default)]
pub struct FakeState {
    pub instances: Vec<RemoteInstance>,
    pub groups: Vec<RemoteServiceGroup>,
    pub volumes: Vec<RemoteVolume>,
    pub images: BTreeSet<String>,

    pub created_instances: Vec<CreateInstanceRequest>,
    pub created_groups: Vec<CreateServiceGroupRequest>,
    pub created_volumes: Vec<CreateVolumeRequest>,
    pub started: Vec<(String, Duration)>,
    pub stopped: Vec<(String, Duration, bool)>,
    pub deleted_instances: Vec<String>,
    pub deleted_groups: Vec<String>,
    pub deleted_volumes: Vec<String>,

    /// Targets every batched call rejects.
    pub rejected: BTreeSet<String>,
    /// Lookups that fail with a platform error instead of answering.
    pub failing_lookups: Vec<(ResourceKind, String)>,
    /// Creates that fail with a platform error.
    pub failing_creates: Vec<(ResourceKind, String)>,
    /// Number of calls of any kind.
    pub calls: usize,
    next_id: usize,
}

impl FakeState {
    fn uuid(&mut self) -> String {
        self.next_id += 1;
        format!("00000000-0000-0000-0000-{:012}", self.next_id)
    }

    /// Number of create requests of any kind.
    pub fn creates(&self) -> usize {
        self.created_instances.len() + self.created_groups.len() + self.created_volumes.len()
    }

    fn batch(&self, targets: &[ResourceRef]) -> Vec<BatchItem> {
        targets
            .iter()
            .map(|t| {
                let known = self.instance_index(t).is_some();
                let rejected = self.rejected.contains(t.as_str());
                BatchItem {
                    target: t.as_str().to_string(),
                    ok: known && !rejected,
                    message: if !known {
                        Some("no such instance".into())
                    } else if rejected {
                        Some("rejected".into())
                    } else {
                        None
                    },
                }
            })
            .collect()
    }

    fn injected(
        failures: &[(ResourceKind, String)],
        kind: ResourceKind,
        name: &str,
    ) -> Result<(), CloudError> {
        if failures.iter().any(|(k, n)| *k == kind && n == name) {
            return Err(CloudError::Item {
                reference: name.to_string(),
                message: "internal error".into(),
            });
        }
        Ok(())
    }

    fn instance_index(&self, r: &ResourceRef) -> Option<usize> {
        self.instances.iter().position(|i| refers_to(r, &i.uuid, &i.name))
    }
}

fn refers_to(r: &ResourceRef, uuid: &str, name: &str) -> bool {
    match r {
        ResourceRef::Uuid(v) => v == uuid,
        ResourceRef::Name(v) => v == name,
    }
}

fn not_found(kind: ResourceKind, r: &ResourceRef) -> CloudError {
    CloudError::NotFound {
        kind,
        reference: r.to_string(),
    }
}

/// In-memory platform.
#[derive(Debug, Default)]
pub struct FakePlatform {
    state: Mutex<FakeState>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn with_image(self, image: &str) -> Self {
        self.state().images.insert(image.to_string());
        self
    }

    pub fn with_instance(self, name: &str, state: InstanceState) -> Self {
        {
            let mut s = self.state();
            let uuid = s.uuid();
            s.instances.push(RemoteInstance {
                uuid,
                name: name.to_string(),
                state,
                image: None,
                service_group: None,
            });
        }
        self
    }

    pub fn with_group(self, name: &str) -> Self {
        {
            let mut s = self.state();
            let uuid = s.uuid();
            s.groups.push(RemoteServiceGroup {
                uuid,
                name: name.to_string(),
                listeners: Vec::new(),
                domains: Vec::new(),
            });
        }
        self
    }

    pub fn with_volume(self, name: &str, size_mb: u64) -> Self {
        {
            let mut s = self.state();
            let uuid = s.uuid();
            s.volumes.push(RemoteVolume {
                uuid,
                name: name.to_string(),
                size_mb,
            });
        }
        self
    }

    pub fn rejecting(self, name: &str) -> Self {
        self.state().rejected.insert(name.to_string());
        self
    }

    /// Make every lookup of `name` fail with a platform error.
    pub fn failing_lookup(self, kind: ResourceKind, name: &str) -> Self {
        self.state().failing_lookups.push((kind, name.to_string()));
        self
    }

    /// Make every create of `name` fail with a platform error.
    pub fn failing_create(self, kind: ResourceKind, name: &str) -> Self {
        self.state().failing_creates.push((kind, name.to_string()));
        self
    }

    pub fn uuid_of_instance(&self, name: &str) -> Option<String> {
        self.state()
            .instances
            .iter()
            .find(|i| i.name == name)
            .map(|i| i.uuid.clone())
    }
}

impl InstanceApi for FakePlatform {
    async fn get_instance(&self, reference: &ResourceRef) -> Result<RemoteInstance, CloudError> {
        let mut s = self.state();
        s.calls += 1;
        FakeState::injected(&s.failing_lookups, ResourceKind::Instance, reference.as_str())?;
        s.instance_index(reference)
            .map(|i| s.instances[i].clone())
            .ok_or_else(|| not_found(ResourceKind::Instance, reference))
    }

    async fn list_instances(&self) -> Result<Vec<RemoteInstance>, CloudError> {
        let mut s = self.state();
        s.calls += 1;
        Ok(s.instances.clone())
    }

    async fn create_instance(
        &self,
        request: &CreateInstanceRequest,
    ) -> Result<RemoteInstance, CloudError> {
        let mut s = self.state();
        s.calls += 1;
        FakeState::injected(&s.failing_creates, ResourceKind::Instance, &request.name)?;
        if s.instances.iter().any(|i| i.name == request.name) {
            return Err(CloudError::Item {
                reference: request.name.clone(),
                message: "name already taken".into(),
            });
        }
        let uuid = s.uuid();
        let service_group = request.service_group.as_ref().map(|r| r.as_str().to_string());
        let created = RemoteInstance {
            uuid,
            name: request.name.clone(),
            state: InstanceState::Stopped,
            image: Some(request.image.clone()),
            service_group,
        };
        s.instances.push(created.clone());
        s.created_instances.push(request.clone());
        Ok(created)
    }

    async fn start_instances(
        &self,
        targets: &[ResourceRef],
        wait: Duration,
    ) -> Result<Vec<BatchItem>, CloudError> {
        let mut s = self.state();
        s.calls += 1;
        let items = s.batch(targets);
        for item in items.iter().filter(|i| i.ok) {
            s.started.push((item.target.clone(), wait));
            if let Some(i) = s.instance_index(&ResourceRef::name(&item.target)) {
                s.instances[i].state = InstanceState::Running;
            }
        }
        Ok(items)
    }

    async fn stop_instances(
        &self,
        targets: &[ResourceRef],
        drain: Duration,
        force: bool,
    ) -> Result<Vec<BatchItem>, CloudError> {
        let mut s = self.state();
        s.calls += 1;
        let items = s.batch(targets);
        for item in items.iter().filter(|i| i.ok) {
            s.stopped.push((item.target.clone(), drain, force));
            if let Some(i) = s.instance_index(&ResourceRef::name(&item.target)) {
                s.instances[i].state = InstanceState::Stopped;
            }
        }
        Ok(items)
    }

    async fn delete_instances(&self, targets: &[ResourceRef]) -> Result<Vec<BatchItem>, CloudError> {
        let mut s = self.state();
        s.calls += 1;
        let items = s.batch(targets);
        for item in items.iter().filter(|i| i.ok) {
            s.instances.retain(|i| i.name != item.target);
            s.deleted_instances.push(item.target.clone());
        }
        Ok(items)
    }

    async fn instance_logs(
        &self,
        reference: &ResourceRef,
        tail: Option<u32>,
    ) -> Result<String, CloudError> {
        let mut s = self.state();
        s.calls += 1;
        let i = s
            .instance_index(reference)
            .ok_or_else(|| not_found(ResourceKind::Instance, reference))?;
        let lines = tail.map_or(3, |t| t.min(3));
        Ok((0..lines)
            .map(|n| format!("{} line {n}", s.instances[i].name))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

impl ServiceGroupApi for FakePlatform {
    async fn get_service_group(
        &self,
        reference: &ResourceRef,
    ) -> Result<RemoteServiceGroup, CloudError> {
        let mut s = self.state();
        s.calls += 1;
        FakeState::injected(&s.failing_lookups, ResourceKind::ServiceGroup, reference.as_str())?;
        s.groups
            .iter()
            .find(|g| refers_to(reference, &g.uuid, &g.name))
            .cloned()
            .ok_or_else(|| not_found(ResourceKind::ServiceGroup, reference))
    }

    async fn list_service_groups(&self) -> Result<Vec<RemoteServiceGroup>, CloudError> {
        let mut s = self.state();
        s.calls += 1;
        Ok(s.groups.clone())
    }

    async fn create_service_group(
        &self,
        request: &CreateServiceGroupRequest,
    ) -> Result<RemoteServiceGroup, CloudError> {
        let mut s = self.state();
        s.calls += 1;
        FakeState::injected(&s.failing_creates, ResourceKind::ServiceGroup, &request.name)?;
        let uuid = s.uuid();
        let created = RemoteServiceGroup {
            uuid,
            name: request.name.clone(),
            listeners: request.listeners.clone(),
            domains: request.domains.clone(),
        };
        s.groups.push(created.clone());
        s.created_groups.push(request.clone());
        Ok(created)
    }

    async fn delete_service_group(&self, reference: &ResourceRef) -> Result<(), CloudError> {
        let mut s = self.state();
        s.calls += 1;
        let Some(pos) = s
            .groups
            .iter()
            .position(|g| refers_to(reference, &g.uuid, &g.name))
        else {
            return Err(not_found(ResourceKind::ServiceGroup, reference));
        };
        let group = s.groups.remove(pos);
        s.deleted_groups.push(group.name);
        Ok(())
    }
}

impl VolumeApi for FakePlatform {
    async fn get_volume(&self, reference: &ResourceRef) -> Result<RemoteVolume, CloudError> {
        let mut s = self.state();
        s.calls += 1;
        FakeState::injected(&s.failing_lookups, ResourceKind::Volume, reference.as_str())?;
        s.volumes
            .iter()
            .find(|v| refers_to(reference, &v.uuid, &v.name))
            .cloned()
            .ok_or_else(|| not_found(ResourceKind::Volume, reference))
    }

    async fn list_volumes(&self) -> Result<Vec<RemoteVolume>, CloudError> {
        let mut s = self.state();
        s.calls += 1;
        Ok(s.volumes.clone())
    }

    async fn create_volume(&self, request: &CreateVolumeRequest) -> Result<RemoteVolume, CloudError> {
        let mut s = self.state();
        s.calls += 1;
        FakeState::injected(&s.failing_creates, ResourceKind::Volume, &request.name)?;
        let uuid = s.uuid();
        let created = RemoteVolume {
            uuid,
            name: request.name.clone(),
            size_mb: request.size_mb,
        };
        s.volumes.push(created.clone());
        s.created_volumes.push(request.clone());
        Ok(created)
    }

    async fn delete_volume(&self, reference: &ResourceRef) -> Result<(), CloudError> {
        let mut s = self.state();
        s.calls += 1;
        let Some(pos) = s
            .volumes
            .iter()
            .position(|v| refers_to(reference, &v.uuid, &v.name))
        else {
            return Err(not_found(ResourceKind::Volume, reference));
        };
        let volume = s.volumes.remove(pos);
        s.deleted_volumes.push(volume.name);
        Ok(())
    }
}

impl ImageApi for FakePlatform {
    async fn get_image(&self, image: &str) -> Result<RemoteImage, CloudError> {
        let mut s = self.state();
        s.calls += 1;
        if s.images.contains(image) {
            Ok(RemoteImage {
                digest: format!("sha256:{image}"),
                tags: vec![image.to_string()],
            })
        } else {
            Err(not_found(ResourceKind::Image, &ResourceRef::name(image)))
        }
    }
}

/// Service running `image` with the given published ports.
pub fn service(image: &str, ports: &[(u16, u16)]) -> Service {
    Service {
        image: Some(image.to_string()),
        ports: ports.iter().map(|&(p, t)| PortConfig::new(p, t)).collect(),
        ..Service::default()
    }
}

/// Project `shop` with one `web` service: `nginx`, 443 -> 8080, no network.
pub fn web_project() -> Project {
    let mut project = Project::new("shop");
    project
        .services
        .insert("web".into(), service("nginx", &[(443, 8080)]));
    project
}

pub fn aliases(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| (*s).to_string()).collect()
}
