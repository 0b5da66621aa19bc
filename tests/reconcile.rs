mod common;

use std::collections::BTreeSet;

use cloud_compose::cloud_client::{Handler, InstanceState, Listener, ResourceKind, ResourceRef};
use cloud_compose::compose_builder::{BuildError, BuildOutcome, BuildRequest, ImageBuilder};
use cloud_compose::compose_project::{BuildContext, Network, Volume, VolumeMount};
use cloud_compose::{ComposeError, NoBuilder, Reconciler, ReconcilerConfig};
use common::{FakePlatform, aliases, service, web_project};

#[tokio::test]
async fn web_service_gets_default_group_and_bound_instance() {
    let platform = FakePlatform::new().with_image("nginx:latest");
    let reconciler = Reconciler::new(ReconcilerConfig::default(), &platform, &NoBuilder);
    let mut project = web_project();

    let done = reconciler
        .reconcile(&mut project, &aliases(&["web"]))
        .await
        .unwrap();

    let state = platform.state();
    assert_eq!(state.created_groups.len(), 1);
    let group = &state.created_groups[0];
    assert_eq!(group.name, "shop-default");
    assert_eq!(
        group.listeners.iter().cloned().collect::<BTreeSet<_>>(),
        BTreeSet::from([
            Listener::new(443, 8080, &[Handler::Http, Handler::Tls]),
            Listener::new(80, 443, &[Handler::Http, Handler::Redirect]),
        ])
    );

    assert_eq!(state.created_instances.len(), 1);
    let request = &state.created_instances[0];
    assert_eq!(request.name, "shop-web");
    assert_eq!(request.image, "nginx:latest");
    assert!(!request.autostart);

    let group_uuid = &done.service_groups["default"].uuid;
    assert_eq!(request.service_group, Some(ResourceRef::uuid(group_uuid)));
    assert_eq!(done.instances.len(), 1);
    assert_eq!(done.instances[0].name, "shop-web");

    assert_eq!(
        project.services["web"].image.as_deref(),
        Some("nginx:latest")
    );
}

#[tokio::test]
async fn second_run_only_reads() {
    let platform = FakePlatform::new().with_image("nginx:latest");
    let reconciler = Reconciler::new(ReconcilerConfig::default(), &platform, &NoBuilder);
    let mut project = web_project();
    project.volumes.insert("data".into(), Volume::default());

    let first = reconciler.reconcile(&mut project, &[]).await.unwrap();
    let creates = platform.state().creates();
    assert_eq!(creates, 3);

    let second = reconciler.reconcile(&mut project, &[]).await.unwrap();
    assert_eq!(platform.state().creates(), creates);
    assert_eq!(first, second);
}

#[tokio::test]
async fn existing_instance_is_adopted() {
    let platform = FakePlatform::new()
        .with_image("nginx:latest")
        .with_group("shop-default")
        .with_instance("shop-web", InstanceState::Running);
    let reconciler = Reconciler::new(ReconcilerConfig::default(), &platform, &NoBuilder);

    let done = reconciler
        .reconcile(&mut web_project(), &aliases(&["web"]))
        .await
        .unwrap();

    assert_eq!(platform.state().creates(), 0);
    assert_eq!(done.instances.len(), 1);
    assert_eq!(done.instances[0].state, InstanceState::Running);
    assert_eq!(
        Some(done.instances[0].uuid.clone()),
        platform.uuid_of_instance("shop-web")
    );
}

#[tokio::test]
async fn container_name_overrides_derived_name() {
    let platform = FakePlatform::new().with_image("nginx:latest");
    let reconciler = Reconciler::new(ReconcilerConfig::default(), &platform, &NoBuilder);
    let mut project = web_project();
    if let Some(web) = project.services.get_mut("web") {
        web.container_name = Some("front_door".into());
    }

    let done = reconciler.reconcile(&mut project, &[]).await.unwrap();
    assert_eq!(done.instances[0].name, "front-door");
}

fn worker_project() -> cloud_compose::Project {
    let mut project = cloud_compose::Project::new("shop");
    project
        .services
        .insert("worker".into(), service("busybox", &[]));
    project
}

#[tokio::test]
async fn service_without_ports_gets_no_group() {
    let platform = FakePlatform::new().with_image("busybox:latest");
    let reconciler = Reconciler::new(ReconcilerConfig::default(), &platform, &NoBuilder);

    let done = reconciler
        .reconcile(&mut worker_project(), &[])
        .await
        .unwrap();

    assert!(done.service_groups.is_empty());
    let state = platform.state();
    assert!(state.created_groups.is_empty());
    assert_eq!(state.created_instances.len(), 1);
    assert_eq!(state.created_instances[0].name, "shop-worker");
    assert_eq!(state.created_instances[0].service_group, None);
}

#[tokio::test]
async fn existing_group_without_listeners_is_adopted() {
    let platform = FakePlatform::new()
        .with_image("busybox:latest")
        .with_group("shop-default");
    let group_uuid = platform.state().groups[0].uuid.clone();
    let reconciler = Reconciler::new(ReconcilerConfig::default(), &platform, &NoBuilder);

    let done = reconciler
        .reconcile(&mut worker_project(), &[])
        .await
        .unwrap();

    assert_eq!(done.service_groups["default"].uuid, group_uuid);
    let state = platform.state();
    assert!(state.created_groups.is_empty());
    assert_eq!(
        state.created_instances[0].service_group,
        Some(ResourceRef::uuid(&group_uuid))
    );
}

#[tokio::test]
async fn failed_volume_lookup_stops_before_instances() {
    let platform = FakePlatform::new()
        .with_image("nginx:latest")
        .failing_lookup(ResourceKind::Volume, "shop-data");
    let reconciler = Reconciler::new(ReconcilerConfig::default(), &platform, &NoBuilder);
    let mut project = web_project();
    project.volumes.insert("data".into(), Volume::default());

    let err = reconciler.reconcile(&mut project, &[]).await.unwrap_err();

    assert!(matches!(
        err,
        ComposeError::Remote { kind: ResourceKind::Volume, ref name, .. } if name == "shop-data"
    ));
    assert!(!err.is_configuration());
    let state = platform.state();
    assert!(state.created_volumes.is_empty());
    assert!(state.created_instances.is_empty());
}

#[tokio::test]
async fn failed_instance_create_names_the_instance() {
    let platform = FakePlatform::new()
        .with_image("nginx:latest")
        .failing_create(ResourceKind::Instance, "shop-web");
    let reconciler = Reconciler::new(ReconcilerConfig::default(), &platform, &NoBuilder);

    let err = reconciler
        .reconcile(&mut web_project(), &[])
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ComposeError::Remote { kind: ResourceKind::Instance, ref name, .. } if name == "shop-web"
    ));
    // The group created earlier stays; the next run adopts it.
    assert_eq!(platform.state().created_groups.len(), 1);
}

#[tokio::test]
async fn multi_network_service_fails_before_any_remote_call() {
    let platform = FakePlatform::new().with_image("nginx:latest");
    let reconciler = Reconciler::new(ReconcilerConfig::default(), &platform, &NoBuilder);
    let mut project = web_project();
    project.networks.insert("front".into(), Network::default());
    project.networks.insert("back".into(), Network::default());
    if let Some(web) = project.services.get_mut("web") {
        web.networks = vec!["front".into(), "back".into()];
    }

    let err = reconciler.reconcile(&mut project, &[]).await.unwrap_err();
    assert!(matches!(err, ComposeError::MultipleNetworks { count: 2, .. }));
    assert!(err.is_configuration());
    assert_eq!(platform.state().calls, 0);
}

#[tokio::test]
async fn unknown_service_is_rejected() {
    let platform = FakePlatform::new();
    let reconciler = Reconciler::new(ReconcilerConfig::default(), &platform, &NoBuilder);

    let err = reconciler
        .reconcile(&mut web_project(), &aliases(&["api"]))
        .await
        .unwrap_err();
    assert!(matches!(err, ComposeError::UnknownService(ref s) if s == "api"));
    assert_eq!(platform.state().calls, 0);
}

#[tokio::test]
async fn volumes_are_sized_and_attached() {
    let platform = FakePlatform::new().with_image("nginx:latest");
    let reconciler = Reconciler::new(ReconcilerConfig::default(), &platform, &NoBuilder);
    let mut project = web_project();
    let mut data = Volume::default();
    data.driver_opts.insert("size".into(), "512MB".into());
    project.volumes.insert("data".into(), data);
    project.volumes.insert("cache".into(), Volume::default());
    if let Some(web) = project.services.get_mut("web") {
        web.volumes = vec![
            VolumeMount {
                source: "data".into(),
                target: "/var/lib/data".into(),
            },
            VolumeMount {
                source: "missing".into(),
                target: "/nowhere".into(),
            },
        ];
    }

    let done = reconciler.reconcile(&mut project, &[]).await.unwrap();

    let state = platform.state();
    let sizes: BTreeSet<(String, u64)> = state
        .created_volumes
        .iter()
        .map(|v| (v.name.clone(), v.size_mb))
        .collect();
    assert_eq!(
        sizes,
        BTreeSet::from([("shop-data".to_string(), 512), ("shop-cache".to_string(), 64)])
    );

    let mounts = &state.created_instances[0].volumes;
    assert_eq!(mounts.len(), 1);
    assert_eq!(mounts[0].uuid, done.volumes["data"].uuid);
    assert_eq!(mounts[0].at, "/var/lib/data");
}

#[tokio::test]
async fn invalid_volume_size_fails_before_any_remote_call() {
    let platform = FakePlatform::new().with_image("nginx:latest");
    let reconciler = Reconciler::new(ReconcilerConfig::default(), &platform, &NoBuilder);
    let mut project = web_project();
    let mut data = Volume::default();
    data.driver_opts.insert("size".into(), "huge".into());
    project.volumes.insert("data".into(), data);

    let err = reconciler.reconcile(&mut project, &[]).await.unwrap_err();
    assert!(matches!(err, ComposeError::InvalidVolumeSize { .. }));
    assert_eq!(platform.state().calls, 0);
}

#[tokio::test]
async fn synthesized_image_is_used_when_configured_one_is_missing() {
    let platform = FakePlatform::new().with_image("team/shop-web:latest");
    let cfg = ReconcilerConfig {
        image_namespace: Some("team".into()),
        ..ReconcilerConfig::default()
    };
    let reconciler = Reconciler::new(cfg, &platform, &NoBuilder);

    let image = reconciler
        .resolve_image(&web_project(), "web")
        .await
        .unwrap();
    assert_eq!(image, "team/shop-web:latest");
}

#[tokio::test]
async fn missing_image_without_build_context_is_an_error() {
    let platform = FakePlatform::new();
    let reconciler = Reconciler::new(ReconcilerConfig::default(), &platform, &NoBuilder);

    let err = reconciler
        .reconcile(&mut web_project(), &[])
        .await
        .unwrap_err();
    assert!(matches!(err, ComposeError::ImageUnavailable { ref service, .. } if service == "web"));
    assert!(platform.state().created_instances.is_empty());
}

struct RecordingBuilder;

impl ImageBuilder for RecordingBuilder {
    async fn build(&self, request: &BuildRequest) -> Result<BuildOutcome, BuildError> {
        Ok(BuildOutcome::Built(format!(
            "{}@sha256:{}",
            request.image,
            request.runtime.as_deref().unwrap_or("none")
        )))
    }
}

fn buildable_project() -> cloud_compose::Project {
    let mut project = cloud_compose::Project::new("shop");
    let mut api = service("", &[(8443, 8080)]);
    api.image = None;
    api.build = Some(BuildContext {
        context: "./api".into(),
        dockerfile: None,
    });
    project.services.insert("api".into(), api);
    project
}

#[tokio::test]
async fn builder_runs_when_no_image_exists() {
    let platform = FakePlatform::new();
    let mut cfg = ReconcilerConfig::default();
    cfg.runtimes.insert("api".into(), "rust".into());
    let reconciler = Reconciler::new(cfg, &platform, &RecordingBuilder);

    let mut project = buildable_project();
    reconciler.reconcile(&mut project, &[]).await.unwrap();

    assert_eq!(
        platform.state().created_instances[0].image,
        "shop-api:latest@sha256:rust"
    );
}

#[tokio::test]
async fn no_build_skips_the_builder() {
    let platform = FakePlatform::new();
    let cfg = ReconcilerConfig {
        no_build: true,
        ..ReconcilerConfig::default()
    };
    let reconciler = Reconciler::new(cfg, &platform, &RecordingBuilder);

    let err = reconciler
        .reconcile(&mut buildable_project(), &[])
        .await
        .unwrap_err();
    assert!(matches!(err, ComposeError::ImageUnavailable { .. }));
}
