//! Remote compute platform client.
//!
//! Unique responsibility: talk to the platform that hosts instances, service
//! groups, volumes and images.
//!
//! The contract is split per resource kind ([`InstanceApi`], [`ServiceGroupApi`],
//! [`VolumeApi`], [`ImageApi`]); [`CloudPlatform`] is any type implementing all
//! four. The core only depends on the traits, [`CloudClient`] is the REST
//! implementation.
//!
//! Every lookup distinguishes "not found" ([`CloudError::is_not_found`]) from
//! other failures: the reconciler relies on it to choose between create and
//! adopt.
//!
//! All configuration is loaded from environment variables.

use std::{collections::BTreeMap, collections::BTreeSet, env, fmt, time::Duration};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the REST platform client.
#[derive(Clone, Debug)]
pub struct CloudClientConfig {
    /// API token for authentication.
    /// Env: `CLOUD_API_TOKEN` (required)
    pub api_token: String,

    /// Base REST URL.
    /// Env: `CLOUD_API_URL` (default: "<https://api.cloud.example/v1>")
    pub api_url: String,

    /// HTTP request timeout in milliseconds.
    /// Env: `CLOUD_HTTP_TIMEOUT_MS` (default: 30000)
    pub timeout_ms: u64,

    /// Maximum number of retry attempts for lookups and listings that hit a
    /// transient failure. Calls with side effects are never resent.
    /// Env: `CLOUD_HTTP_RETRY_MAX` (default: 3)
    pub retry_max: u32,

    /// Initial backoff between retries in milliseconds.
    /// Env: `CLOUD_HTTP_RETRY_BACKOFF_MS` (default: 500)
    pub retry_backoff_ms: u64,

    /// User agent for HTTP requests.
    /// Env: `CLOUD_USER_AGENT` (default: "cloud-compose/<version>")
    pub user_agent: String,
}

impl CloudClientConfig {
    /// Load configuration from environment variables.
    ///
    /// In local dev, this also loads `.env` from the current directory.
    /// A missing `.env` is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, CloudError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            api_token: must_env("CLOUD_API_TOKEN")?,
            api_url: env::var("CLOUD_API_URL")
                .unwrap_or_else(|_| "https://api.cloud.example/v1".to_string()),
            timeout_ms: parse_u64_env("CLOUD_HTTP_TIMEOUT_MS", 30_000)?,
            retry_max: parse_u32_env("CLOUD_HTTP_RETRY_MAX", 3)?,
            retry_backoff_ms: parse_u64_env("CLOUD_HTTP_RETRY_BACKOFF_MS", 500)?,
            user_agent: env::var("CLOUD_USER_AGENT")
                .unwrap_or_else(|_| concat!("cloud-compose/", env!("CARGO_PKG_VERSION")).to_string()),
        })
    }
}

// ============================================================================
// References and remote resources
// ============================================================================

/// Kind of remote resource, used to label errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Compute instance.
    Instance,
    /// Service group (listeners and domains).
    ServiceGroup,
    /// Persistent volume.
    Volume,
    /// Deployable image.
    Image,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Instance => "instance",
            Self::ServiceGroup => "service group",
            Self::Volume => "volume",
            Self::Image => "image",
        })
    }
}

/// Reference to a remote resource, either by UUID or by name.
///
/// The kind is decided once, at the boundary, by [`ResourceRef::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceRef {
    /// Reference by UUID.
    Uuid(String),
    /// Reference by name.
    Name(String),
}

impl ResourceRef {
    /// Classify a user-supplied identifier.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if Uuid::parse_str(raw).is_ok() {
            Self::Uuid(raw.to_string())
        } else {
            Self::Name(raw.to_string())
        }
    }

    /// Reference by name.
    #[must_use]
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    /// Reference by UUID.
    #[must_use]
    pub fn uuid(uuid: impl Into<String>) -> Self {
        Self::Uuid(uuid.into())
    }

    /// Raw value, whatever the kind.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Uuid(v) | Self::Name(v) => v,
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Instance state as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    /// Serving.
    Running,
    /// Booting.
    Starting,
    /// Scaled to zero, wakes on traffic.
    Standby,
    /// Shutting down.
    Stopping,
    /// Stopped.
    Stopped,
    /// Failed.
    Error,
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Running => "running",
            Self::Starting => "starting",
            Self::Standby => "standby",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Error => "error",
        })
    }
}

/// A compute instance owned by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteInstance {
    /// Instance UUID.
    pub uuid: String,
    /// Instance name.
    pub name: String,
    /// Current state.
    pub state: InstanceState,
    /// Image the instance runs.
    #[serde(default)]
    pub image: Option<String>,
    /// UUID of the service group the instance is bound to.
    #[serde(default)]
    pub service_group: Option<String>,
}

/// Protocol handler applied by a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Handler {
    /// Terminate TLS.
    Tls,
    /// Speak HTTP.
    Http,
    /// Redirect to the TLS port.
    Redirect,
}

/// A public listener of a service group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Listener {
    /// Public port.
    pub port: u16,
    /// Port traffic is forwarded to.
    pub destination_port: u16,
    /// Handler chain.
    pub handlers: BTreeSet<Handler>,
}

impl Listener {
    /// Build a listener from a handler list.
    #[must_use]
    pub fn new(port: u16, destination_port: u16, handlers: &[Handler]) -> Self {
        Self {
            port,
            destination_port,
            handlers: handlers.iter().copied().collect(),
        }
    }
}

/// A service group owned by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteServiceGroup {
    /// Group UUID.
    pub uuid: String,
    /// Group name.
    pub name: String,
    /// Listeners.
    #[serde(default)]
    pub listeners: Vec<Listener>,
    /// Bound domains.
    #[serde(default)]
    pub domains: Vec<String>,
}

/// A persistent volume owned by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteVolume {
    /// Volume UUID.
    pub uuid: String,
    /// Volume name.
    pub name: String,
    /// Size in megabytes.
    pub size_mb: u64,
}

/// An image in the platform catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteImage {
    /// Content digest.
    pub digest: String,
    /// Tags pointing at the digest.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Volume attached to a new instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeAttachment {
    /// Volume UUID.
    pub uuid: String,
    /// Mount path.
    pub at: String,
}

/// Request body for creating an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateInstanceRequest {
    /// Instance name.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Memory in megabytes; platform default when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<u64>,
    /// Command-line arguments.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Environment variables.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// Attached volumes.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<VolumeAttachment>,
    /// Service group to join.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_group: Option<ResourceRef>,
    /// Start right after creation.
    pub autostart: bool,
}

/// Request body for creating a service group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateServiceGroupRequest {
    /// Group name.
    pub name: String,
    /// Listeners.
    pub listeners: Vec<Listener>,
    /// Domains.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub domains: Vec<String>,
}

/// Request body for creating a volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateVolumeRequest {
    /// Volume name.
    pub name: String,
    /// Size in megabytes.
    pub size_mb: u64,
}

/// Per-target outcome of a batched call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    /// Target name or UUID.
    pub target: String,
    /// Whether the platform accepted the operation for this target.
    pub ok: bool,
    /// Platform message, usually set on failure.
    pub message: Option<String>,
}

// ============================================================================
// Platform contract
// ============================================================================

/// Instance operations.
#[allow(async_fn_in_trait)]
pub trait InstanceApi {
    /// Look up one instance.
    async fn get_instance(&self, reference: &ResourceRef) -> Result<RemoteInstance, CloudError>;
    /// List every instance visible to the caller.
    async fn list_instances(&self) -> Result<Vec<RemoteInstance>, CloudError>;
    /// Create an instance.
    async fn create_instance(
        &self,
        request: &CreateInstanceRequest,
    ) -> Result<RemoteInstance, CloudError>;
    /// Start instances; a non-zero `wait` asks the platform to hold the call until they run.
    async fn start_instances(
        &self,
        targets: &[ResourceRef],
        wait: Duration,
    ) -> Result<Vec<BatchItem>, CloudError>;
    /// Stop instances, draining connections for up to `drain`.
    async fn stop_instances(
        &self,
        targets: &[ResourceRef],
        drain: Duration,
        force: bool,
    ) -> Result<Vec<BatchItem>, CloudError>;
    /// Delete instances.
    async fn delete_instances(&self, targets: &[ResourceRef]) -> Result<Vec<BatchItem>, CloudError>;
    /// Console output of one instance.
    async fn instance_logs(
        &self,
        reference: &ResourceRef,
        tail: Option<u32>,
    ) -> Result<String, CloudError>;
}

/// Service group operations.
#[allow(async_fn_in_trait)]
pub trait ServiceGroupApi {
    /// Look up one service group.
    async fn get_service_group(
        &self,
        reference: &ResourceRef,
    ) -> Result<RemoteServiceGroup, CloudError>;
    /// List every service group.
    async fn list_service_groups(&self) -> Result<Vec<RemoteServiceGroup>, CloudError>;
    /// Create a service group.
    async fn create_service_group(
        &self,
        request: &CreateServiceGroupRequest,
    ) -> Result<RemoteServiceGroup, CloudError>;
    /// Delete a service group.
    async fn delete_service_group(&self, reference: &ResourceRef) -> Result<(), CloudError>;
}

/// Volume operations.
#[allow(async_fn_in_trait)]
pub trait VolumeApi {
    /// Look up one volume.
    async fn get_volume(&self, reference: &ResourceRef) -> Result<RemoteVolume, CloudError>;
    /// List every volume.
    async fn list_volumes(&self) -> Result<Vec<RemoteVolume>, CloudError>;
    /// Create a volume.
    async fn create_volume(&self, request: &CreateVolumeRequest) -> Result<RemoteVolume, CloudError>;
    /// Delete a volume.
    async fn delete_volume(&self, reference: &ResourceRef) -> Result<(), CloudError>;
}

/// Image catalog operations.
#[allow(async_fn_in_trait)]
pub trait ImageApi {
    /// Look up an image by reference (`name:tag` or digest).
    async fn get_image(&self, image: &str) -> Result<RemoteImage, CloudError>;
}

/// Everything the core needs from the platform.
pub trait CloudPlatform: InstanceApi + ServiceGroupApi + VolumeApi + ImageApi {}

impl<T> CloudPlatform for T where T: InstanceApi + ServiceGroupApi + VolumeApi + ImageApi {}

// ============================================================================
// REST client
// ============================================================================

/// REST client for the platform.
pub struct CloudClient {
    cfg: CloudClientConfig,
    http: reqwest::Client,
}

impl CloudClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(cfg: CloudClientConfig) -> Result<Self, CloudError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .user_agent(cfg.user_agent.clone())
            .build()
            .map_err(CloudError::Http)?;

        Ok(Self { cfg, http })
    }

    /// Get a reference to the current configuration.
    #[must_use]
    pub const fn config(&self) -> &CloudClientConfig {
        &self.cfg
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.cfg.api_url.trim_end_matches('/'), path)
    }

    /// Send a call with side effects exactly once.
    ///
    /// A create that timed out may still have happened remotely; callers
    /// recover through lookup-before-create, never by resending.
    async fn send<T, F>(
        &self,
        kind: ResourceKind,
        reference: &str,
        extra_timeout: Duration,
        build: F,
    ) -> Result<T, CloudError>
    where
        T: DeserializeOwned,
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        self.exchange(kind, reference, extra_timeout, 0, build).await
    }

    /// Send a read-only call, retrying transient failures up to `retry_max` times.
    async fn fetch<T, F>(&self, kind: ResourceKind, reference: &str, build: F) -> Result<T, CloudError>
    where
        T: DeserializeOwned,
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        self.exchange(kind, reference, Duration::ZERO, self.cfg.retry_max, build)
            .await
    }

    /// Send a request and unwrap the response envelope.
    ///
    /// `build` is called once per attempt. `extra_timeout` extends the HTTP
    /// timeout for calls the platform is asked to hold (start/stop waits).
    async fn exchange<T, F>(
        &self,
        kind: ResourceKind,
        reference: &str,
        extra_timeout: Duration,
        retries: u32,
        build: F,
    ) -> Result<T, CloudError>
    where
        T: DeserializeOwned,
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        let mut attempt: u32 = 0;
        let mut backoff = Duration::from_millis(self.cfg.retry_backoff_ms);
        let timeout = Duration::from_millis(self.cfg.timeout_ms).saturating_add(extra_timeout);

        loop {
            attempt = attempt.saturating_add(1);

            let send_res = build(&self.http)
                .bearer_auth(&self.cfg.api_token)
                .timeout(timeout)
                .send()
                .await;

            match send_res {
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();

                    if status == reqwest::StatusCode::NOT_FOUND {
                        return Err(CloudError::NotFound {
                            kind,
                            reference: reference.to_string(),
                        });
                    }

                    if !status.is_success() {
                        if attempt <= retries && is_retryable_status(status) {
                            tokio::time::sleep(backoff).await;
                            backoff = next_backoff(backoff);
                            continue;
                        }

                        return Err(CloudError::Api { status, body });
                    }

                    if body.trim().is_empty() {
                        return Err(CloudError::EmptyResponse);
                    }

                    let envelope: Envelope<T> = serde_json::from_str(&body)
                        .map_err(|source| CloudError::Json { source, body })?;

                    if envelope.status.as_deref() == Some("error") {
                        return Err(CloudError::Item {
                            reference: reference.to_string(),
                            message: envelope.message.unwrap_or_default(),
                        });
                    }

                    return envelope.data.ok_or(CloudError::EmptyResponse);
                }
                Err(e) => {
                    if attempt <= retries && is_retryable_reqwest(&e) {
                        tokio::time::sleep(backoff).await;
                        backoff = next_backoff(backoff);
                        continue;
                    }

                    return Err(CloudError::Http(e));
                }
            }
        }
    }

    async fn batch(
        &self,
        path: &str,
        targets: &[ResourceRef],
        body: serde_json::Value,
        extra_timeout: Duration,
    ) -> Result<Vec<BatchItem>, CloudError> {
        let url = self.url(path);
        let label = join_refs(targets);
        let data: BatchData = self
            .send(ResourceKind::Instance, &label, extra_timeout, |http| {
                http.post(&url).json(&body)
            })
            .await?;

        Ok(batch_items(targets, data.instances))
    }
}

impl InstanceApi for CloudClient {
    async fn get_instance(&self, reference: &ResourceRef) -> Result<RemoteInstance, CloudError> {
        let url = self.url(&format!("instances/{reference}"));
        let data: InstancesData = self
            .fetch(ResourceKind::Instance, reference.as_str(), |http| {
                http.get(&url)
            })
            .await?;

        first(data.instances, ResourceKind::Instance, reference)
    }

    async fn list_instances(&self) -> Result<Vec<RemoteInstance>, CloudError> {
        let url = self.url("instances");
        let data: InstancesData = self
            .fetch(ResourceKind::Instance, "*", |http| http.get(&url))
            .await?;

        Ok(data.instances)
    }

    async fn create_instance(
        &self,
        request: &CreateInstanceRequest,
    ) -> Result<RemoteInstance, CloudError> {
        let url = self.url("instances");
        let data: InstancesData = self
            .send(ResourceKind::Instance, &request.name, Duration::ZERO, |http| {
                http.post(&url).json(request)
            })
            .await?;

        first(data.instances, ResourceKind::Instance, &ResourceRef::name(&request.name))
    }

    async fn start_instances(
        &self,
        targets: &[ResourceRef],
        wait: Duration,
    ) -> Result<Vec<BatchItem>, CloudError> {
        let body = serde_json::json!({
            "instances": targets,
            "timeout_ms": duration_ms(wait),
        });
        self.batch("instances/start", targets, body, wait).await
    }

    async fn stop_instances(
        &self,
        targets: &[ResourceRef],
        drain: Duration,
        force: bool,
    ) -> Result<Vec<BatchItem>, CloudError> {
        let body = serde_json::json!({
            "instances": targets,
            "drain_timeout_ms": duration_ms(drain),
            "force": force,
        });
        self.batch("instances/stop", targets, body, drain).await
    }

    async fn delete_instances(&self, targets: &[ResourceRef]) -> Result<Vec<BatchItem>, CloudError> {
        let url = self.url("instances");
        let label = join_refs(targets);
        let body = serde_json::json!({ "instances": targets });
        let data: BatchData = self
            .send(ResourceKind::Instance, &label, Duration::ZERO, |http| {
                http.delete(&url).json(&body)
            })
            .await?;

        Ok(batch_items(targets, data.instances))
    }

    async fn instance_logs(
        &self,
        reference: &ResourceRef,
        tail: Option<u32>,
    ) -> Result<String, CloudError> {
        let url = match tail {
            Some(n) => self.url(&format!("instances/{reference}/log?tail={n}")),
            None => self.url(&format!("instances/{reference}/log")),
        };
        let data: LogData = self
            .fetch(ResourceKind::Instance, reference.as_str(), |http| {
                http.get(&url)
            })
            .await?;

        Ok(data.output)
    }
}

impl ServiceGroupApi for CloudClient {
    async fn get_service_group(
        &self,
        reference: &ResourceRef,
    ) -> Result<RemoteServiceGroup, CloudError> {
        let url = self.url(&format!("services/{reference}"));
        let data: ServicesData = self
            .fetch(ResourceKind::ServiceGroup, reference.as_str(), |http| {
                http.get(&url)
            })
            .await?;

        first(data.services, ResourceKind::ServiceGroup, reference)
    }

    async fn list_service_groups(&self) -> Result<Vec<RemoteServiceGroup>, CloudError> {
        let url = self.url("services");
        let data: ServicesData = self
            .fetch(ResourceKind::ServiceGroup, "*", |http| http.get(&url))
            .await?;

        Ok(data.services)
    }

    async fn create_service_group(
        &self,
        request: &CreateServiceGroupRequest,
    ) -> Result<RemoteServiceGroup, CloudError> {
        let url = self.url("services");
        let data: ServicesData = self
            .send(ResourceKind::ServiceGroup, &request.name, Duration::ZERO, |http| {
                http.post(&url).json(request)
            })
            .await?;

        first(data.services, ResourceKind::ServiceGroup, &ResourceRef::name(&request.name))
    }

    async fn delete_service_group(&self, reference: &ResourceRef) -> Result<(), CloudError> {
        let url = self.url(&format!("services/{reference}"));
        let deleted: Result<serde_json::Value, CloudError> = self
            .send(ResourceKind::ServiceGroup, reference.as_str(), Duration::ZERO, |http| {
                http.delete(&url)
            })
            .await;

        accept_empty(deleted)
    }
}

impl VolumeApi for CloudClient {
    async fn get_volume(&self, reference: &ResourceRef) -> Result<RemoteVolume, CloudError> {
        let url = self.url(&format!("volumes/{reference}"));
        let data: VolumesData = self
            .fetch(ResourceKind::Volume, reference.as_str(), |http| {
                http.get(&url)
            })
            .await?;

        first(data.volumes, ResourceKind::Volume, reference)
    }

    async fn list_volumes(&self) -> Result<Vec<RemoteVolume>, CloudError> {
        let url = self.url("volumes");
        let data: VolumesData = self
            .fetch(ResourceKind::Volume, "*", |http| http.get(&url))
            .await?;

        Ok(data.volumes)
    }

    async fn create_volume(&self, request: &CreateVolumeRequest) -> Result<RemoteVolume, CloudError> {
        let url = self.url("volumes");
        let data: VolumesData = self
            .send(ResourceKind::Volume, &request.name, Duration::ZERO, |http| {
                http.post(&url).json(request)
            })
            .await?;

        first(data.volumes, ResourceKind::Volume, &ResourceRef::name(&request.name))
    }

    async fn delete_volume(&self, reference: &ResourceRef) -> Result<(), CloudError> {
        let url = self.url(&format!("volumes/{reference}"));
        let deleted: Result<serde_json::Value, CloudError> = self
            .send(ResourceKind::Volume, reference.as_str(), Duration::ZERO, |http| {
                http.delete(&url)
            })
            .await;

        accept_empty(deleted)
    }
}

impl ImageApi for CloudClient {
    async fn get_image(&self, image: &str) -> Result<RemoteImage, CloudError> {
        let url = reqwest::Url::parse_with_params(&self.url("images"), &[("ref", image)])
            .map_err(|e| CloudError::InvalidUrl(e.to_string()))?;
        let data: ImagesData = self
            .fetch(ResourceKind::Image, image, |http| {
                http.get(url.clone())
            })
            .await?;

        first(data.images, ResourceKind::Image, &ResourceRef::name(image))
    }
}

// ============================================================================
// Wire types (internal)
// ============================================================================

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct InstancesData {
    #[serde(default)]
    instances: Vec<RemoteInstance>,
}

#[derive(Debug, Deserialize)]
struct ServicesData {
    #[serde(default)]
    services: Vec<RemoteServiceGroup>,
}

#[derive(Debug, Deserialize)]
struct VolumesData {
    #[serde(default)]
    volumes: Vec<RemoteVolume>,
}

#[derive(Debug, Deserialize)]
struct ImagesData {
    #[serde(default)]
    images: Vec<RemoteImage>,
}

#[derive(Debug, Deserialize)]
struct LogData {
    #[serde(default)]
    output: String,
}

#[derive(Debug, Deserialize)]
struct BatchData {
    #[serde(default)]
    instances: Vec<RawBatchItem>,
}

#[derive(Debug, Deserialize)]
struct RawBatchItem {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    uuid: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

// ============================================================================
// Error type
// ============================================================================

/// Error type for platform client operations.
#[derive(Debug, Error)]
pub enum CloudError {
    /// Missing required environment variable.
    #[error("missing required env var: {0}")]
    MissingEnv(&'static str),
    /// Invalid environment variable value.
    #[error("invalid env var {key}: {reason}")]
    InvalidEnv {
        /// The environment variable key.
        key: &'static str,
        /// The reason for invalidity.
        reason: &'static str,
    },
    /// HTTP client error.
    #[error("http error: {0}")]
    Http(reqwest::Error),
    /// JSON decoding error.
    #[error("json decode error: {source}")]
    Json {
        /// The JSON parsing error.
        source: serde_json::Error,
        /// The response body.
        body: String,
    },
    /// API error response.
    #[error("api error: status={status}, body={body}")]
    Api {
        /// HTTP status code.
        status: reqwest::StatusCode,
        /// Response body.
        body: String,
    },
    /// The referenced resource does not exist.
    #[error("{kind} not found: {reference}")]
    NotFound {
        /// Kind of the missing resource.
        kind: ResourceKind,
        /// Reference that was looked up.
        reference: String,
    },
    /// The platform rejected the operation for one target.
    #[error("{reference}: {message}")]
    Item {
        /// Target of the operation.
        reference: String,
        /// Platform message.
        message: String,
    },
    /// Response carried no data.
    #[error("empty response from server")]
    EmptyResponse,
    /// A request URL could not be built.
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

impl CloudError {
    /// Whether the error means "no such resource".
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

// ============================================================================
// Helper functions
// ============================================================================

fn first<T>(items: Vec<T>, kind: ResourceKind, reference: &ResourceRef) -> Result<T, CloudError> {
    items.into_iter().next().ok_or_else(|| CloudError::NotFound {
        kind,
        reference: reference.to_string(),
    })
}

fn batch_items(targets: &[ResourceRef], raw: Vec<RawBatchItem>) -> Vec<BatchItem> {
    raw.into_iter()
        .enumerate()
        .map(|(i, item)| BatchItem {
            target: item
                .name
                .or(item.uuid)
                .or_else(|| targets.get(i).map(ToString::to_string))
                .unwrap_or_default(),
            ok: item.status.as_deref() != Some("error"),
            message: item.message,
        })
        .collect()
}

/// Deletions may answer without a payload.
fn accept_empty(res: Result<serde_json::Value, CloudError>) -> Result<(), CloudError> {
    match res {
        Ok(_) | Err(CloudError::EmptyResponse) => Ok(()),
        Err(e) => Err(e),
    }
}

fn join_refs(targets: &[ResourceRef]) -> String {
    targets
        .iter()
        .map(ResourceRef::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn must_env(key: &'static str) -> Result<String, CloudError> {
    env::var(key).map_err(|_| CloudError::MissingEnv(key))
}

fn parse_u32_env(key: &'static str, default: u32) -> Result<u32, CloudError> {
    env::var(key).map_or_else(
        |_| Ok(default),
        |v| {
            v.parse::<u32>().map_err(|_| CloudError::InvalidEnv {
                key,
                reason: "expected an unsigned integer",
            })
        },
    )
}

fn parse_u64_env(key: &'static str, default: u64) -> Result<u64, CloudError> {
    env::var(key).map_or_else(
        |_| Ok(default),
        |v| {
            v.parse::<u64>().map_err(|_| CloudError::InvalidEnv {
                key,
                reason: "expected an unsigned integer",
            })
        },
    )
}

// 409 is not retried: a duplicate-name create must surface to the caller.
#[inline]
const fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    matches!(status.as_u16(), 408 | 425 | 429 | 500 | 502 | 503 | 504)
}

#[inline]
fn is_retryable_reqwest(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect()
}

#[inline]
fn next_backoff(current: Duration) -> Duration {
    let next = current.saturating_mul(2);
    next.min(Duration::from_secs(10))
}
