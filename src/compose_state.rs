//! Project status snapshot.
//!
//! Unique responsibility: remember which remote instances and service groups
//! a project believes it owns between invocations.
//!
//! The snapshot is never trusted as ground truth: every read path runs it
//! through the fleet refresher against live listings before acting on it.
//!
//! Expected integration:
//! 1) Load status (`JsonFileStatusStore`)
//! 2) Refresh it against the platform (`FleetRefresher`)
//! 3) Act on the corrected set (start/stop/down)
//! 4) Record reconciliation results and save

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::cloud_client::{InstanceState, RemoteInstance, RemoteServiceGroup, ResourceRef};
use crate::compose_reconciler::Reconciliation;

/// State file format version.
const STATE_FORMAT_VERSION: u32 = 1;

/// An instance the project believes it owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceEntry {
    /// Instance UUID, when known.
    #[serde(default)]
    pub uuid: Option<String>,
    /// Instance name.
    pub name: String,
    /// Last observed state.
    #[serde(default)]
    pub state: Option<InstanceState>,
}

impl From<&RemoteInstance> for InstanceEntry {
    fn from(value: &RemoteInstance) -> Self {
        Self {
            uuid: Some(value.uuid.clone()),
            name: value.name.clone(),
            state: Some(value.state),
        }
    }
}

/// A service group the project believes it owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkEntry {
    /// Group UUID, when known.
    #[serde(default)]
    pub uuid: Option<String>,
    /// Group name; may start with the project-private sentinel.
    pub name: String,
}

impl NetworkEntry {
    /// Reference to address the group by: the stored UUID when it parses as
    /// one, the name otherwise. State files are edited by hand.
    #[must_use]
    pub fn reference(&self) -> ResourceRef {
        match self.uuid.as_deref().map(ResourceRef::parse) {
            Some(r @ ResourceRef::Uuid(_)) => r,
            _ => ResourceRef::name(&self.name),
        }
    }
}

impl From<&RemoteServiceGroup> for NetworkEntry {
    fn from(value: &RemoteServiceGroup) -> Self {
        Self {
            uuid: Some(value.uuid.clone()),
            name: value.name.clone(),
        }
    }
}

/// Believed-owned resources of one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectStatus {
    /// Format version for state serialization.
    pub format_version: u32,
    /// Project name.
    pub project: String,
    /// Owned instances.
    pub instances: Vec<InstanceEntry>,
    /// Owned service groups.
    pub networks: Vec<NetworkEntry>,
    /// Last local update timestamp (ms).
    pub updated_at_ms: u64,
}

impl ProjectStatus {
    /// Create an empty status.
    #[must_use]
    pub fn new(project: impl Into<String>, now_ms: u64) -> Self {
        Self {
            format_version: STATE_FORMAT_VERSION,
            project: project.into(),
            instances: Vec::new(),
            networks: Vec::new(),
            updated_at_ms: now_ms,
        }
    }

    /// Record what a reconciliation created or adopted.
    ///
    /// Entries are keyed by name: a re-created resource replaces its old
    /// entry, entries for services outside this run are kept.
    pub fn record(&mut self, reconciliation: &Reconciliation, now_ms: u64) {
        for instance in &reconciliation.instances {
            let entry = InstanceEntry::from(instance);
            match self.instances.iter_mut().find(|e| e.name == entry.name) {
                Some(existing) => *existing = entry,
                None => self.instances.push(entry),
            }
        }
        for group in reconciliation.service_groups.values() {
            let entry = NetworkEntry::from(group);
            match self.networks.iter_mut().find(|e| e.name == entry.name) {
                Some(existing) => *existing = entry,
                None => self.networks.push(entry),
            }
        }
        self.updated_at_ms = now_ms;
    }

    /// Forget instances by name.
    pub fn forget_instances(&mut self, names: &[String], now_ms: u64) {
        self.instances.retain(|e| !names.contains(&e.name));
        self.updated_at_ms = now_ms;
    }

    /// Forget service groups by name.
    pub fn forget_networks(&mut self, names: &[String], now_ms: u64) {
        self.networks.retain(|e| !names.contains(&e.name));
        self.updated_at_ms = now_ms;
    }

    /// Names of the owned instances.
    #[must_use]
    pub fn instance_names(&self) -> Vec<String> {
        self.instances.iter().map(|e| e.name.clone()).collect()
    }
}

/// Errors for status store operations.
#[derive(Debug, Error)]
pub enum StatusStoreError {
    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// Serialization error.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    /// Invalid state.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
}

/// Trait for persisting project status.
pub trait StatusStore {
    /// Load the status from storage.
    ///
    /// # Errors
    ///
    /// Returns an error if loading fails (I/O, parsing, or validation).
    fn load(&self) -> Result<Option<ProjectStatus>, StatusStoreError>;

    /// Save the status to storage.
    ///
    /// # Errors
    ///
    /// Returns an error if saving fails (I/O, serialization, or validation).
    fn save(&self, status: &ProjectStatus) -> Result<(), StatusStoreError>;

    /// Load the status of `project`, or an empty one if none (or another
    /// project's) is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if loading fails.
    fn load_project(&self, project: &str, now_ms: u64) -> Result<ProjectStatus, StatusStoreError> {
        Ok(self
            .load()?
            .filter(|status| status.project == project)
            .unwrap_or_else(|| ProjectStatus::new(project, now_ms)))
    }
}

/// File-based JSON status store with safe atomic writes.
#[derive(Debug, Clone)]
pub struct JsonFileStatusStore {
    path: PathBuf,
}

impl JsonFileStatusStore {
    /// Create a new JSON file status store.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the path to the status file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the default path from environment or fallback.
    ///
    /// Env: `COMPOSE_STATE_PATH` (default: `.compose_state.json`)
    #[must_use]
    pub fn default_path() -> PathBuf {
        if let Some(p) = std::env::var_os("COMPOSE_STATE_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from(".compose_state.json")
    }

    fn ensure_parent_dir(&self) -> Result<(), io::Error> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

fn validate(status: &ProjectStatus) -> Result<(), StatusStoreError> {
    if status.format_version != STATE_FORMAT_VERSION {
        return Err(StatusStoreError::InvalidState(
            "unsupported state format version",
        ));
    }
    if status.project.trim().is_empty() {
        return Err(StatusStoreError::InvalidState("project name is empty"));
    }
    Ok(())
}

impl StatusStore for JsonFileStatusStore {
    fn load(&self) -> Result<Option<ProjectStatus>, StatusStoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&self.path)?;
        let status: ProjectStatus = serde_json::from_slice(&bytes)?;
        validate(&status)?;
        Ok(Some(status))
    }

    fn save(&self, status: &ProjectStatus) -> Result<(), StatusStoreError> {
        validate(status)?;
        self.ensure_parent_dir()?;

        // Write to temp file in same directory for atomic rename.
        let mut tmp = self.path.clone();
        let tmp_name = format!(
            ".{}.tmp",
            self.path
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or("compose_state")
        );
        tmp.set_file_name(tmp_name);

        let json = serde_json::to_vec_pretty(status)?;

        {
            let mut f = fs::File::create(&tmp)?;
            f.write_all(&json)?;
            f.sync_all()?;
        }

        // Windows cannot rename over an existing file.
        if cfg!(windows) && self.path.exists() {
            let _ = fs::remove_file(&self.path);
        }
        fs::rename(&tmp, &self.path)?;

        Ok(())
    }
}

/// Utility: current timestamp in milliseconds since UNIX epoch.
#[must_use]
pub fn now_unix_ms() -> u64 {
    let Ok(dur) = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH) else {
        return 0;
    };
    u64::try_from(dur.as_millis()).unwrap_or(u64::MAX)
}
