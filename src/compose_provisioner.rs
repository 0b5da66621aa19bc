//! Volume provisioner (create or adopt).
//!
//! Unique responsibility: make sure every volume declared by the project
//! exists remotely.
//!
//! A same-named remote volume is adopted as-is, with a warning: it may have
//! been created for another alias or outside this tool. Any lookup failure
//! other than "not found" aborts the whole step, because instances would
//! otherwise bind to missing volumes.

use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::cloud_client::{CreateVolumeRequest, RemoteVolume, ResourceKind, ResourceRef, VolumeApi};
use crate::compose_naming;
use crate::compose_project::{Project, Volume};
use crate::error::{ComposeError, Result};

/// Size used when a volume carries no `size` driver option.
pub const DEFAULT_VOLUME_SIZE_MB: u64 = 64;

/// Driver option holding the requested size.
pub const SIZE_OPTION: &str = "size";

const MIB: u64 = 1024 * 1024;

/// Provisioner for project volumes.
pub struct VolumeProvisioner<'a, P> {
    platform: &'a P,
}

impl<'a, P: VolumeApi> VolumeProvisioner<'a, P> {
    /// Create a provisioner over the given platform.
    #[must_use]
    pub const fn new(platform: &'a P) -> Self {
        Self { platform }
    }

    /// Ensure every project volume exists. Returns volume alias -> remote volume.
    ///
    /// Sizes are validated for all volumes before the first remote call.
    ///
    /// # Errors
    ///
    /// Returns [`ComposeError::InvalidVolumeSize`] for unparsable sizes and
    /// [`ComposeError::Remote`] if a lookup or creation fails.
    pub async fn ensure_volumes(&self, project: &Project) -> Result<BTreeMap<String, RemoteVolume>> {
        let mut aliases: Vec<&String> = project.volumes.keys().collect();
        aliases.sort();

        let mut wanted = Vec::with_capacity(aliases.len());
        for alias in aliases {
            let volume = &project.volumes[alias];
            let name = compose_naming::volume_name(&project.name, alias, volume);
            wanted.push((alias.clone(), name, volume_size_mb(alias, volume)?));
        }

        let mut resolved = BTreeMap::new();
        for (alias, name, size_mb) in wanted {
            let volume = self.ensure_volume(&alias, &name, size_mb).await?;
            resolved.insert(alias, volume);
        }

        Ok(resolved)
    }

    async fn ensure_volume(&self, alias: &str, name: &str, size_mb: u64) -> Result<RemoteVolume> {
        match self.platform.get_volume(&ResourceRef::name(name)).await {
            Ok(existing) => {
                warn!(volume = %alias, name = %existing.name, size_mb = existing.size_mb, "volume already exists, adopting it");
                Ok(existing)
            }
            Err(e) if e.is_not_found() => {
                let request = CreateVolumeRequest {
                    name: name.to_string(),
                    size_mb,
                };
                let created = self
                    .platform
                    .create_volume(&request)
                    .await
                    .map_err(|e| ComposeError::remote(ResourceKind::Volume, name, e))?;
                info!(volume = %alias, name = %created.name, size_mb = created.size_mb, "created volume");
                Ok(created)
            }
            Err(e) => Err(ComposeError::remote(ResourceKind::Volume, name, e)),
        }
    }
}

/// Requested size of a volume in whole megabytes.
///
/// # Errors
///
/// Returns [`ComposeError::InvalidVolumeSize`] if the `size` option cannot be
/// parsed or is smaller than one megabyte.
pub fn volume_size_mb(alias: &str, volume: &Volume) -> Result<u64> {
    let Some(raw) = volume.driver_opts.get(SIZE_OPTION) else {
        return Ok(DEFAULT_VOLUME_SIZE_MB);
    };

    let invalid = |reason| ComposeError::InvalidVolumeSize {
        volume: alias.to_string(),
        value: raw.clone(),
        reason,
    };

    let bytes = parse_bytes(raw).map_err(invalid)?;
    match bytes / MIB {
        0 => Err(invalid("smaller than one megabyte")),
        mb => Ok(mb),
    }
}

/// Parse a human-readable byte string (`512MB`, `1.5G`, `64mib`, `1024`).
///
/// Units are binary: `K`, `KB` and `KiB` all mean 1024 bytes.
///
/// # Errors
///
/// Returns a static reason if the number or unit is not recognised.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn parse_bytes(raw: &str) -> std::result::Result<u64, &'static str> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(raw.len());
    let (number, unit) = raw.split_at(split);

    if number.is_empty() {
        return Err("missing number");
    }

    let multiplier: u64 = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" | "kib" => 1 << 10,
        "m" | "mb" | "mib" => 1 << 20,
        "g" | "gb" | "gib" => 1 << 30,
        "t" | "tb" | "tib" => 1 << 40,
        _ => return Err("unknown unit"),
    };

    if let Ok(whole) = number.parse::<u64>() {
        return whole.checked_mul(multiplier).ok_or("too large");
    }

    let value = number.parse::<f64>().map_err(|_| "invalid number")?;
    let bytes = value * multiplier as f64;
    if !bytes.is_finite() || bytes >= u64::MAX as f64 {
        return Err("too large");
    }
    Ok(bytes as u64)
}
