//! Remote resource naming.
//!
//! Every remote name is a pure function of the project name and the alias of
//! the declared resource, so repeated runs look up the same names and adopt
//! what they created before. The platform rejects underscores in names.

use crate::compose_project::{Network, Service, Volume};

/// Prefix marking a recorded name as private to the project.
pub const PRIVATE_SENTINEL: char = '_';

/// Tag appended to image references that carry none.
pub const DEFAULT_TAG: &str = "latest";

/// Replace characters the platform does not accept in resource names.
#[must_use]
pub fn sanitize(raw: &str) -> String {
    raw.replace('_', "-")
}

/// Canonical `<project>-<alias>` name.
#[must_use]
pub fn derive_name(project: &str, alias: &str) -> String {
    sanitize(&format!("{project}-{alias}"))
}

/// Remote instance name for a service; `container_name` wins when present.
#[must_use]
pub fn instance_name(project: &str, alias: &str, service: &Service) -> String {
    match service.container_name.as_deref() {
        Some(name) if !name.trim().is_empty() => sanitize(name.trim()),
        _ => derive_name(project, alias),
    }
}

/// Remote service-group name for a network alias.
#[must_use]
pub fn network_name(project: &str, alias: &str, network: Option<&Network>) -> String {
    match network.and_then(|n| n.name.as_deref()) {
        Some(name) if !name.trim().is_empty() => expand_private(project, name.trim()),
        _ => derive_name(project, alias),
    }
}

/// Remote volume name for a volume alias.
#[must_use]
pub fn volume_name(project: &str, alias: &str, volume: &Volume) -> String {
    match volume.name.as_deref() {
        Some(name) if !name.trim().is_empty() => expand_private(project, name.trim()),
        _ => derive_name(project, alias),
    }
}

/// Rewrite a `_suffix` name to `<project>_suffix`, then sanitize.
#[must_use]
pub fn expand_private(project: &str, name: &str) -> String {
    if name.starts_with(PRIVATE_SENTINEL) {
        sanitize(&format!("{project}{name}"))
    } else {
        sanitize(name)
    }
}

/// Image name synthesized for a service that has no explicit image.
#[must_use]
pub fn synthesized_image(project: &str, alias: &str, namespace: Option<&str>) -> String {
    let base = derive_name(project, alias);
    match namespace.map(|ns| ns.trim_end_matches('/')) {
        Some(ns) if !ns.is_empty() => format!("{ns}/{base}:{DEFAULT_TAG}"),
        _ => format!("{base}:{DEFAULT_TAG}"),
    }
}

/// Append `:latest` to an image reference without tag or digest.
#[must_use]
pub fn with_default_tag(image: &str) -> String {
    if image.contains('@') {
        return image.to_string();
    }
    let last = image.rsplit('/').next().unwrap_or(image);
    if last.contains(':') {
        image.to_string()
    } else {
        format!("{image}:{DEFAULT_TAG}")
    }
}

/// Normalise a domain binding: dotted names without trailing dot are FQDNs.
#[must_use]
pub fn normalize_domain(domain: &str) -> Option<String> {
    let domain = domain.trim();
    if domain.is_empty() {
        return None;
    }
    if !domain.ends_with('.') && domain.contains('.') {
        Some(format!("{domain}."))
    } else {
        Some(domain.to_string())
    }
}
