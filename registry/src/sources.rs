//! Source image resolution.
//!
//! Turns the source images named by a push spec into resolved
//! [`ManifestEntry`] values: the manifest is fetched from the registry, the
//! platform comes from the spec entry or, failing that, from the image
//! config, and `push_ref` is set for sources living outside the target
//! repository (their manifests must be re-pushed into the target namespace
//! before the aggregate can reference them).

use multiarch_core::error::{MultiarchError, Result};
use serde::Deserialize;

use crate::manifest::{self, ImageManifest, Platform};
use crate::reference::ImageReference;
use crate::resolver::Resolver;
use crate::spec::SpecManifest;
use crate::types::ManifestEntry;

/// Platform fields of an image config blob.
#[derive(Debug, Deserialize)]
struct ConfigPlatform {
    architecture: String,
    os: String,
    #[serde(default)]
    variant: Option<String>,
}

/// Resolve every source image of a spec, preserving input order.
///
/// With `ignore_missing`, a source that cannot be resolved is logged as a
/// warning and dropped instead of failing the whole run.
pub async fn resolve_entries(
    resolver: &dyn Resolver,
    target: &ImageReference,
    entries: &[SpecManifest],
    ignore_missing: bool,
) -> Result<Vec<ManifestEntry>> {
    let mut resolved = Vec::with_capacity(entries.len());
    for entry in entries {
        match resolve_entry(resolver, target, entry).await {
            Ok(manifest_entry) => resolved.push(manifest_entry),
            Err(e) if ignore_missing => {
                tracing::warn!(image = %entry.image, error = %e, "skipping unresolvable source image");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(resolved)
}

async fn resolve_entry(
    resolver: &dyn Resolver,
    target: &ImageReference,
    entry: &SpecManifest,
) -> Result<ManifestEntry> {
    let source = ImageReference::parse(&entry.image)?;
    let (mut bytes, mut descriptor) = resolver.fetch_manifest(&source).await?;

    // A multi-platform source: select the member matching the requested
    // platform and fetch that manifest instead.
    if manifest::is_index(&descriptor.media_type) {
        let requested = entry.platform.as_ref().ok_or_else(|| {
            MultiarchError::Spec(format!(
                "source image {} is a manifest list; an explicit platform is required to select an entry",
                source
            ))
        })?;
        let members = manifest::children(&descriptor.media_type, &bytes)?;
        let member = members
            .iter()
            .find(|m| platform_matches(m.platform.as_ref(), requested))
            .ok_or_else(|| {
                MultiarchError::Spec(format!(
                    "source image {} has no entry for platform {}/{}",
                    source, requested.os, requested.architecture
                ))
            })?;
        let member_ref = source.with_digest(&member.digest);
        (bytes, descriptor) = resolver.fetch_manifest(&member_ref).await?;
    }

    let platform = match &entry.platform {
        Some(platform) => platform.clone(),
        None => platform_from_config(resolver, &source, &descriptor.media_type, &bytes).await?,
    };
    descriptor.platform = Some(platform);

    let push_ref = source.registry != target.registry || source.repository != target.repository;

    tracing::debug!(
        image = %source,
        digest = %descriptor.digest,
        push_ref,
        "resolved source manifest"
    );

    Ok(ManifestEntry {
        source,
        descriptor,
        push_ref,
    })
}

/// Read architecture/os/variant from the image config blob.
async fn platform_from_config(
    resolver: &dyn Resolver,
    source: &ImageReference,
    media_type: &str,
    bytes: &[u8],
) -> Result<Platform> {
    let image_manifest: ImageManifest = serde_json::from_slice(bytes).map_err(|_| {
        MultiarchError::Spec(format!(
            "cannot determine platform of {}: no platform given and {} is not an image manifest",
            source, media_type
        ))
    })?;

    let config_bytes = resolver.fetch_blob(source, &image_manifest.config).await?;
    let config: ConfigPlatform = serde_json::from_slice(&config_bytes).map_err(|e| {
        MultiarchError::Spec(format!(
            "cannot read platform from config of {}: {}",
            source, e
        ))
    })?;

    Ok(Platform {
        architecture: config.architecture,
        os: config.os,
        os_version: None,
        os_features: None,
        variant: config.variant,
    })
}

/// Match an index member's platform against the requested one. Architecture
/// and OS must agree; the variant is compared only when requested.
fn platform_matches(candidate: Option<&Platform>, requested: &Platform) -> bool {
    let Some(candidate) = candidate else {
        return false;
    };
    candidate.architecture == requested.architecture
        && candidate.os == requested.os
        && (requested.variant.is_none() || candidate.variant == requested.variant)
}
