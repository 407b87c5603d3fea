//! Image reference parsing.
//!
//! Parses references like `ghcr.io/org/app:v1.2` into structured components
//! and derives the tagged/digested variants the push engine needs: the
//! aggregate target, per-component `repo@digest` references, and per-alias
//! `repo:tag` references.

use multiarch_core::error::{MultiarchError, Result};

/// Default registry when none is specified.
const DEFAULT_REGISTRY: &str = "docker.io";

/// Default tag when none is specified.
const DEFAULT_TAG: &str = "latest";

/// Parsed image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Registry hostname (e.g., "ghcr.io", "docker.io")
    pub registry: String,
    /// Repository path (e.g., "library/nginx", "org/app")
    pub repository: String,
    /// Tag (e.g., "latest", "v1.2")
    pub tag: Option<String>,
    /// Digest (e.g., "sha256:abc123...")
    pub digest: Option<String>,
}

impl ImageReference {
    /// Parse an image reference string.
    ///
    /// Supports formats:
    /// - `nginx` → docker.io/library/nginx:latest
    /// - `nginx:1.25` → docker.io/library/nginx:1.25
    /// - `org/app` → docker.io/org/app:latest
    /// - `ghcr.io/org/app:tag` → ghcr.io/org/app:tag
    /// - `ghcr.io/org/app@sha256:abc...` → ghcr.io/org/app@sha256:abc...
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(MultiarchError::Reference("empty reference".to_string()));
        }

        // Split off digest first (@ separator)
        let (name_tag, digest) = match reference.rsplit_once('@') {
            Some((name, digest)) => {
                if !digest.contains(':') {
                    return Err(MultiarchError::Reference(format!(
                        "invalid digest in reference '{}': expected algorithm:hex",
                        reference
                    )));
                }
                (name, Some(digest.to_string()))
            }
            None => (reference, None),
        };

        // Split tag: last colon after the last slash. A colon before the last
        // slash (or an all-digit remainder with no slash) is a registry port.
        let (name, tag) = match name_tag.rfind(':') {
            Some(colon) if colon > name_tag.rfind('/').map_or(0, |s| s) => {
                let candidate = &name_tag[colon + 1..];
                if !name_tag.contains('/') && candidate.chars().all(|c| c.is_ascii_digit()) {
                    (name_tag, None)
                } else {
                    (&name_tag[..colon], Some(candidate.to_string()))
                }
            }
            _ => (name_tag, None),
        };

        let (registry, repository) = split_registry_repository(name)?;

        // Apply default tag if neither tag nor digest was given
        let tag = match (tag, &digest) {
            (None, None) => Some(DEFAULT_TAG.to_string()),
            (tag, _) => tag,
        };

        Ok(ImageReference {
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// The reference with tag and digest stripped: the base name used to
    /// derive component and alias references in the target namespace.
    pub fn base(&self) -> ImageReference {
        ImageReference {
            registry: self.registry.clone(),
            repository: self.repository.clone(),
            tag: None,
            digest: None,
        }
    }

    /// The base reference with the given tag.
    pub fn with_tag(&self, tag: &str) -> ImageReference {
        ImageReference {
            registry: self.registry.clone(),
            repository: self.repository.clone(),
            tag: Some(tag.to_string()),
            digest: None,
        }
    }

    /// The base reference with the given digest.
    pub fn with_digest(&self, digest: &str) -> ImageReference {
        ImageReference {
            registry: self.registry.clone(),
            repository: self.repository.clone(),
            tag: None,
            digest: Some(digest.to_string()),
        }
    }

    /// Get the full reference string.
    pub fn full_reference(&self) -> String {
        let mut s = format!("{}/{}", self.registry, self.repository);
        if let Some(ref tag) = self.tag {
            s.push(':');
            s.push_str(tag);
        }
        if let Some(ref digest) = self.digest {
            s.push('@');
            s.push_str(digest);
        }
        s
    }
}

/// Split a name into registry and repository components.
fn split_registry_repository(name: &str) -> Result<(String, String)> {
    // The first component is a registry hostname when it contains a dot or
    // colon, or is "localhost"
    if let Some((first, rest)) = name.split_once('/') {
        if first.contains('.') || first.contains(':') || first == "localhost" {
            if rest.is_empty() {
                return Err(MultiarchError::Reference(format!(
                    "empty repository in reference '{}'",
                    name
                )));
            }
            return Ok((first.to_string(), rest.to_string()));
        }
    }

    // No registry detected — use default; single names get the Docker Hub
    // "library/" namespace
    let repository = if name.contains('/') {
        name.to_string()
    } else {
        format!("library/{}", name)
    };

    Ok((DEFAULT_REGISTRY.to_string(), repository))
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full_reference())
    }
}
