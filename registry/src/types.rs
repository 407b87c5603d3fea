//! Publication request model.
//!
//! A [`ManifestList`] is the fully-resolved input to the push engine: the
//! target reference, the ordered per-platform entries, and the output format
//! to assemble. It is built by the spec/CLI loading layer (see
//! [`crate::sources`]) and consumed read-only by one push call.

use std::collections::BTreeMap;
use std::str::FromStr;

use multiarch_core::error::MultiarchError;

use crate::manifest::{self, Descriptor};
use crate::reference::ImageReference;

/// Output document format: Docker schema2 manifest list or OCI image index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestKind {
    Docker,
    Oci,
}

impl ManifestKind {
    /// Media type of the aggregate document for this kind.
    pub fn media_type(&self) -> &'static str {
        match self {
            ManifestKind::Docker => manifest::MEDIA_TYPE_DOCKER_MANIFEST_LIST,
            ManifestKind::Oci => manifest::MEDIA_TYPE_OCI_INDEX,
        }
    }
}

impl FromStr for ManifestKind {
    type Err = MultiarchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "docker" => Ok(ManifestKind::Docker),
            "oci" => Ok(ManifestKind::Oci),
            other => Err(MultiarchError::Config(format!(
                "unknown manifest type '{}': expected 'docker' or 'oci'",
                other
            ))),
        }
    }
}

/// One resolved per-platform entry of the aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestEntry {
    /// Where the component manifest lives (used to fetch its bytes when the
    /// component must be re-pushed into the target namespace).
    pub source: ImageReference,
    /// Descriptor of the component manifest, platform included.
    pub descriptor: Descriptor,
    /// Whether the component manifest must be pushed into the target
    /// namespace before the aggregate references it.
    pub push_ref: bool,
}

/// The publication request: everything needed to assemble and push one
/// manifest list / image index.
#[derive(Debug, Clone)]
pub struct ManifestList {
    /// Target reference the aggregate is pushed to.
    pub reference: ImageReference,
    /// Ordered component entries; output order equals input order.
    pub manifests: Vec<ManifestEntry>,
    /// Output document format.
    pub kind: ManifestKind,
    /// Logical name recorded in the aggregate's reference-name annotation.
    pub name: String,
    /// Top-level annotations, applied to OCI indexes only.
    pub annotations: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_str() {
        assert_eq!("docker".parse::<ManifestKind>().unwrap(), ManifestKind::Docker);
        assert_eq!("oci".parse::<ManifestKind>().unwrap(), ManifestKind::Oci);
    }

    #[test]
    fn test_kind_from_str_rejects_unknown() {
        let err = "v2s2".parse::<ManifestKind>().unwrap_err();
        assert!(err.to_string().contains("unknown manifest type"));
    }

    #[test]
    fn test_kind_media_type() {
        assert_eq!(
            ManifestKind::Docker.media_type(),
            "application/vnd.docker.distribution.manifest.list.v2+json"
        );
        assert_eq!(
            ManifestKind::Oci.media_type(),
            "application/vnd.oci.image.index.v1+json"
        );
    }
}
