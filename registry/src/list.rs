//! Aggregate document assembly.
//!
//! Converts a [`ManifestList`] into its wire document (Docker manifest list
//! or OCI image index), serializes it to canonical bytes, and derives the
//! content-addressed descriptor that the push step advertises.

use std::collections::BTreeMap;

use multiarch_core::error::Result;
use sha2::{Digest as _, Sha256};

use crate::manifest::{
    Descriptor, DockerManifestEntry, DockerManifestList, OciImageIndex, ANNOTATION_REF_NAME,
};
use crate::types::{ManifestKind, ManifestList};

/// Schema version shared by both output formats.
const SCHEMA_VERSION: i32 = 2;

/// Build the aggregate document for `list`.
///
/// Returns the descriptor (digest, media type, size, reference-name
/// annotation) and the canonical serialized bytes the digest was computed
/// over. The serialization is deterministic — struct field order, sorted
/// annotation maps, 2-space indentation — so identical input always yields
/// an identical digest.
pub fn build(list: &ManifestList) -> Result<(Descriptor, Vec<u8>)> {
    let bytes = match list.kind {
        ManifestKind::Docker => serde_json::to_vec_pretty(&docker_manifest_list(list))?,
        ManifestKind::Oci => serde_json::to_vec_pretty(&oci_index(list))?,
    };

    let digest = format!("sha256:{}", hex::encode(Sha256::digest(&bytes)));
    let mut annotations = BTreeMap::new();
    annotations.insert(ANNOTATION_REF_NAME.to_string(), list.name.clone());

    let descriptor = Descriptor {
        media_type: list.kind.media_type().to_string(),
        digest,
        size: bytes.len() as i64,
        urls: None,
        annotations: Some(annotations),
        platform: None,
    };
    Ok((descriptor, bytes))
}

/// Docker schema2 manifest list: each descriptor converted into the Docker
/// entry shape, input order preserved.
fn docker_manifest_list(list: &ManifestList) -> DockerManifestList {
    DockerManifestList {
        schema_version: SCHEMA_VERSION,
        media_type: ManifestKind::Docker.media_type().to_string(),
        manifests: list
            .manifests
            .iter()
            .map(|entry| docker_entry(&entry.descriptor))
            .collect(),
    }
}

fn docker_entry(descriptor: &Descriptor) -> DockerManifestEntry {
    DockerManifestEntry {
        media_type: descriptor.media_type.clone(),
        size: descriptor.size,
        digest: descriptor.digest.clone(),
        annotations: descriptor.annotations.clone(),
        platform: descriptor.platform.clone(),
    }
}

/// OCI image index: component descriptors verbatim, top-level annotations
/// copied in, empty map omitted from the wire document.
fn oci_index(list: &ManifestList) -> OciImageIndex {
    OciImageIndex {
        schema_version: SCHEMA_VERSION,
        media_type: ManifestKind::Oci.media_type().to_string(),
        manifests: list
            .manifests
            .iter()
            .map(|entry| entry.descriptor.clone())
            .collect(),
        annotations: if list.annotations.is_empty() {
            None
        } else {
            Some(list.annotations.clone())
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{Platform, MEDIA_TYPE_DOCKER_MANIFEST, MEDIA_TYPE_OCI_MANIFEST};
    use crate::reference::ImageReference;
    use crate::types::ManifestEntry;

    fn entry(digest: &str, arch: &str, media_type: &str) -> ManifestEntry {
        ManifestEntry {
            source: ImageReference::parse(&format!("example.com/app-{}:1.0", arch)).unwrap(),
            descriptor: Descriptor {
                media_type: media_type.to_string(),
                digest: digest.to_string(),
                size: 1024,
                urls: None,
                annotations: None,
                platform: Some(Platform {
                    architecture: arch.to_string(),
                    os: "linux".to_string(),
                    os_version: None,
                    os_features: None,
                    variant: None,
                }),
            },
            push_ref: false,
        }
    }

    fn sample_list(kind: ManifestKind) -> ManifestList {
        ManifestList {
            reference: ImageReference::parse("example.com/app:1.0").unwrap(),
            manifests: vec![
                entry("sha256:aaa", "amd64", MEDIA_TYPE_DOCKER_MANIFEST),
                entry("sha256:bbb", "arm64", MEDIA_TYPE_DOCKER_MANIFEST),
            ],
            kind,
            name: "example.com/app:1.0".to_string(),
            annotations: BTreeMap::new(),
        }
    }

    #[test]
    fn test_docker_document_shape() {
        let (descriptor, bytes) = build(&sample_list(ManifestKind::Docker)).unwrap();

        let doc: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(doc["schemaVersion"], 2);
        assert_eq!(
            doc["mediaType"],
            "application/vnd.docker.distribution.manifest.list.v2+json"
        );
        let manifests = doc["manifests"].as_array().unwrap();
        assert_eq!(manifests.len(), 2);
        // Input order preserved
        assert_eq!(manifests[0]["digest"], "sha256:aaa");
        assert_eq!(manifests[1]["digest"], "sha256:bbb");
        assert_eq!(manifests[0]["platform"]["architecture"], "amd64");
        assert_eq!(manifests[0]["platform"]["os"], "linux");
        assert_eq!(manifests[0]["size"], 1024);

        assert_eq!(descriptor.media_type, ManifestKind::Docker.media_type());
        assert_eq!(descriptor.size, bytes.len() as i64);
    }

    #[test]
    fn test_oci_document_shape_and_annotations() {
        let mut list = sample_list(ManifestKind::Oci);
        list.annotations
            .insert("org.example.channel".to_string(), "stable".to_string());
        list.annotations
            .insert("org.example.build".to_string(), "42".to_string());

        let (descriptor, bytes) = build(&list).unwrap();

        let doc: OciImageIndex = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(doc.schema_version, 2);
        assert_eq!(doc.media_type, "application/vnd.oci.image.index.v1+json");
        assert_eq!(doc.manifests.len(), 2);
        // Descriptors carried verbatim
        assert_eq!(doc.manifests[0], list.manifests[0].descriptor);
        // Annotation map equals the input map key-for-key
        assert_eq!(doc.annotations.unwrap(), list.annotations);

        assert_eq!(descriptor.media_type, ManifestKind::Oci.media_type());
    }

    #[test]
    fn test_oci_empty_annotations_omitted() {
        let (_, bytes) = build(&sample_list(ManifestKind::Oci)).unwrap();
        let doc: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(doc.get("annotations").is_none());
    }

    #[test]
    fn test_digest_is_deterministic() {
        let list = sample_list(ManifestKind::Docker);
        let (first_desc, first_bytes) = build(&list).unwrap();
        let (second_desc, second_bytes) = build(&list).unwrap();
        assert_eq!(first_bytes, second_bytes);
        assert_eq!(first_desc.digest, second_desc.digest);
    }

    #[test]
    fn test_digest_matches_bytes() {
        let (descriptor, bytes) = build(&sample_list(ManifestKind::Docker)).unwrap();
        let expected = format!("sha256:{}", hex::encode(Sha256::digest(&bytes)));
        assert_eq!(descriptor.digest, expected);
        assert_eq!(descriptor.digest.len(), "sha256:".len() + 64);
    }

    #[test]
    fn test_reference_name_annotation() {
        let (descriptor, _) = build(&sample_list(ManifestKind::Oci)).unwrap();
        assert_eq!(
            descriptor.annotations.unwrap()[ANNOTATION_REF_NAME],
            "example.com/app:1.0"
        );
    }

    #[test]
    fn test_serialization_uses_two_space_indent() {
        let (_, bytes) = build(&sample_list(ManifestKind::Docker)).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("{\n  \"schemaVersion\": 2"));
    }

    #[test]
    fn test_oci_entries_keep_media_type() {
        let mut list = sample_list(ManifestKind::Oci);
        list.manifests[0].descriptor.media_type = MEDIA_TYPE_OCI_MANIFEST.to_string();
        let (_, bytes) = build(&list).unwrap();
        let doc: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            doc["manifests"][0]["mediaType"],
            "application/vnd.oci.image.manifest.v1+json"
        );
    }
}
