//! Manifest wire formats.
//!
//! Serde models for the registry-visible JSON documents: OCI descriptors and
//! image indexes, Docker schema2 manifest lists, and image manifests. Field
//! order of these structs is the serialized field order, and annotation maps
//! are `BTreeMap`s, so serializing the same logical document always yields
//! identical bytes — the content digest is computed over exactly those bytes.

use std::collections::BTreeMap;

use multiarch_core::error::{MultiarchError, Result};
use serde::{Deserialize, Serialize};

/// Docker schema2 manifest media type.
pub const MEDIA_TYPE_DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";

/// Docker schema2 manifest list media type.
pub const MEDIA_TYPE_DOCKER_MANIFEST_LIST: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";

/// OCI image manifest media type.
pub const MEDIA_TYPE_OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";

/// OCI image index media type.
pub const MEDIA_TYPE_OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";

/// Annotation key carrying the reference name of the pushed artifact.
pub const ANNOTATION_REF_NAME: &str = "org.opencontainers.image.ref.name";

/// Legacy Docker schema1 manifest media types.
const MEDIA_TYPE_DOCKER_SCHEMA1: &str = "application/vnd.docker.distribution.manifest.v1+json";
const MEDIA_TYPE_DOCKER_SCHEMA1_SIGNED: &str =
    "application/vnd.docker.distribution.manifest.v1+prettyjws";

/// Foreign / nondistributable layer media types.
const MEDIA_TYPE_DOCKER_FOREIGN_LAYER: &str =
    "application/vnd.docker.image.rootfs.foreign.diff.tar.gzip";
const MEDIA_TYPE_OCI_NONDIST_LAYER: &str = "application/vnd.oci.image.layer.nondistributable.v1.tar";
const MEDIA_TYPE_OCI_NONDIST_LAYER_GZIP: &str =
    "application/vnd.oci.image.layer.nondistributable.v1.tar+gzip";
const MEDIA_TYPE_OCI_NONDIST_LAYER_ZSTD: &str =
    "application/vnd.oci.image.layer.nondistributable.v1.tar+zstd";

/// Content whose media type must not be re-uploaded while walking a push
/// graph: schema1 manifests are unresolvable through the v2 endpoints, and
/// foreign/nondistributable layers are external by definition.
pub fn skippable(media_type: &str) -> bool {
    matches!(
        media_type,
        MEDIA_TYPE_DOCKER_SCHEMA1
            | MEDIA_TYPE_DOCKER_SCHEMA1_SIGNED
            | MEDIA_TYPE_DOCKER_FOREIGN_LAYER
            | MEDIA_TYPE_OCI_NONDIST_LAYER
            | MEDIA_TYPE_OCI_NONDIST_LAYER_GZIP
            | MEDIA_TYPE_OCI_NONDIST_LAYER_ZSTD
    )
}

/// True for media types aggregating other manifests (index / manifest list).
pub fn is_index(media_type: &str) -> bool {
    matches!(
        media_type,
        MEDIA_TYPE_DOCKER_MANIFEST_LIST | MEDIA_TYPE_OCI_INDEX
    )
}

/// Platform a manifest targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub architecture: String,
    pub os: String,
    #[serde(
        rename = "os.version",
        alias = "osversion",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub os_version: Option<String>,
    #[serde(
        rename = "os.features",
        alias = "osfeatures",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub os_features: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

/// A (digest, media type, size) triple identifying a piece of content,
/// optionally constrained to a platform. This is the OCI descriptor shape;
/// the entries of an OCI image index are exactly these values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    pub media_type: String,
    pub digest: String,
    pub size: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urls: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
}

/// One entry of a Docker schema2 manifest list. Same information as a
/// [`Descriptor`], in the field order the Docker schema serializes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DockerManifestEntry {
    pub media_type: String,
    pub size: i64,
    pub digest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
}

/// Docker schema2 manifest list document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DockerManifestList {
    pub schema_version: i32,
    pub media_type: String,
    pub manifests: Vec<DockerManifestEntry>,
}

/// OCI image index document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OciImageIndex {
    pub schema_version: i32,
    pub media_type: String,
    pub manifests: Vec<Descriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

/// Image manifest document (Docker schema2 or OCI — the fields this engine
/// reads are common to both).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    pub schema_version: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub config: Descriptor,
    pub layers: Vec<Descriptor>,
}

/// Deserialization target for enumerating children of any aggregate type.
#[derive(Deserialize)]
struct IndexChildren {
    manifests: Vec<Descriptor>,
}

/// Enumerate the child descriptors referenced by a manifest document.
///
/// Indexes and manifest lists yield their member manifests; image manifests
/// yield config followed by layers; anything else has no children.
pub fn children(media_type: &str, bytes: &[u8]) -> Result<Vec<Descriptor>> {
    match media_type {
        MEDIA_TYPE_DOCKER_MANIFEST_LIST | MEDIA_TYPE_OCI_INDEX => {
            let index: IndexChildren = serde_json::from_slice(bytes)?;
            Ok(index.manifests)
        }
        MEDIA_TYPE_DOCKER_MANIFEST | MEDIA_TYPE_OCI_MANIFEST => {
            let manifest: ImageManifest = serde_json::from_slice(bytes)?;
            let mut descriptors = vec![manifest.config];
            descriptors.extend(manifest.layers);
            Ok(descriptors)
        }
        _ => Ok(Vec::new()),
    }
}

/// Determine the media type of a raw manifest document.
///
/// Prefers the embedded `mediaType` field; OCI documents may omit it, in
/// which case the presence of a `manifests` array distinguishes an index
/// from an image manifest.
pub fn detect_media_type(bytes: &[u8]) -> Result<String> {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Probe {
        media_type: Option<String>,
        manifests: Option<serde_json::Value>,
    }

    let probe: Probe = serde_json::from_slice(bytes)
        .map_err(|e| MultiarchError::Serialization(format!("unreadable manifest: {}", e)))?;
    Ok(match probe.media_type {
        Some(media_type) => media_type,
        None if probe.manifests.is_some() => MEDIA_TYPE_OCI_INDEX.to_string(),
        None => MEDIA_TYPE_OCI_MANIFEST.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skippable_media_types() {
        assert!(skippable(
            "application/vnd.docker.distribution.manifest.v1+json"
        ));
        assert!(skippable(
            "application/vnd.docker.image.rootfs.foreign.diff.tar.gzip"
        ));
        assert!(skippable(
            "application/vnd.oci.image.layer.nondistributable.v1.tar+gzip"
        ));
        assert!(!skippable(MEDIA_TYPE_DOCKER_MANIFEST));
        assert!(!skippable(MEDIA_TYPE_OCI_INDEX));
    }

    #[test]
    fn test_is_index() {
        assert!(is_index(MEDIA_TYPE_DOCKER_MANIFEST_LIST));
        assert!(is_index(MEDIA_TYPE_OCI_INDEX));
        assert!(!is_index(MEDIA_TYPE_OCI_MANIFEST));
    }

    #[test]
    fn test_platform_wire_keys() {
        let platform = Platform {
            architecture: "amd64".to_string(),
            os: "windows".to_string(),
            os_version: Some("10.0.17763".to_string()),
            os_features: Some(vec!["win32k".to_string()]),
            variant: None,
        };
        let json = serde_json::to_value(&platform).unwrap();
        assert_eq!(json["os.version"], "10.0.17763");
        assert_eq!(json["os.features"][0], "win32k");
        assert!(json.get("variant").is_none());
    }

    #[test]
    fn test_platform_yaml_aliases() {
        let platform: Platform = serde_yaml::from_str(
            "architecture: amd64\nos: windows\nosversion: 10.0.17763\n",
        )
        .unwrap();
        assert_eq!(platform.os_version, Some("10.0.17763".to_string()));
    }

    #[test]
    fn test_descriptor_omits_empty_optionals() {
        let descriptor = Descriptor {
            media_type: MEDIA_TYPE_OCI_MANIFEST.to_string(),
            digest: "sha256:abc".to_string(),
            size: 7,
            urls: None,
            annotations: None,
            platform: None,
        };
        let json = serde_json::to_string(&descriptor).unwrap();
        assert_eq!(
            json,
            r#"{"mediaType":"application/vnd.oci.image.manifest.v1+json","digest":"sha256:abc","size":7}"#
        );
    }

    #[test]
    fn test_children_of_index() {
        let body = r#"{
            "schemaVersion": 2,
            "mediaType": "application/vnd.oci.image.index.v1+json",
            "manifests": [
                {"mediaType": "application/vnd.oci.image.manifest.v1+json", "digest": "sha256:aaa", "size": 1},
                {"mediaType": "application/vnd.oci.image.manifest.v1+json", "digest": "sha256:bbb", "size": 2}
            ]
        }"#;
        let descriptors = children(MEDIA_TYPE_OCI_INDEX, body.as_bytes()).unwrap();
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].digest, "sha256:aaa");
        assert_eq!(descriptors[1].digest, "sha256:bbb");
    }

    #[test]
    fn test_children_of_image_manifest() {
        let body = r#"{
            "schemaVersion": 2,
            "mediaType": "application/vnd.docker.distribution.manifest.v2+json",
            "config": {"mediaType": "application/vnd.docker.container.image.v1+json", "digest": "sha256:cfg", "size": 3},
            "layers": [
                {"mediaType": "application/vnd.docker.image.rootfs.diff.tar.gzip", "digest": "sha256:l1", "size": 4}
            ]
        }"#;
        let descriptors = children(MEDIA_TYPE_DOCKER_MANIFEST, body.as_bytes()).unwrap();
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].digest, "sha256:cfg");
        assert_eq!(descriptors[1].digest, "sha256:l1");
    }

    #[test]
    fn test_children_of_unknown_type() {
        let descriptors = children("application/octet-stream", b"{}").unwrap();
        assert!(descriptors.is_empty());
    }

    #[test]
    fn test_detect_media_type_embedded() {
        let body = format!(r#"{{"schemaVersion":2,"mediaType":"{}"}}"#, MEDIA_TYPE_DOCKER_MANIFEST);
        assert_eq!(
            detect_media_type(body.as_bytes()).unwrap(),
            MEDIA_TYPE_DOCKER_MANIFEST
        );
    }

    #[test]
    fn test_detect_media_type_bare_oci_index() {
        let body = r#"{"schemaVersion":2,"manifests":[]}"#;
        assert_eq!(detect_media_type(body.as_bytes()).unwrap(), MEDIA_TYPE_OCI_INDEX);
    }

    #[test]
    fn test_detect_media_type_bare_oci_manifest() {
        let body = r#"{"schemaVersion":2,"config":{},"layers":[]}"#;
        assert_eq!(
            detect_media_type(body.as_bytes()).unwrap(),
            MEDIA_TYPE_OCI_MANIFEST
        );
    }
}
