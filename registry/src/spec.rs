//! YAML push-spec input.
//!
//! The file format callers hand to `multiarch push from-spec`:
//!
//! ```yaml
//! image: example.com/app:1.0
//! tags: ["latest"]
//! manifests:
//!   - image: example.com/app-amd64:1.0
//!     platform:
//!       architecture: amd64
//!       os: linux
//!   - image: example.com/app-arm64:1.0
//!     platform:
//!       architecture: arm64
//!       os: linux
//!       variant: v8
//! annotations:
//!   org.example.channel: stable
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use multiarch_core::error::{MultiarchError, Result};
use serde::Deserialize;

use crate::manifest::Platform;

/// One source image of a push spec, with an optional explicit platform.
/// When the platform is omitted it is read from the image itself.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SpecManifest {
    pub image: String,
    #[serde(default)]
    pub platform: Option<Platform>,
}

/// Parsed push spec file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PushSpec {
    /// Target reference for the aggregate.
    pub image: String,
    /// Additional tags to apply after the aggregate push.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Source images, in output order.
    pub manifests: Vec<SpecManifest>,
    /// Top-level annotations (OCI indexes only).
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl PushSpec {
    /// Load and validate a push spec from a YAML file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            MultiarchError::Spec(format!("cannot read spec file {}: {}", path.display(), e))
        })?;
        let spec: PushSpec = serde_yaml::from_str(&data).map_err(|e| {
            MultiarchError::Spec(format!("cannot parse spec file {}: {}", path.display(), e))
        })?;
        if spec.image.trim().is_empty() {
            return Err(MultiarchError::Spec(format!(
                "spec file {} has no target image",
                path.display()
            )));
        }
        if spec.manifests.is_empty() {
            return Err(MultiarchError::Spec(format!(
                "spec file {} lists no manifests",
                path.display()
            )));
        }
        Ok(spec)
    }
}
