//! Resolver / pusher binding.
//!
//! The engine reaches the network only through the [`Resolver`] and
//! [`Pusher`] traits. The production implementation wraps the
//! `oci-distribution` client: authentication happens when a pusher is
//! resolved, and manifests are pushed as raw bytes so the uploaded content
//! hashes to exactly the advertised digest.

use async_trait::async_trait;
use multiarch_core::error::{MultiarchError, Result};
use oci_distribution::client::{Client, ClientConfig, ClientProtocol};
use oci_distribution::manifest::OciDescriptor;
use oci_distribution::secrets::RegistryAuth as OciRegistryAuth;
use oci_distribution::RegistryOperation;
use oci_distribution::Reference;
use reqwest::header::HeaderValue;

use crate::credentials::CredentialStore;
use crate::manifest::{self, Descriptor};
use crate::reference::ImageReference;

/// Manifest media types accepted when fetching source manifests.
static ACCEPTED_MANIFEST_TYPES: &[&str] = &[
    manifest::MEDIA_TYPE_OCI_MANIFEST,
    manifest::MEDIA_TYPE_OCI_INDEX,
    manifest::MEDIA_TYPE_DOCKER_MANIFEST,
    manifest::MEDIA_TYPE_DOCKER_MANIFEST_LIST,
];

/// Uploads manifest content for the reference it was resolved for.
#[async_trait]
pub trait Pusher: Send + Sync {
    /// Upload one manifest node: `bytes` must hash to `descriptor.digest`.
    async fn push(&self, descriptor: &Descriptor, bytes: &[u8]) -> Result<()>;
}

/// Capability to reach a registry for a given reference.
///
/// The resolver is immutable configuration plus an HTTP client; it is safe
/// to share across concurrent push calls for different targets.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Obtain a pusher bound to `reference`.
    async fn pusher(&self, reference: &ImageReference) -> Result<Box<dyn Pusher>>;

    /// Fetch the manifest `reference` points at, returning the raw bytes and
    /// a descriptor for them (digest, detected media type, size).
    async fn fetch_manifest(&self, reference: &ImageReference) -> Result<(Vec<u8>, Descriptor)>;

    /// Fetch a blob belonging to `reference`'s repository by descriptor.
    async fn fetch_blob(&self, reference: &ImageReference, descriptor: &Descriptor)
        -> Result<Vec<u8>>;
}

/// Authentication credentials for a container registry.
#[derive(Debug, Clone)]
pub struct RegistryAuth {
    username: Option<String>,
    password: Option<String>,
}

impl RegistryAuth {
    /// Create anonymous authentication (no credentials).
    pub fn anonymous() -> Self {
        Self {
            username: None,
            password: None,
        }
    }

    /// Create basic authentication with username and password.
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    /// Create authentication from environment variables.
    ///
    /// Reads `REGISTRY_USERNAME` and `REGISTRY_PASSWORD`.
    /// Falls back to anonymous if not set.
    pub fn from_env() -> Self {
        let username = std::env::var("REGISTRY_USERNAME").ok();
        let password = std::env::var("REGISTRY_PASSWORD").ok();

        if username.is_some() && password.is_some() {
            Self { username, password }
        } else {
            Self::anonymous()
        }
    }

    /// Evaluate the credential chain for a registry, in order: explicit
    /// username/password, the credential store, environment variables,
    /// anonymous. A credential store that fails to load is logged as a
    /// warning and skipped rather than failing resolver construction.
    pub fn resolve(registry: &str, username: Option<&str>, password: Option<&str>) -> Self {
        if username.is_some() || password.is_some() {
            return Self::basic(
                username.unwrap_or_default(),
                password.unwrap_or_default(),
            );
        }

        match CredentialStore::default_path() {
            Ok(store) => match store.get(registry) {
                Ok(Some((username, password))) => return Self::basic(username, password),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(registry = %registry, error = %e, "failed to read stored credentials; continuing without them");
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "credential store unavailable; continuing without it");
            }
        }

        Self::from_env()
    }

    /// Convert to the oci-distribution auth type.
    fn to_oci_auth(&self) -> OciRegistryAuth {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => OciRegistryAuth::Basic(u.clone(), p.clone()),
            _ => OciRegistryAuth::Anonymous,
        }
    }
}

/// Transport options for the production resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolverOptions {
    /// Accept invalid TLS certificates.
    pub insecure: bool,
    /// Use plain HTTP instead of TLS.
    pub plain_http: bool,
}

/// Production [`Resolver`] backed by the `oci-distribution` client.
pub struct RegistryResolver {
    client: Client,
    auth: RegistryAuth,
}

impl RegistryResolver {
    /// Create a resolver with the given authentication and transport options.
    pub fn new(auth: RegistryAuth, options: ResolverOptions) -> Self {
        let config = ClientConfig {
            protocol: if options.plain_http {
                ClientProtocol::Http
            } else {
                ClientProtocol::Https
            },
            accept_invalid_certificates: options.insecure,
            ..Default::default()
        };
        Self {
            client: Client::new(config),
            auth,
        }
    }
}

#[async_trait]
impl Resolver for RegistryResolver {
    async fn pusher(&self, reference: &ImageReference) -> Result<Box<dyn Pusher>> {
        let oci_ref = to_oci_reference(reference);
        self.client
            .auth(&oci_ref, &self.auth.to_oci_auth(), RegistryOperation::Push)
            .await
            .map_err(|e| MultiarchError::Registry {
                registry: reference.registry.clone(),
                message: format!("failed to authenticate push to {}: {}", reference, e),
            })?;
        Ok(Box::new(RegistryPusher {
            client: self.client.clone(),
            reference: oci_ref,
        }))
    }

    async fn fetch_manifest(&self, reference: &ImageReference) -> Result<(Vec<u8>, Descriptor)> {
        let oci_ref = to_oci_reference(reference);
        let (bytes, digest) = self
            .client
            .pull_manifest_raw(&oci_ref, &self.auth.to_oci_auth(), ACCEPTED_MANIFEST_TYPES)
            .await
            .map_err(|e| MultiarchError::Registry {
                registry: reference.registry.clone(),
                message: format!("failed to pull manifest {}: {}", reference, e),
            })?;

        let media_type = manifest::detect_media_type(&bytes)?;
        let descriptor = Descriptor {
            media_type,
            digest,
            size: bytes.len() as i64,
            urls: None,
            annotations: None,
            platform: None,
        };
        Ok((bytes, descriptor))
    }

    async fn fetch_blob(
        &self,
        reference: &ImageReference,
        descriptor: &Descriptor,
    ) -> Result<Vec<u8>> {
        let oci_ref = to_oci_reference(reference);
        let oci_descriptor = OciDescriptor {
            media_type: descriptor.media_type.clone(),
            digest: descriptor.digest.clone(),
            size: descriptor.size,
            ..Default::default()
        };

        let mut bytes: Vec<u8> = Vec::new();
        self.client
            .pull_blob(&oci_ref, &oci_descriptor, &mut bytes)
            .await
            .map_err(|e| MultiarchError::Registry {
                registry: reference.registry.clone(),
                message: format!("failed to pull blob {}: {}", descriptor.digest, e),
            })?;
        Ok(bytes)
    }
}

/// [`Pusher`] bound to one reference on one registry.
struct RegistryPusher {
    client: Client,
    reference: Reference,
}

#[async_trait]
impl Pusher for RegistryPusher {
    async fn push(&self, descriptor: &Descriptor, bytes: &[u8]) -> Result<()> {
        let content_type = HeaderValue::from_str(&descriptor.media_type).map_err(|e| {
            MultiarchError::Registry {
                registry: self.reference.registry().to_string(),
                message: format!("invalid media type '{}': {}", descriptor.media_type, e),
            }
        })?;
        self.client
            .push_manifest_raw(&self.reference, bytes.to_vec(), content_type)
            .await
            .map_err(|e| MultiarchError::Registry {
                registry: self.reference.registry().to_string(),
                message: format!("failed to push manifest {}: {}", descriptor.digest, e),
            })?;
        Ok(())
    }
}

/// Convert an [`ImageReference`] to an oci-distribution [`Reference`].
/// A digest wins over a tag; an untagged reference defaults to `latest`.
fn to_oci_reference(reference: &ImageReference) -> Reference {
    if let Some(ref digest) = reference.digest {
        Reference::with_digest(
            reference.registry.clone(),
            reference.repository.clone(),
            digest.clone(),
        )
    } else {
        let tag = reference.tag.clone().unwrap_or_else(|| "latest".to_string());
        Reference::with_tag(
            reference.registry.clone(),
            reference.repository.clone(),
            tag,
        )
    }
}
