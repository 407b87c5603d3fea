//! `multiarch push` command — assemble and publish a manifest list.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Subcommand};
use multiarch_core::error::{MultiarchError, Result};
use multiarch_registry::manifest::Platform;
use multiarch_registry::sources;
use multiarch_registry::spec::SpecManifest;
use multiarch_registry::{
    ImageReference, ManifestKind, ManifestList, MemoryStore, Publisher, PushSpec, RegistryAuth,
    RegistryResolver, ResolverOptions,
};

#[derive(Args)]
pub struct PushArgs {
    /// Image manifest type: docker (v2.2 manifest list) or oci (v1 index)
    #[arg(long = "type", default_value = "docker")]
    pub kind: String,

    /// Registry username
    #[arg(long)]
    pub username: Option<String>,

    /// Registry password
    #[arg(long)]
    pub password: Option<String>,

    /// Allow registries with invalid TLS certificates
    #[arg(long)]
    pub insecure: bool,

    /// Use plain HTTP instead of TLS
    #[arg(long)]
    pub plain_http: bool,

    #[command(subcommand)]
    pub command: PushCommand,
}

#[derive(Subcommand)]
pub enum PushCommand {
    /// Push a manifest list defined by a YAML spec file
    FromSpec(FromSpecArgs),
    /// Push a manifest list defined by CLI arguments
    FromArgs(FromArgsArgs),
}

#[derive(Args)]
pub struct FromSpecArgs {
    /// Path to the YAML spec file
    pub file: PathBuf,

    /// Only warn on source images that cannot be resolved
    #[arg(long)]
    pub ignore_missing: bool,
}

#[derive(Args)]
pub struct FromArgsArgs {
    /// Comma-separated platforms to push for, each 'os/arch' or 'os/arch/variant'
    #[arg(long, required = true, value_delimiter = ',')]
    pub platforms: Vec<String>,

    /// Source image pattern; OS, ARCH and VARIANT are replaced per platform
    #[arg(long, required = true)]
    pub template: String,

    /// Name of the manifest list image to produce
    #[arg(long, required = true)]
    pub target: String,

    /// Comma-separated additional tags to apply to the manifest list image
    #[arg(long, value_delimiter = ',')]
    pub tags: Vec<String>,

    /// Comma-separated additional image annotations for the OCI index,
    /// each 'key=value'
    #[arg(long, value_delimiter = ',')]
    pub annotations: Vec<String>,

    /// Only warn on source images that cannot be resolved
    #[arg(long)]
    pub ignore_missing: bool,
}

pub async fn execute(args: PushArgs) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let kind: ManifestKind = args.kind.parse()?;

    let (spec, ignore_missing) = match &args.command {
        PushCommand::FromSpec(from_spec) => (
            PushSpec::from_path(&from_spec.file)?,
            from_spec.ignore_missing,
        ),
        PushCommand::FromArgs(from_args) => (spec_from_args(from_args)?, from_args.ignore_missing),
    };

    let target = ImageReference::parse(&spec.image)?;
    let auth = RegistryAuth::resolve(
        &target.registry,
        args.username.as_deref(),
        args.password.as_deref(),
    );
    let resolver = Arc::new(RegistryResolver::new(
        auth,
        ResolverOptions {
            insecure: args.insecure,
            plain_http: args.plain_http,
        },
    ));

    let entries =
        sources::resolve_entries(resolver.as_ref(), &target, &spec.manifests, ignore_missing)
            .await?;
    if entries.is_empty() {
        return Err("no source images could be resolved".into());
    }

    let list = ManifestList {
        reference: target,
        manifests: entries,
        kind,
        name: spec.image.clone(),
        annotations: spec.annotations.clone(),
    };

    let store = MemoryStore::new();
    let pushed = Publisher::new(resolver).push(&list, &spec.tags, &store).await?;

    println!("Digest: {} {}", pushed.digest, pushed.size);
    Ok(())
}

/// Build a push spec from the `from-args` flags: one manifest per platform,
/// the source image derived from the template.
fn spec_from_args(args: &FromArgsArgs) -> Result<PushSpec> {
    let mut manifests = Vec::with_capacity(args.platforms.len());
    for value in &args.platforms {
        let platform = parse_platform(value)?;
        let image = expand_template(&args.template, &platform);
        manifests.push(SpecManifest {
            image,
            platform: Some(platform),
        });
    }

    Ok(PushSpec {
        image: args.target.clone(),
        tags: args.tags.clone(),
        manifests,
        annotations: parse_annotations(&args.annotations)?,
    })
}

/// Parse an 'os/arch' or 'os/arch/variant' platform string.
fn parse_platform(value: &str) -> Result<Platform> {
    let parts: Vec<&str> = value.split('/').collect();
    if parts.len() != 2 && parts.len() != 3 {
        return Err(MultiarchError::Config(format!(
            "invalid platform '{}': expected 'os/arch' or 'os/arch/variant'",
            value
        )));
    }
    Ok(Platform {
        architecture: parts[1].to_string(),
        os: parts[0].to_string(),
        os_version: None,
        os_features: None,
        variant: parts.get(2).map(|v| v.to_string()),
    })
}

/// Substitute the first occurrence of ARCH, OS and VARIANT in the template.
fn expand_template(template: &str, platform: &Platform) -> String {
    template
        .replacen("ARCH", &platform.architecture, 1)
        .replacen("OS", &platform.os, 1)
        .replacen("VARIANT", platform.variant.as_deref().unwrap_or(""), 1)
}

/// Parse 'key=value' annotation flags.
fn parse_annotations(values: &[String]) -> Result<BTreeMap<String, String>> {
    let mut annotations = BTreeMap::new();
    for value in values {
        let parts: Vec<&str> = value.split('=').collect();
        if parts.len() != 2 {
            return Err(MultiarchError::Config(format!(
                "invalid annotation '{}': expected 'key=value'",
                value
            )));
        }
        annotations.insert(parts[0].to_string(), parts[1].to_string());
    }
    Ok(annotations)
}
