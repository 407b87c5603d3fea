//! Push orchestration.
//!
//! Publishes a [`ManifestList`] in three ordered steps: component manifests
//! that must exist in the target namespace first, then the aggregate
//! document, then the additional tag aliases. Ordering is a correctness
//! requirement — the aggregate may only reference already-pushed components,
//! and tags may only point at an already-pushed aggregate.

use std::sync::Arc;

use multiarch_core::error::{MultiarchError, Result};

use crate::list;
use crate::manifest::{self, Descriptor};
use crate::reference::ImageReference;
use crate::resolver::{Pusher, Resolver};
use crate::store::{ContentSource, MemoryStore};
use crate::types::ManifestList;

/// Result of a successful publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushedIndex {
    /// Content digest of the aggregate document (`algorithm:hex`).
    pub digest: String,
    /// Byte size of the aggregate document.
    pub size: i64,
}

/// Traversal parameters for one push walk. The full walk and the tag-only
/// walk are the same machinery with different depth/filter settings.
struct Walk {
    /// Maximum descent depth; `Some(0)` pushes the root only, `None` is
    /// unbounded.
    max_depth: Option<u32>,
    /// Children whose media type matches are excluded from the walk.
    skip: fn(&str) -> bool,
}

impl Walk {
    /// Full graph walk with the skippable-media-type filter.
    fn full() -> Self {
        Walk {
            max_depth: None,
            skip: manifest::skippable,
        }
    }

    /// Tag-only: one top-level push, no child descent.
    fn tag_only() -> Self {
        Walk {
            max_depth: Some(0),
            skip: |_| false,
        }
    }
}

/// Publishes manifest lists through a [`Resolver`].
///
/// The resolver is the only mutable-free shared state; one publisher may
/// serve concurrent pushes for different targets. A push borrows its
/// [`MemoryStore`] for the duration of the call, and dropping the returned
/// future cancels at the pending network operation.
pub struct Publisher {
    resolver: Arc<dyn Resolver>,
}

impl Publisher {
    /// Create a publisher over the given resolver.
    pub fn new(resolver: Arc<dyn Resolver>) -> Self {
        Self { resolver }
    }

    /// Assemble and publish the aggregate for `list`, then apply
    /// `additional_tags`. Returns the aggregate's digest and byte size.
    pub async fn push(
        &self,
        list: &ManifestList,
        additional_tags: &[String],
        store: &MemoryStore,
    ) -> Result<PushedIndex> {
        let base = list.reference.base();

        // Push component manifests into the target namespace where required,
        // before anything references them.
        for entry in &list.manifests {
            if !entry.push_ref {
                continue;
            }
            let component_ref = base.with_digest(&entry.descriptor.digest);
            let source_ref = entry.source.with_digest(&entry.descriptor.digest);
            let (bytes, _) =
                self.resolver
                    .fetch_manifest(&source_ref)
                    .await
                    .map_err(|e| MultiarchError::Registry {
                        registry: list.reference.registry.clone(),
                        message: format!(
                            "error pushing target manifest component reference: {}: {}",
                            component_ref, e
                        ),
                    })?;

            let component_store = MemoryStore::new();
            component_store.set(&entry.descriptor, bytes);
            self.push_graph(&component_ref, &entry.descriptor, &component_store, &Walk::full())
                .await
                .map_err(|e| MultiarchError::Registry {
                    registry: list.reference.registry.clone(),
                    message: format!(
                        "error pushing target manifest component reference: {}: {}",
                        component_ref, e
                    ),
                })?;
            tracing::info!(
                digest = %entry.descriptor.digest,
                reference = %component_ref,
                "pushed manifest component reference to target namespace"
            );
        }

        // Build the aggregate and store its canonical bytes so the retry
        // path re-reads them instead of re-serializing.
        let (descriptor, bytes) = list::build(list)?;
        store.set(&descriptor, bytes);

        // Aggregate push, retried once on the known transient auth defect
        // where a 401 challenge consumes the request body.
        if let Err(e) = self
            .push_graph(&list.reference, &descriptor, store, &Walk::full())
            .await
        {
            if is_retryable_auth_body_reuse(&e) {
                tracing::debug!(error = %e, "body reuse error pushing manifest list/index; retrying once");
                self.push_graph(&list.reference, &descriptor, store, &Walk::full())
                    .await
                    .map_err(|e| aggregate_error(&list.reference, &descriptor, e))?;
            } else {
                return Err(aggregate_error(&list.reference, &descriptor, e));
            }
        }

        // Extra tags point at the already-pushed aggregate; the tag-only
        // walk never descends into its children.
        for tag in additional_tags {
            let tagged = base.with_tag(tag);
            tracing::info!(
                tag = %tag,
                digest = %descriptor.digest,
                "pushing additional tag for manifest list/index"
            );
            self.push_graph(&tagged, &descriptor, store, &Walk::tag_only())
                .await
                .map_err(|e| MultiarchError::Registry {
                    registry: list.reference.registry.clone(),
                    message: format!("error pushing additional tag reference: {}: {}", tag, e),
                })?;
        }

        Ok(PushedIndex {
            digest: descriptor.digest.clone(),
            size: descriptor.size,
        })
    }

    /// Push the graph rooted at `root` to `reference`: locally materialized
    /// children first (by digest, within the target repository), the root
    /// last under the full bound reference.
    async fn push_graph(
        &self,
        reference: &ImageReference,
        root: &Descriptor,
        source: &dyn ContentSource,
        walk: &Walk,
    ) -> Result<()> {
        let mut order = Vec::new();
        collect(root, source, walk.max_depth, walk, &mut order)?;

        let base = reference.base();
        for (descriptor, bytes) in order {
            let node_ref = if descriptor.digest == root.digest {
                reference.clone()
            } else {
                base.with_digest(&descriptor.digest)
            };
            let pusher = self.resolver.pusher(&node_ref).await?;
            pusher.push(&descriptor, &bytes).await?;
        }
        Ok(())
    }
}

/// Post-order collection of the locally materialized push graph: children
/// precede their referent so the registry never sees a manifest pointing at
/// content it has not accepted yet. Children absent from the content source
/// are assumed to already exist in the target repository — the registry
/// validates that on manifest upload.
fn collect(
    root: &Descriptor,
    source: &dyn ContentSource,
    depth: Option<u32>,
    walk: &Walk,
    out: &mut Vec<(Descriptor, Vec<u8>)>,
) -> Result<()> {
    let bytes = source.get(&root.digest).ok_or_else(|| {
        MultiarchError::Other(format!("content {} not found in push store", root.digest))
    })?;

    if depth != Some(0) {
        let next = depth.map(|d| d - 1);
        for child in manifest::children(&root.media_type, &bytes)? {
            if (walk.skip)(&child.media_type) {
                continue;
            }
            if source.get(&child.digest).is_some() {
                collect(&child, source, next, walk, out)?;
            }
        }
    }

    out.push((root.clone(), bytes));
    Ok(())
}

fn aggregate_error(
    reference: &ImageReference,
    descriptor: &Descriptor,
    cause: MultiarchError,
) -> MultiarchError {
    MultiarchError::Registry {
        registry: reference.registry.clone(),
        message: format!(
            "error pushing manifest list/index to registry: {}: {}",
            descriptor.digest, cause
        ),
    }
}

/// The one known transient failure worth retrying: a registry auth challenge
/// mid-upload consumed the request body and the client could not replay it.
/// Matching on the rendered message is brittle, so the check lives only
/// here; replace with a structured error code if the transport grows one.
fn is_retryable_auth_body_reuse(error: &MultiarchError) -> bool {
    error.to_string().contains("cannot reuse body")
}
