//! Test doubles for the resolver/pusher seam.
//!
//! `MockResolver` serves manifests and blobs from in-memory maps, records
//! every push attempt, and can be told to fail the next push(es) for a
//! reference with a given error message.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use multiarch_core::error::{MultiarchError, Result};
use parking_lot::Mutex;

use crate::manifest::Descriptor;
use crate::reference::ImageReference;
use crate::resolver::{Pusher, Resolver};

/// One successfully pushed manifest node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RecordedPush {
    pub reference: String,
    pub digest: String,
}

#[derive(Default)]
pub(crate) struct MockResolver {
    manifests: Mutex<HashMap<String, (Vec<u8>, Descriptor)>>,
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    failures: Arc<Mutex<HashMap<String, VecDeque<String>>>>,
    pushes: Arc<Mutex<Vec<RecordedPush>>>,
    attempts: Arc<Mutex<Vec<String>>>,
}

impl MockResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `bytes`/`descriptor` for fetches of `reference`.
    pub fn add_manifest(&self, reference: &str, bytes: Vec<u8>, descriptor: Descriptor) {
        self.manifests
            .lock()
            .insert(reference.to_string(), (bytes, descriptor));
    }

    /// Serve `bytes` for blob fetches of `digest`.
    pub fn add_blob(&self, digest: &str, bytes: Vec<u8>) {
        self.blobs.lock().insert(digest.to_string(), bytes);
    }

    /// Make the next push for `reference` fail with `message`.
    pub fn fail_next(&self, reference: &str, message: &str) {
        self.failures
            .lock()
            .entry(reference.to_string())
            .or_default()
            .push_back(message.to_string());
    }

    /// Successful pushes, in order.
    pub fn pushed(&self) -> Vec<RecordedPush> {
        self.pushes.lock().clone()
    }

    /// Number of push attempts (successful or not) for `reference`.
    pub fn attempts_for(&self, reference: &str) -> usize {
        self.attempts
            .lock()
            .iter()
            .filter(|r| r.as_str() == reference)
            .count()
    }
}

#[async_trait]
impl Resolver for MockResolver {
    async fn pusher(&self, reference: &ImageReference) -> Result<Box<dyn Pusher>> {
        Ok(Box::new(MockPusher {
            reference: reference.full_reference(),
            failures: Arc::clone(&self.failures),
            pushes: Arc::clone(&self.pushes),
            attempts: Arc::clone(&self.attempts),
        }))
    }

    async fn fetch_manifest(&self, reference: &ImageReference) -> Result<(Vec<u8>, Descriptor)> {
        self.manifests
            .lock()
            .get(&reference.full_reference())
            .cloned()
            .ok_or_else(|| MultiarchError::Registry {
                registry: reference.registry.clone(),
                message: format!("manifest unknown: {}", reference),
            })
    }

    async fn fetch_blob(
        &self,
        reference: &ImageReference,
        descriptor: &Descriptor,
    ) -> Result<Vec<u8>> {
        self.blobs
            .lock()
            .get(&descriptor.digest)
            .cloned()
            .ok_or_else(|| MultiarchError::Registry {
                registry: reference.registry.clone(),
                message: format!("blob unknown: {}", descriptor.digest),
            })
    }
}

struct MockPusher {
    reference: String,
    failures: Arc<Mutex<HashMap<String, VecDeque<String>>>>,
    pushes: Arc<Mutex<Vec<RecordedPush>>>,
    attempts: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Pusher for MockPusher {
    async fn push(&self, descriptor: &Descriptor, _bytes: &[u8]) -> Result<()> {
        self.attempts.lock().push(self.reference.clone());

        if let Some(queue) = self.failures.lock().get_mut(&self.reference) {
            if let Some(message) = queue.pop_front() {
                return Err(MultiarchError::Registry {
                    registry: "mock".to_string(),
                    message,
                });
            }
        }

        self.pushes.lock().push(RecordedPush {
            reference: self.reference.clone(),
            digest: descriptor.digest.clone(),
        });
        Ok(())
    }
}
