//! In-memory content store.
//!
//! Holds the just-built aggregate bytes, keyed by digest, for the duration
//! of one push call. Storing the serialized document once and re-reading it
//! on retry guarantees the pushed bytes are exactly the bytes the advertised
//! digest was computed over, without relying on re-serialization being
//! identical.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::manifest::Descriptor;

/// Read access to content by digest during a push walk.
pub trait ContentSource: Send + Sync {
    /// Get the bytes stored for a digest, if locally materialized.
    fn get(&self, digest: &str) -> Option<Vec<u8>>;
}

/// Write-once-per-digest, read-many mapping from digest to bytes, scoped to
/// a single publication call.
#[derive(Default)]
pub struct MemoryStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store content under its descriptor's digest. The first write for a
    /// digest wins; content is addressed by hash, so a second write for the
    /// same digest carries the same bytes by construction.
    pub fn set(&self, descriptor: &Descriptor, bytes: Vec<u8>) {
        self.blobs
            .write()
            .entry(descriptor.digest.clone())
            .or_insert(bytes);
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    /// True when nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

impl ContentSource for MemoryStore {
    fn get(&self, digest: &str) -> Option<Vec<u8>> {
        self.blobs.read().get(digest).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::MEDIA_TYPE_OCI_INDEX;

    fn descriptor(digest: &str, size: i64) -> Descriptor {
        Descriptor {
            media_type: MEDIA_TYPE_OCI_INDEX.to_string(),
            digest: digest.to_string(),
            size,
            urls: None,
            annotations: None,
            platform: None,
        }
    }

    #[test]
    fn test_set_and_get() {
        let store = MemoryStore::new();
        store.set(&descriptor("sha256:abc", 5), b"hello".to_vec());
        assert_eq!(store.get("sha256:abc"), Some(b"hello".to_vec()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_get_missing() {
        let store = MemoryStore::new();
        assert!(store.get("sha256:missing").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_first_write_wins() {
        let store = MemoryStore::new();
        let desc = descriptor("sha256:abc", 5);
        store.set(&desc, b"first".to_vec());
        store.set(&desc, b"second".to_vec());
        assert_eq!(store.get("sha256:abc"), Some(b"first".to_vec()));
    }
}
