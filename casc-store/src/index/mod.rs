//! Bucketed key→location index
//!
//! The 9-byte storage-key space is split into 16 buckets by a XOR-fold of
//! the key bytes; each bucket is backed by one `.idx` file. This module
//! merges the bucket files into a single lookup map.

mod file;

use std::collections::BTreeMap;

pub use file::{IdxFile, IdxHeader};

use casc_tact::CascKey;
use tracing::debug;

use crate::paths::StreamAllocator;
use crate::reference::Reference;
use crate::{CascError, Result};

/// Number of index buckets.
pub const BUCKET_COUNT: u8 = 16;

/// Format version written into `.idx` headers.
pub const IDX_FORMAT_VERSION: u16 = 7;

/// Route a key to its bucket: XOR all bytes but the last, then fold the
/// two nibbles.
pub fn bucket_for_key(key: &[u8]) -> u8 {
    let folded = key[..key.len().saturating_sub(1)]
        .iter()
        .fold(0u8, |acc, &byte| acc ^ byte);
    (folded & 0xF) ^ (folded >> 4)
}

/// All bucket indices of an archive, merged.
#[derive(Debug, Default)]
pub struct Index {
    entries: BTreeMap<CascKey, Reference>,
    versions: BTreeMap<u8, u32>,
    key_width: usize,
}

impl Index {
    /// Load every `.idx` file named by the shadow memory's
    /// `(bucket, version)` map.
    pub fn load(allocator: &StreamAllocator, versions: &BTreeMap<u8, u32>) -> Result<Self> {
        let mut index = Self::default();

        for (&bucket, &version) in versions {
            let path = allocator.index_path(bucket, version);
            let file = IdxFile::parse_file(&path)?;
            index.versions.insert(bucket, version);
            index.absorb(file);
        }

        debug!(
            "index: {} entries across {} buckets",
            index.entries.len(),
            index.versions.len()
        );
        Ok(index)
    }

    /// Merge one parsed bucket file into the map. The header's version
    /// field is the format version; bucket stamps come from shadow memory.
    pub fn absorb(&mut self, file: IdxFile) {
        self.key_width = file.header.widths.key;

        for entry in file.entries {
            self.entries.insert(entry.key.clone(), entry);
        }
    }

    /// Find the reference for a storage key.
    ///
    /// Longer keys are looked up by their stored prefix. Misses aggregate
    /// across all buckets into a single not-found error.
    pub fn find(&self, key: &CascKey) -> Result<&Reference> {
        let lookup = if self.key_width > 0 && key.width() > self.key_width {
            key.truncated(self.key_width)
        } else {
            key.clone()
        };

        self.entries
            .get(&lookup)
            .ok_or_else(|| CascError::KeyNotFound(lookup.to_hex()))
    }

    /// Insert an entry (write path).
    pub fn insert(&mut self, reference: Reference) {
        self.entries.insert(reference.key.clone(), reference);
    }

    /// Per-bucket version stamps seen while loading.
    pub fn versions(&self) -> &BTreeMap<u8, u32> {
        &self.versions
    }

    /// All entries routed to `bucket`, in key order.
    pub fn entries_for_bucket(&self, bucket: u8) -> Vec<Reference> {
        self.entries
            .values()
            .filter(|e| bucket_for_key(e.key.as_bytes()) == bucket)
            .cloned()
            .collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when no entries are loaded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in key order.
    pub fn entries(&self) -> impl Iterator<Item = &Reference> {
        self.entries.values()
    }
}
