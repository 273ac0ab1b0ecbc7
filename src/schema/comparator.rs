//! Key comparator for ordered key-value engines
//!
//! Raw byte order would group NameIndex entries by node ID. Under this comparator,
//! NameIndex keys sharing a parent order by node type (directories first), then by
//! collated name, then by node ID. Everything else compares bytewise, which is exact
//! for the fixed-width big-endian prefix and ID fields.

use super::keys::{NameIndexKey, NAME_INDEX_PREFIX, PREFIX_LEN};
use crate::collation::Collator;
use crate::error::StorageError;
use std::cmp::Ordering;

const PARENT_SCOPE_LEN: usize = PREFIX_LEN + 4;

#[derive(Debug, Clone)]
pub struct KeyComparator {
    collator: Collator,
}

impl KeyComparator {
    pub fn new(collator: Collator) -> Self {
        KeyComparator { collator }
    }

    pub fn collator(&self) -> &Collator {
        &self.collator
    }

    /// Stable identity of the ordering, recorded in store metadata.
    pub fn name(&self) -> String {
        self.collator.name()
    }

    /// Compare two encoded keys.
    ///
    /// Fails with `Corruption` when two NameIndex keys in the same parent scope do
    /// not decode.
    pub fn compare(&self, a: &[u8], b: &[u8]) -> Result<Ordering, StorageError> {
        if !in_same_name_scope(a, b) {
            return Ok(a.cmp(b));
        }
        let lhs = NameIndexKey::decode(a)?;
        let rhs = NameIndexKey::decode(b)?;
        Ok(self.compare_name_index(&lhs, &rhs))
    }

    /// Order two decoded NameIndex keys.
    pub fn compare_name_index(&self, a: &NameIndexKey, b: &NameIndexKey) -> Ordering {
        a.parent_id()
            .cmp(&b.parent_id())
            .then_with(|| a.kind().cmp(&b.kind()))
            .then_with(|| self.collator.compare(a.name(), b.name()))
            .then_with(|| a.node_id().cmp(&b.node_id()))
    }

    /// Separator hint. Leaves `start` unchanged, which is always a valid separator.
    pub fn find_shortest_separator(&self, _start: &mut Vec<u8>, _limit: &[u8]) {}

    /// Successor hint. Leaves `key` unchanged, which is always a valid successor.
    pub fn find_short_successor(&self, _key: &mut Vec<u8>) {}
}

fn in_same_name_scope(a: &[u8], b: &[u8]) -> bool {
    a.len() >= PARENT_SCOPE_LEN
        && b.len() >= PARENT_SCOPE_LEN
        && a[..PREFIX_LEN] == NAME_INDEX_PREFIX
        && a[..PARENT_SCOPE_LEN] == b[..PARENT_SCOPE_LEN]
}
