use std::collections::{BTreeMap, HashMap};

use crate::fingerprint::Fingerprint;
use crate::ir::PositionMap;

struct MemoryEntry {
    seq: u64,
    positions: PositionMap,
}

/// Count-bounded map. Once `capacity` is exceeded the entry written longest
/// ago is evicted; writing an existing key counts as a fresh write.
pub(crate) struct MemoryTier {
    capacity: usize,
    next_seq: u64,
    entries: HashMap<Fingerprint, MemoryEntry>,
    order: BTreeMap<u64, Fingerprint>,
}

impl MemoryTier {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            next_seq: 0,
            entries: HashMap::new(),
            order: BTreeMap::new(),
        }
    }

    pub(crate) fn get(&self, key: Fingerprint) -> Option<&PositionMap> {
        self.entries.get(&key).map(|entry| &entry.positions)
    }

    /// Returns how many entries were evicted to make room.
    pub(crate) fn insert(&mut self, key: Fingerprint, positions: PositionMap) -> usize {
        let seq = self.next_seq;
        self.next_seq += 1;
        if let Some(previous) = self.entries.insert(key, MemoryEntry { seq, positions }) {
            self.order.remove(&previous.seq);
        }
        self.order.insert(seq, key);

        let mut evicted = 0;
        while self.entries.len() > self.capacity {
            let Some((_, oldest)) = self.order.pop_first() else {
                break;
            };
            self.entries.remove(&oldest);
            evicted += 1;
        }
        evicted
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}
