//! Broadcast identifiers and duplicate suppression for flooded frames

use std::collections::{HashSet, VecDeque};
use std::fmt;

use rand_core::{OsRng, RngCore};
use tracing::trace;

/// Length of a broadcast id in bytes
pub const BROADCAST_LEN: usize = 8;

/// Default number of recent broadcast ids remembered
pub const DEFAULT_BROADCAST_HISTORY: usize = 1024;

/// Random token naming one flooded transmission
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BroadcastId([u8; BROADCAST_LEN]);

impl BroadcastId {
    /// Wrap raw bytes
    #[must_use]
    pub const fn new(bytes: [u8; BROADCAST_LEN]) -> Self {
        Self(bytes)
    }

    /// Draw a fresh id from the OS random source
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; BROADCAST_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Raw bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; BROADCAST_LEN] {
        &self.0
    }
}

impl fmt::Display for BroadcastId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.0))
    }
}

impl fmt::Debug for BroadcastId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BroadcastId({self})")
    }
}

/// Bounded memory of recently seen broadcast ids
#[derive(Debug, Clone)]
pub struct BroadcastFilter {
    capacity: usize,
    seen: HashSet<BroadcastId>,
    order: VecDeque<BroadcastId>,
}

impl BroadcastFilter {
    /// Remember up to `capacity` ids, evicting the oldest first
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            seen: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    /// Returns `true` when `id` was seen before and the frame should be
    /// dropped; otherwise records it and returns `false`.
    pub fn drop_check(&mut self, id: &BroadcastId) -> bool {
        if self.seen.contains(id) {
            trace!(%id, "dropping duplicate broadcast");
            return true;
        }
        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.order.push_back(*id);
        self.seen.insert(*id);
        false
    }

    /// Number of ids currently remembered
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether no id is remembered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Default for BroadcastFilter {
    fn default() -> Self {
        Self::new(DEFAULT_BROADCAST_HISTORY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_differ() {
        let a = BroadcastId::generate();
        let b = BroadcastId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn second_sighting_is_dropped() {
        let mut filter = BroadcastFilter::default();
        let id = BroadcastId::new([7; BROADCAST_LEN]);
        assert!(!filter.drop_check(&id));
        assert!(filter.drop_check(&id));
        assert!(filter.drop_check(&id));
        assert_eq!(filter.len(), 1);
    }

    #[test]
    fn oldest_id_is_evicted() {
        let mut filter = BroadcastFilter::new(2);
        let ids: Vec<_> = (0u8..3).map(|n| BroadcastId::new([n; BROADCAST_LEN])).collect();
        for id in &ids {
            assert!(!filter.drop_check(id));
        }
        assert_eq!(filter.len(), 2);
        assert!(filter.drop_check(&ids[2]));
        assert!(!filter.drop_check(&ids[0]));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: first sighting passes, every later one is dropped
            #[test]
            fn prop_drop_check(bytes in any::<[u8; BROADCAST_LEN]>(), repeats in 1usize..8) {
                let mut filter = BroadcastFilter::default();
                let id = BroadcastId::new(bytes);
                prop_assert!(!filter.drop_check(&id));
                for _ in 0..repeats {
                    prop_assert!(filter.drop_check(&id));
                }
            }
        }
    }
}
