//! Hysteresis policy deciding whether this node should pin or release a CID.

use serde::{Deserialize, Serialize};

/// Action the local node should take for one embedded pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReplicationAction {
    /// Replication is within the band, leave it alone.
    None,
    /// Under-replicated and not held locally: pin it.
    Add,
    /// Over-replicated and held locally: release it.
    Remove,
}

/// Provider-count band derived from a replication factor.
///
/// The band spans `factor / 2` to `factor + factor / 2` with integer
/// division, so odd factors truncate (7 gives 3..=10).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicationBand {
    /// Below this count an unpinned CID is added.
    pub lower: u64,
    /// Above this count a pinned CID is removed.
    pub upper: u64,
}

impl ReplicationBand {
    /// Band for the given replication factor.
    pub fn for_factor(factor: u64) -> Self {
        let half = factor / 2;
        Self {
            lower: half,
            upper: factor.saturating_add(half),
        }
    }

    /// Apply the band to one CID's observed state.
    pub fn decide(&self, pinned: bool, providers: u64) -> ReplicationAction {
        if !pinned && providers < self.lower {
            ReplicationAction::Add
        } else if pinned && providers > self.upper {
            ReplicationAction::Remove
        } else {
            ReplicationAction::None
        }
    }
}

/// Decide the action for a CID given its local pin state, observed provider
/// count and the contract's replication factor.
pub fn decide(pinned: bool, providers: u64, factor: u64) -> ReplicationAction {
    ReplicationBand::for_factor(factor).decide(pinned, providers)
}

#[cfg(test)]
mod tests {
    use super::*;

    mod band {
        use super::*;

        #[test]
        fn test_even_factor() {
            let band = ReplicationBand::for_factor(10);
            assert_eq!(band.lower, 5);
            assert_eq!(band.upper, 15);
        }

        #[test]
        fn test_odd_factor_truncates() {
            let band = ReplicationBand::for_factor(7);
            assert_eq!(band.lower, 3);
            assert_eq!(band.upper, 10);
        }

        #[test]
        fn test_zero_factor() {
            let band = ReplicationBand::for_factor(0);
            assert_eq!(band, ReplicationBand { lower: 0, upper: 0 });
        }

        #[test]
        fn test_huge_factor_saturates() {
            let band = ReplicationBand::for_factor(u64::MAX);
            assert_eq!(band.upper, u64::MAX);
        }
    }

    mod hysteresis {
        use super::*;

        #[test]
        fn test_under_replicated_unpinned_adds() {
            assert_eq!(decide(false, 3, 10), ReplicationAction::Add);
        }

        #[test]
        fn test_inside_band_unpinned_is_noop() {
            assert_eq!(decide(false, 7, 10), ReplicationAction::None);
        }

        #[test]
        fn test_over_replicated_pinned_removes() {
            assert_eq!(decide(true, 16, 10), ReplicationAction::Remove);
        }

        #[test]
        fn test_at_target_pinned_is_noop() {
            assert_eq!(decide(true, 10, 10), ReplicationAction::None);
        }

        #[test]
        fn test_lower_bound_is_strict() {
            assert_eq!(decide(false, 5, 10), ReplicationAction::None);
            assert_eq!(decide(false, 4, 10), ReplicationAction::Add);
        }

        #[test]
        fn test_upper_bound_is_strict() {
            assert_eq!(decide(true, 15, 10), ReplicationAction::None);
        }

        #[test]
        fn test_pinned_never_added() {
            assert_eq!(decide(true, 0, 10), ReplicationAction::None);
        }

        #[test]
        fn test_unpinned_never_removed() {
            assert_eq!(decide(false, 1000, 10), ReplicationAction::None);
        }

        #[test]
        fn test_zero_factor_never_adds() {
            assert_eq!(decide(false, 0, 0), ReplicationAction::None);
            assert_eq!(decide(true, 1, 0), ReplicationAction::Remove);
        }
    }
}
