//! Capacity-related types for the commerce engine
//!
//! A `CapacityLedger` tracks how many units of a capacity-bounded subject
//! (an event) have been admitted or wait-listed. The counters are only ever
//! mutated through the admission controller, which makes the decision and
//! the increment one atomic operation.

use serde::{Deserialize, Serialize};

/// Counters for one capacity-bounded subject
///
/// Invariant: `admitted_count <= capacity_total` whenever `capacity_total`
/// is `Some`. `admitted_count` increases only through successful admission
/// and decreases only through the explicit release path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityLedger {
    /// Total capacity; `None` means unlimited
    pub capacity_total: Option<u32>,
    /// Units admitted so far
    pub admitted_count: u32,
    /// Units currently on the waitlist
    pub waitlist_count: u32,
}

impl CapacityLedger {
    /// A ledger with no capacity bound
    pub fn unlimited() -> Self {
        CapacityLedger {
            capacity_total: None,
            admitted_count: 0,
            waitlist_count: 0,
        }
    }

    /// A ledger bounded at `total` units
    pub fn bounded(total: u32) -> Self {
        CapacityLedger {
            capacity_total: Some(total),
            admitted_count: 0,
            waitlist_count: 0,
        }
    }

    /// Units still admittable, or `None` when unlimited
    pub fn remaining(&self) -> Option<u32> {
        self.capacity_total
            .map(|total| total.saturating_sub(self.admitted_count))
    }

    /// Whether `quantity` more units fit within the capacity bound
    pub fn can_admit(&self, quantity: u32) -> bool {
        match self.capacity_total {
            None => true,
            Some(total) => self
                .admitted_count
                .checked_add(quantity)
                .is_some_and(|sum| sum <= total),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::unlimited(CapacityLedger::unlimited(), 1_000_000, true)]
    #[case::fits_exactly(CapacityLedger::bounded(10), 10, true)]
    #[case::exceeds(CapacityLedger::bounded(10), 11, false)]
    #[case::zero_capacity(CapacityLedger::bounded(0), 1, false)]
    fn test_can_admit(#[case] ledger: CapacityLedger, #[case] quantity: u32, #[case] fits: bool) {
        assert_eq!(ledger.can_admit(quantity), fits);
    }

    #[test]
    fn test_can_admit_respects_admitted_count() {
        let ledger = CapacityLedger {
            capacity_total: Some(10),
            admitted_count: 9,
            waitlist_count: 0,
        };
        assert!(ledger.can_admit(1));
        assert!(!ledger.can_admit(2));
        assert_eq!(ledger.remaining(), Some(1));
    }

    #[test]
    fn test_can_admit_handles_counter_overflow() {
        let ledger = CapacityLedger {
            capacity_total: Some(u32::MAX),
            admitted_count: u32::MAX,
            waitlist_count: 0,
        };
        assert!(!ledger.can_admit(1));
    }

    #[test]
    fn test_remaining_is_none_when_unlimited() {
        assert_eq!(CapacityLedger::unlimited().remaining(), None);
    }
}
