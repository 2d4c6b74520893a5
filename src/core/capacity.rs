//! Capacity admission control
//!
//! This module provides the `CapacityController` struct, which decides
//! whether a requested quantity can be admitted now, must be wait-listed,
//! or must be rejected — and applies the counter change atomically with
//! the decision.
//!
//! # Design
//!
//! Ledgers live in a `DashMap` keyed by subject (event id). The decision
//! and the increment happen inside one entry-lock critical section, so two
//! concurrent submissions can never both read "space available" and both
//! succeed past capacity. Callers only ever see [`CapacityController::admit`];
//! raw counter mutation is not exposed.
//!
//! # Thread Safety
//!
//! Admissions against different subjects proceed in parallel; admissions
//! against the same subject are serialized by the entry lock. The defining
//! correctness property is that `admitted_count` never exceeds
//! `capacity_total` under any interleaving.

use dashmap::DashMap;

use crate::types::{AdmissionOutcome, CapacityLedger};

/// Thread-safe admission controller over per-subject capacity ledgers
#[derive(Debug, Default)]
pub struct CapacityController {
    ledgers: DashMap<String, CapacityLedger>,
}

impl CapacityController {
    /// Create a new controller with no ledgers
    ///
    /// Subjects without a configured ledger are treated as unlimited.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure (or reconfigure) the capacity bound for a subject
    ///
    /// Counters are preserved across reconfiguration. Lowering the bound
    /// below the current admitted count does not evict anyone; it only
    /// stops further admissions.
    pub fn set_capacity(&self, subject: &str, capacity_total: Option<u32>) {
        self.ledgers
            .entry(subject.to_string())
            .and_modify(|ledger| ledger.capacity_total = capacity_total)
            .or_insert_with(|| match capacity_total {
                Some(total) => CapacityLedger::bounded(total),
                None => CapacityLedger::unlimited(),
            });
    }

    /// Decide on a requested quantity and apply the counter change
    ///
    /// The decision and the increment are one logical operation under the
    /// subject's entry lock:
    ///
    /// * `Admitted` — the quantity fits; `admitted_count` is incremented
    /// * `Waitlisted` — it does not fit but `waitlist_allowed` is true;
    ///   `waitlist_count` is incremented instead
    /// * `Rejected` — it does not fit and waitlisting is disallowed;
    ///   nothing is mutated
    pub fn admit(
        &self,
        subject: &str,
        requested_quantity: u32,
        waitlist_allowed: bool,
    ) -> AdmissionOutcome {
        let mut entry = self
            .ledgers
            .entry(subject.to_string())
            .or_insert_with(CapacityLedger::unlimited);
        let ledger = entry.value_mut();

        if ledger.can_admit(requested_quantity) {
            ledger.admitted_count = ledger.admitted_count.saturating_add(requested_quantity);
            AdmissionOutcome::Admitted
        } else if waitlist_allowed {
            ledger.waitlist_count = ledger.waitlist_count.saturating_add(requested_quantity);
            AdmissionOutcome::Waitlisted
        } else {
            AdmissionOutcome::Rejected
        }
    }

    /// Release previously admitted units (explicit cancellation path)
    pub fn release(&self, subject: &str, quantity: u32) {
        if let Some(mut entry) = self.ledgers.get_mut(subject) {
            let ledger = entry.value_mut();
            ledger.admitted_count = ledger.admitted_count.saturating_sub(quantity);
        }
    }

    /// Remove units from the waitlist (cancellation of a wait-listed
    /// submission)
    pub fn release_waitlisted(&self, subject: &str, quantity: u32) {
        if let Some(mut entry) = self.ledgers.get_mut(subject) {
            let ledger = entry.value_mut();
            ledger.waitlist_count = ledger.waitlist_count.saturating_sub(quantity);
        }
    }

    /// Snapshot of a subject's ledger, if one exists
    pub fn snapshot(&self, subject: &str) -> Option<CapacityLedger> {
        self.ledgers.get(subject).map(|entry| entry.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_subject_is_unlimited() {
        let controller = CapacityController::new();
        assert_eq!(
            controller.admit("open-house", 500, false),
            AdmissionOutcome::Admitted
        );
        assert_eq!(
            controller.snapshot("open-house").unwrap().admitted_count,
            500
        );
    }

    #[test]
    fn test_admit_until_full_then_waitlist() {
        let controller = CapacityController::new();
        controller.set_capacity("gala", Some(2));

        assert_eq!(controller.admit("gala", 2, true), AdmissionOutcome::Admitted);
        assert_eq!(
            controller.admit("gala", 1, true),
            AdmissionOutcome::Waitlisted
        );

        let ledger = controller.snapshot("gala").unwrap();
        assert_eq!(ledger.admitted_count, 2);
        assert_eq!(ledger.waitlist_count, 1);
    }

    #[test]
    fn test_rejection_mutates_nothing() {
        let controller = CapacityController::new();
        controller.set_capacity("gala", Some(1));
        controller.admit("gala", 1, false);

        assert_eq!(
            controller.admit("gala", 1, false),
            AdmissionOutcome::Rejected
        );

        let ledger = controller.snapshot("gala").unwrap();
        assert_eq!(ledger.admitted_count, 1);
        assert_eq!(ledger.waitlist_count, 0);
    }

    #[test]
    fn test_partial_fit_is_not_admitted() {
        // A request larger than the remainder is never partially admitted.
        let controller = CapacityController::new();
        controller.set_capacity("workshop", Some(10));
        controller.admit("workshop", 9, false);

        assert_eq!(
            controller.admit("workshop", 2, true),
            AdmissionOutcome::Waitlisted
        );
        assert_eq!(controller.snapshot("workshop").unwrap().admitted_count, 9);
    }

    #[test]
    fn test_release_frees_capacity() {
        let controller = CapacityController::new();
        controller.set_capacity("gala", Some(1));
        controller.admit("gala", 1, false);
        assert_eq!(
            controller.admit("gala", 1, false),
            AdmissionOutcome::Rejected
        );

        controller.release("gala", 1);
        assert_eq!(controller.admit("gala", 1, false), AdmissionOutcome::Admitted);
    }

    #[test]
    fn test_release_waitlisted() {
        let controller = CapacityController::new();
        controller.set_capacity("gala", Some(1));
        controller.admit("gala", 1, false);
        controller.admit("gala", 1, true);
        assert_eq!(controller.snapshot("gala").unwrap().waitlist_count, 1);

        controller.release_waitlisted("gala", 1);
        assert_eq!(controller.snapshot("gala").unwrap().waitlist_count, 0);
    }

    #[test]
    fn test_reconfiguration_preserves_counters() {
        let controller = CapacityController::new();
        controller.set_capacity("gala", Some(5));
        controller.admit("gala", 5, false);

        controller.set_capacity("gala", Some(3));
        let ledger = controller.snapshot("gala").unwrap();
        assert_eq!(ledger.admitted_count, 5);
        assert_eq!(controller.admit("gala", 1, false), AdmissionOutcome::Rejected);

        controller.set_capacity("gala", Some(10));
        assert_eq!(controller.admit("gala", 1, false), AdmissionOutcome::Admitted);
    }

    // Concurrency tests: the capacity invariant must hold for all
    // interleavings, which is the defining property of this component.

    #[test]
    fn test_concurrent_admissions_never_exceed_capacity() {
        use std::sync::Arc;
        use std::thread;

        let controller = Arc::new(CapacityController::new());
        controller.set_capacity("gala", Some(10));
        controller.admit("gala", 9, false);

        let mut handles = vec![];

        // 5 racers for the single remaining slot.
        for _ in 0..5 {
            let controller_clone = Arc::clone(&controller);
            let handle = thread::spawn(move || controller_clone.admit("gala", 1, false));
            handles.push(handle);
        }

        let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let admitted = outcomes
            .iter()
            .filter(|&&o| o == AdmissionOutcome::Admitted)
            .count();
        let rejected = outcomes
            .iter()
            .filter(|&&o| o == AdmissionOutcome::Rejected)
            .count();

        assert_eq!(admitted, 1);
        assert_eq!(rejected, 4);
        assert_eq!(controller.snapshot("gala").unwrap().admitted_count, 10);
    }

    #[test]
    fn test_concurrent_admissions_with_waitlist() {
        use std::sync::Arc;
        use std::thread;

        let controller = Arc::new(CapacityController::new());
        controller.set_capacity("gala", Some(20));

        let mut handles = vec![];
        for _ in 0..50 {
            let controller_clone = Arc::clone(&controller);
            handles.push(thread::spawn(move || {
                controller_clone.admit("gala", 1, true)
            }));
        }

        let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let admitted = outcomes
            .iter()
            .filter(|&&o| o == AdmissionOutcome::Admitted)
            .count();
        let waitlisted = outcomes
            .iter()
            .filter(|&&o| o == AdmissionOutcome::Waitlisted)
            .count();

        assert_eq!(admitted, 20);
        assert_eq!(waitlisted, 30);

        let ledger = controller.snapshot("gala").unwrap();
        assert_eq!(ledger.admitted_count, 20);
        assert_eq!(ledger.waitlist_count, 30);
    }

    #[test]
    fn test_concurrent_admissions_different_subjects() {
        use std::sync::Arc;
        use std::thread;

        let controller = Arc::new(CapacityController::new());
        for i in 0..10 {
            controller.set_capacity(&format!("event-{i}"), Some(1));
        }

        let mut handles = vec![];
        for i in 0..10 {
            let controller_clone = Arc::clone(&controller);
            handles.push(thread::spawn(move || {
                controller_clone.admit(&format!("event-{i}"), 1, false)
            }));
        }

        for handle in handles {
            assert_eq!(handle.join().unwrap(), AdmissionOutcome::Admitted);
        }
    }
}
