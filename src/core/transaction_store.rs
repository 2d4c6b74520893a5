//! Thread-safe transaction record store
//!
//! This module provides the `TransactionStore` struct, which persists
//! transaction records using a concurrent map so independent
//! request-handling contexts can safely operate on different records in
//! parallel.
//!
//! # Design
//!
//! The store uses `DashMap` (a concurrent HashMap) for fine-grained
//! locking per record. All mutations go through the closure-based
//! [`TransactionStore::update`], which runs while holding the record's
//! entry lock: no other writer can observe a partially-updated record, and
//! read-then-write gaps are impossible by construction.
//!
//! Records are never physically deleted; cancellation is a status value.
//!
//! # Thread Safety
//!
//! - Operations on different records proceed in parallel
//! - Operations on the same record are serialized by the entry lock
//! - `get` returns a snapshot; concurrent writers are not reflected in it

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::types::{CommerceError, Transaction, TransactionId, TransactionStatus};

/// Thread-safe store for transaction records
#[derive(Debug, Default)]
pub struct TransactionStore {
    /// Concurrent map keyed by transaction id
    transactions: DashMap<TransactionId, Transaction>,
}

impl TransactionStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a freshly created record
    ///
    /// Ids are UUIDs assigned at creation, so collisions do not occur in
    /// practice; an existing record under the same id is never replaced.
    pub fn insert(&self, transaction: Transaction) -> TransactionId {
        let id = transaction.id;
        self.transactions.entry(id).or_insert(transaction);
        id
    }

    /// Snapshot of a record by id
    pub fn get(&self, id: TransactionId) -> Option<Transaction> {
        self.transactions.get(&id).map(|entry| entry.value().clone())
    }

    /// Mutate a record under its entry lock
    ///
    /// The closure must perform all of its checks before mutating, so a
    /// returned error leaves the record unchanged. On success `updated_at`
    /// is advanced and a snapshot of the updated record is returned.
    ///
    /// # Errors
    ///
    /// * `NotFound` if no record exists for `id`
    /// * Whatever error the closure returns
    pub fn update<F>(&self, id: TransactionId, f: F) -> Result<Transaction, CommerceError>
    where
        F: FnOnce(&mut Transaction) -> Result<(), CommerceError>,
    {
        let mut entry = self
            .transactions
            .get_mut(&id)
            .ok_or_else(|| CommerceError::not_found(id))?;
        let transaction = entry.value_mut();
        f(transaction)?;
        transaction.touch();
        Ok(transaction.clone())
    }

    /// Apply a lifecycle transition, validating legality under the lock
    ///
    /// # Errors
    ///
    /// * `NotFound` if no record exists for `id`
    /// * `InvalidStateTransition` if the move is illegal; the record is
    ///   unchanged
    pub fn transition(
        &self,
        id: TransactionId,
        next: TransactionStatus,
        operation: &str,
    ) -> Result<Transaction, CommerceError> {
        self.update(id, |transaction| {
            if !transaction.status.can_transition(next) {
                return Err(CommerceError::invalid_transition(
                    id,
                    transaction.status,
                    operation,
                ));
            }
            transaction.status = next;
            Ok(())
        })
    }

    /// Ids of `awaiting_payment` records not updated since `cutoff`
    ///
    /// Input for the reconciliation sweep; the scan takes no long-lived
    /// locks beyond each shard's read guard.
    pub fn awaiting_payment_older_than(&self, cutoff: DateTime<Utc>) -> Vec<TransactionId> {
        self.transactions
            .iter()
            .filter(|entry| {
                let tx = entry.value();
                tx.status == TransactionStatus::AwaitingPayment && tx.updated_at < cutoff
            })
            .map(|entry| *entry.key())
            .collect()
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// Whether the store holds no records
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        PayerContact, PaymentMethod, TransactionKind, TransactionMetadata,
    };
    use rust_decimal::Decimal;

    fn sample(payable: Decimal) -> Transaction {
        Transaction::new(
            TransactionKind::Donation,
            "annual-fund".to_string(),
            PayerContact {
                name: "A. Donor".to_string(),
                email: "donor@example.org".to_string(),
                phone: None,
            },
            1,
            "USD".to_string(),
            payable,
            Decimal::ZERO,
            payable,
            PaymentMethod::Card,
            false,
            TransactionMetadata::default(),
        )
    }

    #[test]
    fn test_insert_and_get() {
        let store = TransactionStore::new();
        let tx = sample(Decimal::new(5000, 2));
        let id = store.insert(tx.clone());

        let loaded = store.get(id).unwrap();
        assert_eq!(loaded, tx);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_get_missing_returns_none() {
        let store = TransactionStore::new();
        assert!(store.get(uuid::Uuid::new_v4()).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_update_missing_is_not_found() {
        let store = TransactionStore::new();
        let id = uuid::Uuid::new_v4();
        let result = store.update(id, |_| Ok(()));
        assert_eq!(result.unwrap_err(), CommerceError::not_found(id));
    }

    #[test]
    fn test_update_error_leaves_record_unchanged() {
        let store = TransactionStore::new();
        let id = store.insert(sample(Decimal::new(5000, 2)));
        let before = store.get(id).unwrap();

        let result = store.update(id, |tx| {
            // Checks precede mutations, so this error means no change.
            if tx.payable_amount > Decimal::ZERO {
                return Err(CommerceError::validation("rejected"));
            }
            tx.failure_reason = Some("unreachable".to_string());
            Ok(())
        });

        assert!(result.is_err());
        assert_eq!(store.get(id).unwrap(), before);
    }

    #[test]
    fn test_update_advances_updated_at() {
        let store = TransactionStore::new();
        let id = store.insert(sample(Decimal::new(5000, 2)));
        let before = store.get(id).unwrap().updated_at;

        let updated = store
            .update(id, |tx| {
                tx.failure_reason = Some("declined".to_string());
                Ok(())
            })
            .unwrap();

        assert!(updated.updated_at >= before);
    }

    #[test]
    fn test_transition_legal_and_illegal() {
        let store = TransactionStore::new();
        let id = store.insert(sample(Decimal::new(5000, 2)));

        let updated = store
            .transition(id, TransactionStatus::AwaitingPayment, "create handle")
            .unwrap();
        assert_eq!(updated.status, TransactionStatus::AwaitingPayment);

        let result = store.transition(id, TransactionStatus::Refunded, "refund");
        assert!(matches!(
            result,
            Err(CommerceError::InvalidStateTransition { .. })
        ));
        assert_eq!(
            store.get(id).unwrap().status,
            TransactionStatus::AwaitingPayment
        );
    }

    #[test]
    fn test_awaiting_payment_older_than() {
        let store = TransactionStore::new();
        let stale = store.insert(sample(Decimal::new(5000, 2)));
        store
            .transition(stale, TransactionStatus::AwaitingPayment, "create handle")
            .unwrap();
        let fresh_pending = store.insert(sample(Decimal::new(1000, 2)));

        let cutoff = Utc::now() + chrono::Duration::seconds(1);
        let flagged = store.awaiting_payment_older_than(cutoff);

        assert_eq!(flagged, vec![stale]);
        assert!(!flagged.contains(&fresh_pending));
    }

    #[test]
    fn test_concurrent_updates_same_record() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(TransactionStore::new());
        let id = store.insert(sample(Decimal::new(10000, 2)));
        store
            .transition(id, TransactionStatus::AwaitingPayment, "create handle")
            .unwrap();
        store
            .transition(id, TransactionStatus::Paid, "confirm payment")
            .unwrap();

        let mut handles = vec![];

        // 100 threads each append one refund entry of 1.00 under the lock.
        for i in 0..100u32 {
            let store_clone = Arc::clone(&store);
            let handle = thread::spawn(move || {
                store_clone
                    .update(id, |tx| {
                        tx.refunds.push(crate::types::RefundEntry {
                            amount: Decimal::new(100, 2),
                            reason: format!("chunk {i}"),
                            provider_refund_id: format!("re_{i}"),
                            processed_at: Utc::now(),
                            processed_by: "admin@example.org".to_string(),
                        });
                        Ok(())
                    })
                    .unwrap();
            });
            handles.push(handle);
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let tx = store.get(id).unwrap();
        assert_eq!(tx.refunds.len(), 100);
        assert_eq!(tx.sum_refunded(), Decimal::new(10000, 2));
    }

    #[test]
    fn test_concurrent_operations_different_records() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(TransactionStore::new());
        let ids: Vec<_> = (0..10)
            .map(|_| store.insert(sample(Decimal::new(5000, 2))))
            .collect();

        let mut handles = vec![];
        for id in ids.clone() {
            let store_clone = Arc::clone(&store);
            let handle = thread::spawn(move || {
                store_clone
                    .transition(id, TransactionStatus::AwaitingPayment, "create handle")
                    .unwrap();
            });
            handles.push(handle);
        }

        for handle in handles {
            handle.join().unwrap();
        }

        for id in ids {
            assert_eq!(
                store.get(id).unwrap().status,
                TransactionStatus::AwaitingPayment
            );
        }
    }
}
