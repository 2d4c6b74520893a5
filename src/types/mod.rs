//! Types module
//!
//! Contains core data structures used throughout the engine.
//! This module organizes types into logical submodules:
//! - `transaction`: the transaction record, lifecycle states, and metadata
//! - `capacity`: capacity ledger counters for admission control
//! - `error`: error types for the commerce engine

pub mod capacity;
pub mod error;
pub mod transaction;

pub use capacity::CapacityLedger;
pub use error::CommerceError;
pub use transaction::{
    AdmissionOutcome, OrderItem, PayerContact, PaymentMethod, RefundEntry, Transaction,
    TransactionId, TransactionKind, TransactionMetadata, TransactionStatus,
};
