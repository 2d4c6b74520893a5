//! Core business logic module
//!
//! This module contains the commerce engine's processing components:
//! - `engine` - submission, confirmation, and administrative orchestration
//! - `refund` - refund orchestration over the provider adapter
//! - `transaction_store` - per-record serialized transaction state
//! - `capacity` - atomic admission control for capacity-bounded events
//! - `pricing` - pure amount and discount calculation
//! - `locks` - per-record critical sections spanning provider calls

pub mod capacity;
pub mod engine;
pub mod locks;
pub mod pricing;
pub mod refund;
pub mod transaction_store;

pub use capacity::CapacityController;
pub use engine::{CommerceEngine, SubmissionReceipt, SubmissionRequest};
pub use pricing::{compute_payable, Discount, DiscountCatalog, DiscountKind, Quote};
pub use refund::RefundResult;
pub use transaction_store::TransactionStore;
