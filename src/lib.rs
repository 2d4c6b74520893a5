//! Commerce Engine Library
//! # Overview
//!
//! This library implements the transactional core behind a nonprofit's
//! public site: it turns submitted intents — donations, shop orders, and
//! event registrations — into tracked money-movement records, coordinates
//! with the payment providers, enforces event capacity with waitlisting,
//! applies discount codes, and processes idempotent refunds with an audit
//! trail.
//!
//! # Architecture
//!
//! The system is organized into several key components:
//!
//! - [`types`] - Core data types (Transaction, CapacityLedger, errors)
//! - [`core`] - Business logic components:
//!   - [`core::engine`] - Submission and lifecycle orchestration
//!   - [`core::refund`] - Refund orchestration
//!   - [`core::transaction_store`] - Per-record serialized state
//!   - [`core::capacity`] - Atomic admission control
//!   - [`core::pricing`] - Pure amount and discount calculation
//! - [`provider`] - Payment provider adapters behind one interface
//! - [`audit`] - Append-only audit log contract
//! - [`notify`] - Fire-and-forget notification contract
//! - [`config`] - Environment-driven configuration
//!
//! # Transaction Lifecycle
//!
//! Every transaction moves through one state machine regardless of kind:
//!
//! - **pending**: created; free submissions confirm immediately
//! - **awaiting_payment**: a provider handle exists
//! - **paid** / **failed**: the provider's verdict (failed records can be
//!   re-opened with a fresh handle)
//! - **refunded** / **partially_refunded**: driven by the refund
//!   orchestrator, never by direct edits
//! - **cancelled**: administrative, reachable from every state except
//!   `refunded`
//!
//! # Concurrency
//!
//! The engine is invoked from independent request-handling tasks. State is
//! serialized per record: DashMap entry locks for synchronous mutations,
//! per-record async locks around provider I/O. The capacity ledger is only
//! ever updated atomically with the admission decision, so an event can
//! never be admitted past capacity.

// Module declarations
pub mod audit;
pub mod config;
pub mod core;
pub mod notify;
pub mod provider;
pub mod types;

pub use crate::core::{
    compute_payable, CapacityController, CommerceEngine, Discount, DiscountCatalog, DiscountKind,
    Quote, RefundResult, SubmissionReceipt, SubmissionRequest, TransactionStore,
};
pub use audit::{
    AuditEvent, AuditEventType, AuditSeverity, AuditSink, MemoryAuditSink, TracingAuditSink,
};
pub use config::EngineConfig;
pub use notify::Notifier;
pub use provider::{
    CardGateway, ChargeRequest, MobileMoneyGateway, PaymentGateway, PaymentHandle, ProviderError,
    ProviderRefund,
};
pub use types::{
    AdmissionOutcome, CapacityLedger, CommerceError, PayerContact, PaymentMethod, Transaction,
    TransactionId, TransactionKind, TransactionMetadata, TransactionStatus,
};
