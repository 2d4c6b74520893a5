//! Error types for the commerce engine
//!
//! This module defines all error types that can occur while processing a
//! payable submission, a payment confirmation, or a refund.
//!
//! # Error Categories
//!
//! - **Caller mistakes**: `Validation`, `InvalidAmount` — returned
//!   synchronously, never retried, never logged as incidents.
//! - **Lifecycle errors**: `NotFound`, `InvalidStateTransition` — the record
//!   is left untouched.
//! - **Capacity outcomes**: `CapacityExceeded` — an explicit outcome of
//!   admission control surfaced to the submitter, not an incident.
//! - **Provider failures**: `ProviderUnavailable`, `ProviderRejected`,
//!   `ProviderTransient` — normalized at the adapter boundary; transient
//!   failures are retryable by the caller.
//! - **Refund failures**: `RefundFailed` — terminal for the attempt; the
//!   transaction keeps its prior state.

use rust_decimal::Decimal;
use thiserror::Error;

use super::transaction::{TransactionId, TransactionStatus};
use crate::provider::ProviderError;

/// Main error type for the commerce engine
///
/// Each variant carries enough context to diagnose the failure without
/// consulting the record again.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommerceError {
    /// Malformed input that never reaches the store
    #[error("validation failed: {message}")]
    Validation {
        /// Description of what was wrong with the input
        message: String,
    },

    /// No transaction exists with the given id
    #[error("transaction {id} not found")]
    NotFound {
        /// The id that was looked up
        id: TransactionId,
    },

    /// The requested operation is not legal in the record's current state
    ///
    /// The record is guaranteed to be unchanged.
    #[error("cannot {operation} transaction {id} in state {from}")]
    InvalidStateTransition {
        /// Transaction id
        id: TransactionId,
        /// State the record was in when the operation was attempted
        from: TransactionStatus,
        /// The operation that was rejected
        operation: String,
    },

    /// Admission was rejected because the subject is at capacity
    ///
    /// Not an incident: this is the explicit "event is full" outcome for
    /// submissions that disallow waitlisting.
    #[error("{subject} is full: requested {requested}, {remaining} remaining")]
    CapacityExceeded {
        /// The capacity-bounded subject (event id)
        subject: String,
        /// Quantity that was requested
        requested: u32,
        /// Capacity remaining at decision time
        remaining: u32,
    },

    /// A refund amount is non-positive or exceeds what remains refundable
    #[error("invalid refund amount {requested}: {refundable} refundable")]
    InvalidAmount {
        /// Amount the caller asked for
        requested: Decimal,
        /// Amount still refundable on the record
        refundable: Decimal,
    },

    /// The selected provider has no credentials configured
    #[error("payment provider '{provider}' is not configured (transaction {transaction})")]
    ProviderUnavailable {
        /// Adapter name
        provider: String,
        /// Transaction the call was made for
        transaction: TransactionId,
    },

    /// The provider declined the request; terminal for this attempt
    ///
    /// The decline reason is also stored on the record for operator
    /// visibility.
    #[error("payment provider '{provider}' rejected transaction {transaction}: {reason}")]
    ProviderRejected {
        /// Adapter name
        provider: String,
        /// Transaction the call was made for
        transaction: TransactionId,
        /// Provider-reported reason
        reason: String,
    },

    /// A retryable provider condition (timeout, connect failure, 5xx)
    ///
    /// The record is unchanged; the caller decides whether and when to
    /// retry. The engine never loops internally.
    #[error("transient failure from provider '{provider}' for transaction {transaction}: {reason}")]
    ProviderTransient {
        /// Adapter name
        provider: String,
        /// Transaction the call was made for
        transaction: TransactionId,
        /// Description of the transient condition
        reason: String,
    },

    /// A refund attempt failed at the provider; the record keeps its prior
    /// state and no refund entry is appended
    #[error("refund of transaction {transaction} failed: {reason}")]
    RefundFailed {
        /// Transaction the refund was attempted on
        transaction: TransactionId,
        /// Provider-reported or local reason
        reason: String,
    },

    /// Startup-time configuration fault
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the fault
        message: String,
    },
}

impl CommerceError {
    /// Create a Validation error
    pub fn validation(message: impl Into<String>) -> Self {
        CommerceError::Validation {
            message: message.into(),
        }
    }

    /// Create a NotFound error
    pub fn not_found(id: TransactionId) -> Self {
        CommerceError::NotFound { id }
    }

    /// Create an InvalidStateTransition error
    pub fn invalid_transition(id: TransactionId, from: TransactionStatus, operation: &str) -> Self {
        CommerceError::InvalidStateTransition {
            id,
            from,
            operation: operation.to_string(),
        }
    }

    /// Create a CapacityExceeded error
    pub fn capacity_exceeded(subject: &str, requested: u32, remaining: u32) -> Self {
        CommerceError::CapacityExceeded {
            subject: subject.to_string(),
            requested,
            remaining,
        }
    }

    /// Create an InvalidAmount error
    pub fn invalid_amount(requested: Decimal, refundable: Decimal) -> Self {
        CommerceError::InvalidAmount {
            requested,
            refundable,
        }
    }

    /// Create a RefundFailed error
    pub fn refund_failed(transaction: TransactionId, reason: impl Into<String>) -> Self {
        CommerceError::RefundFailed {
            transaction,
            reason: reason.into(),
        }
    }

    /// Normalize an adapter error raised while creating a payment handle
    ///
    /// Used on the submission path: the three provider error kinds map
    /// one-to-one. Refund-only adapter errors cannot occur here and are
    /// mapped conservatively to `ProviderRejected`.
    pub fn from_provider(provider: &str, transaction: TransactionId, error: ProviderError) -> Self {
        match error {
            ProviderError::Unavailable => CommerceError::ProviderUnavailable {
                provider: provider.to_string(),
                transaction,
            },
            ProviderError::Transient { reason } => CommerceError::ProviderTransient {
                provider: provider.to_string(),
                transaction,
                reason,
            },
            ProviderError::Rejected { reason } => CommerceError::ProviderRejected {
                provider: provider.to_string(),
                transaction,
                reason,
            },
            other => CommerceError::ProviderRejected {
                provider: provider.to_string(),
                transaction,
                reason: other.to_string(),
            },
        }
    }
}
