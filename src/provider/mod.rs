//! Payment provider abstraction
//!
//! One interface over two backends: a card-based intent provider
//! ([`card::CardGateway`]) and a mobile-money push provider
//! ([`mobile_money::MobileMoneyGateway`]). Business logic selects a gateway
//! by payment method and never branches on provider-specific shapes; every
//! provider error is normalized into [`ProviderError`] at this boundary.

pub mod card;
pub mod mobile_money;

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::types::PayerContact;

pub use card::{CardCredentials, CardGateway};
pub use mobile_money::{MobileMoneyCredentials, MobileMoneyGateway};

/// Normalized provider failure kinds
///
/// Callers branch on these five kinds only; the raw provider response never
/// escapes an adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The provider's credentials are not configured
    #[error("provider credentials are not configured")]
    Unavailable,

    /// The provider declined the request (invalid amount, bad currency, ...)
    #[error("provider rejected the request: {reason}")]
    Rejected {
        /// Provider-reported reason
        reason: String,
    },

    /// A retryable network or server-side condition (timeout, connect
    /// failure, 5xx)
    #[error("transient provider failure: {reason}")]
    Transient {
        /// Description of the condition
        reason: String,
    },

    /// The handle has no successful capture to refund against
    #[error("not refundable: {reason}")]
    NotRefundable {
        /// Provider-reported reason
        reason: String,
    },

    /// The requested amount would exceed what remains refundable
    #[error("refund exceeds the refundable remainder: {reason}")]
    AlreadyRefunded {
        /// Provider-reported reason
        reason: String,
    },
}

impl ProviderError {
    /// Normalize a transport-level reqwest error
    ///
    /// Timeouts and connect failures are transient; anything else without a
    /// status code is treated as transient too, because the outcome at the
    /// provider is unknown and must be reconciled rather than assumed.
    pub(crate) fn from_transport(error: reqwest::Error) -> Self {
        ProviderError::Transient {
            reason: error.to_string(),
        }
    }

    /// Normalize a non-success HTTP status: 5xx is transient, 4xx is a
    /// rejection with the provider's message attached
    pub(crate) fn from_status(status: reqwest::StatusCode, message: String) -> Self {
        if status.is_server_error() {
            ProviderError::Transient {
                reason: format!("provider returned {status}: {message}"),
            }
        } else {
            ProviderError::Rejected { reason: message }
        }
    }
}

/// Request to prepare a charge with a provider
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    /// Amount in major units, at most two decimal places
    pub amount: Decimal,
    /// ISO currency code
    pub currency: String,
    /// The engine-side transaction id, passed through as provider metadata
    /// so callbacks can be correlated
    pub reference: String,
    pub customer: PayerContact,
}

/// The provider-side object prepared for a charge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentHandle {
    /// Opaque provider identifier (intent id, checkout reference)
    pub handle_id: String,
    /// Client secret or payment reference the form layer hands to the payer
    pub client_reference: String,
}

/// A refund accepted by the provider
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRefund {
    pub provider_refund_id: String,
    pub refunded_amount: Decimal,
}

/// Uniform interface over the payment providers
///
/// Both operations may suspend on network I/O; the engine wraps each call
/// in a bounded timeout and treats expiry as [`ProviderError::Transient`].
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Short adapter name used in logs and error context
    fn name(&self) -> &'static str;

    /// Prepare a provider-side payment object for the given charge
    ///
    /// For the card provider this creates a payment intent immediately.
    /// For the mobile-money provider the handle is minted without network
    /// I/O and the payer-facing push prompt is a separate, later,
    /// user-triggered step — a protocol difference, not an omission.
    async fn create_payment_handle(
        &self,
        request: &ChargeRequest,
    ) -> Result<PaymentHandle, ProviderError>;

    /// Refund against a previously captured handle
    ///
    /// `amount` of `None` requests the full remaining refund.
    async fn refund(
        &self,
        handle_id: &str,
        amount: Option<Decimal>,
        reason: &str,
    ) -> Result<ProviderRefund, ProviderError>;
}

/// Convert a major-unit decimal amount to integer minor units (cents)
///
/// Fails with `Rejected` if the amount carries sub-cent precision or does
/// not fit an i64 — both are caller mistakes the provider would reject
/// anyway.
pub(crate) fn to_minor_units(amount: Decimal) -> Result<i64, ProviderError> {
    let minor = amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .ok_or_else(|| ProviderError::Rejected {
            reason: format!("amount {amount} is out of range"),
        })?;
    if !minor.fract().is_zero() {
        return Err(ProviderError::Rejected {
            reason: format!("amount {amount} has sub-cent precision"),
        });
    }
    minor.to_i64().ok_or_else(|| ProviderError::Rejected {
        reason: format!("amount {amount} is out of range"),
    })
}

/// Convert integer minor units back to a major-unit decimal
pub(crate) fn from_minor_units(minor: i64) -> Decimal {
    Decimal::new(minor, 2)
}
