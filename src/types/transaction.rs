//! Transaction-related types for the commerce engine
//!
//! This module defines the `Transaction` record shared by the three payable
//! intents (donations, shop orders, event registrations), the lifecycle
//! state machine on `TransactionStatus`, and the fixed metadata structure
//! attached to each record.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::error::CommerceError;

/// Transaction identifier
///
/// Assigned at creation (UUID v4) and immutable afterwards.
pub type TransactionId = Uuid;

/// Version stamped on every [`TransactionMetadata`] value
pub const METADATA_VERSION: u16 = 1;

/// The three payable intents tracked by the engine
///
/// All three kinds share one record shape and one lifecycle; kind-specific
/// validation happens at the boundary before a record is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// A one-off or recurring gift against a campaign tag
    Donation,
    /// A merchandise purchase against a product list
    Order,
    /// An event registration against a capacity-bounded event
    Registration,
}

/// How the payer settles the transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Card-based intent provider
    Card,
    /// Mobile-money push provider (requires a payer phone number)
    MobileMoney,
    /// Nothing to settle: the payable amount is zero
    Free,
}

/// Lifecycle states of a transaction
///
/// Transitions are validated by [`TransactionStatus::can_transition`]; a
/// record is never physically deleted, and cancellation is a status value,
/// not a row removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Created, no provider contact yet
    Pending,
    /// A provider handle exists; waiting for the payer to complete payment
    AwaitingPayment,
    /// Settled without provider contact (zero payable amount)
    Confirmed,
    /// The provider confirmed the payment
    Paid,
    /// Some, but not all, of the payable amount has been refunded
    PartiallyRefunded,
    /// The full payable amount has been refunded; terminal
    Refunded,
    /// The provider declined or the payment timed out; re-openable only by
    /// superseding the old handle with a fresh one
    Failed,
    /// Administratively cancelled; terminal
    Cancelled,
}

impl TransactionStatus {
    /// Whether `self -> next` is a legal lifecycle transition
    ///
    /// The legal edges:
    ///
    /// ```text
    /// pending ──────────────► confirmed              (zero payable amount)
    /// pending ──────────────► awaiting_payment       (handle created)
    /// awaiting_payment ─────► paid | failed
    /// failed ───────────────► awaiting_payment       (re-open, new handle)
    /// paid ─────────────────► refunded | partially_refunded
    /// partially_refunded ───► partially_refunded | refunded
    /// any except refunded ──► cancelled
    /// ```
    ///
    /// Re-confirming an already-`paid` record is handled as an idempotent
    /// no-op by the engine, not as a transition.
    pub fn can_transition(self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        match (self, next) {
            (Pending, Confirmed) | (Pending, AwaitingPayment) => true,
            (AwaitingPayment, Paid) | (AwaitingPayment, Failed) => true,
            // Re-open path: the engine supersedes the old handle first.
            (Failed, AwaitingPayment) => true,
            (Paid, Refunded) | (Paid, PartiallyRefunded) => true,
            (PartiallyRefunded, PartiallyRefunded) | (PartiallyRefunded, Refunded) => true,
            (Refunded, _) | (Cancelled, _) => false,
            (_, Cancelled) => true,
            _ => false,
        }
    }

    /// Stable snake_case name, matching the serialized form
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::AwaitingPayment => "awaiting_payment",
            TransactionStatus::Confirmed => "confirmed",
            TransactionStatus::Paid => "paid",
            TransactionStatus::PartiallyRefunded => "partially_refunded",
            TransactionStatus::Refunded => "refunded",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contact details of the payer
///
/// The email is the natural external lookup key but is not unique across
/// transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayerContact {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

/// One processed refund, appended by the refund orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundEntry {
    /// Amount refunded by this entry
    pub amount: Decimal,
    /// Operator-supplied reason
    pub reason: String,
    /// The provider's refund identifier
    pub provider_refund_id: String,
    /// When the provider accepted the refund
    pub processed_at: DateTime<Utc>,
    /// The administrator (or system actor) who issued it
    pub processed_by: String,
}

/// A line item on a shop order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
}

/// Fixed, versioned metadata attached to a transaction
///
/// Known optional fields per kind, validated at the boundary — not an
/// open-ended dictionary threaded through the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionMetadata {
    /// Structure version, for forward-compatible persistence
    pub version: u16,
    /// Campaign tag (donations only)
    pub campaign: Option<String>,
    /// Line items (orders only)
    pub order_items: Option<Vec<OrderItem>>,
    /// Ticket class (registrations only)
    pub ticket_type: Option<String>,
    /// Free-form note from the submission form (any kind)
    pub note: Option<String>,
}

impl Default for TransactionMetadata {
    fn default() -> Self {
        TransactionMetadata {
            version: METADATA_VERSION,
            campaign: None,
            order_items: None,
            ticket_type: None,
            note: None,
        }
    }
}

impl TransactionMetadata {
    /// Validate that only the fields belonging to `kind` are populated
    pub fn validate_for(&self, kind: TransactionKind) -> Result<(), CommerceError> {
        let reject = |field: &str| {
            Err(CommerceError::validation(format!(
                "metadata field '{field}' is not valid for {kind:?} transactions"
            )))
        };
        match kind {
            TransactionKind::Donation => {
                if self.order_items.is_some() {
                    return reject("order_items");
                }
                if self.ticket_type.is_some() {
                    return reject("ticket_type");
                }
            }
            TransactionKind::Order => {
                if self.campaign.is_some() {
                    return reject("campaign");
                }
                if self.ticket_type.is_some() {
                    return reject("ticket_type");
                }
                if let Some(items) = &self.order_items {
                    if items.is_empty() {
                        return Err(CommerceError::validation("order_items must not be empty"));
                    }
                    if items.iter().any(|item| item.quantity == 0) {
                        return Err(CommerceError::validation(
                            "order item quantities must be at least 1",
                        ));
                    }
                }
            }
            TransactionKind::Registration => {
                if self.campaign.is_some() {
                    return reject("campaign");
                }
                if self.order_items.is_some() {
                    return reject("order_items");
                }
            }
        }
        Ok(())
    }
}

/// The outcome of an admission decision, recorded on registrations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionOutcome {
    /// Capacity was reserved for the requested quantity
    Admitted,
    /// Capacity was exhausted; the request joined the waitlist
    Waitlisted,
    /// Capacity was exhausted and waitlisting was disallowed
    Rejected,
}

/// A single payable intent tracked through the lifecycle state machine
///
/// Mutated only through the store's closure-based `update`, which
/// serializes all writers per record and keeps `updated_at` monotonically
/// non-decreasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Opaque unique identifier, immutable after creation
    pub id: TransactionId,
    pub kind: TransactionKind,
    /// Reference to the thing being paid for (campaign tag, product list,
    /// event id) — opaque to the engine
    pub subject: String,
    pub payer: PayerContact,
    /// Ticket count, or 1 for donations
    pub quantity: u32,
    /// Fixed ISO currency code
    pub currency: String,
    pub base_amount: Decimal,
    pub discount_amount: Decimal,
    /// `max(0, base_amount - discount_amount)`
    pub payable_amount: Decimal,
    pub payment_method: PaymentMethod,
    /// Provider-side handle; set at most once and never mutated in place.
    /// Re-opening a failed record moves the old handle into
    /// `superseded_handles` before a new one is attached.
    pub provider_handle: Option<String>,
    /// Client secret or payment reference returned alongside the handle,
    /// persisted so retries of the submission surface the same value
    pub provider_reference: Option<String>,
    /// Handles replaced by the re-open path, oldest first
    pub superseded_handles: Vec<String>,
    pub status: TransactionStatus,
    /// Append-only refund history
    pub refunds: Vec<RefundEntry>,
    /// Last provider decline reason, for operator visibility
    pub failure_reason: Option<String>,
    /// Recorded flag only; recurring billing itself is out of scope
    pub recurring: bool,
    /// Admission outcome, for registrations
    pub admission: Option<AdmissionOutcome>,
    pub metadata: TransactionMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Create a new `pending` transaction
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kind: TransactionKind,
        subject: String,
        payer: PayerContact,
        quantity: u32,
        currency: String,
        base_amount: Decimal,
        discount_amount: Decimal,
        payable_amount: Decimal,
        payment_method: PaymentMethod,
        recurring: bool,
        metadata: TransactionMetadata,
    ) -> Self {
        let now = Utc::now();
        Transaction {
            id: Uuid::new_v4(),
            kind,
            subject,
            payer,
            quantity,
            currency,
            base_amount,
            discount_amount,
            payable_amount,
            payment_method,
            provider_handle: None,
            provider_reference: None,
            superseded_handles: Vec::new(),
            status: TransactionStatus::Pending,
            refunds: Vec::new(),
            failure_reason: None,
            recurring,
            admission: None,
            metadata,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sum of all refund entry amounts
    pub fn sum_refunded(&self) -> Decimal {
        self.refunds.iter().map(|entry| entry.amount).sum()
    }

    /// Amount still refundable: `payable_amount - sum_refunded()`
    pub fn remaining_refundable(&self) -> Decimal {
        self.payable_amount - self.sum_refunded()
    }

    /// Advance `updated_at`, keeping it monotonically non-decreasing even
    /// if the wall clock stepped backwards
    pub fn touch(&mut self) {
        self.updated_at = Utc::now().max(self.updated_at);
    }
}
