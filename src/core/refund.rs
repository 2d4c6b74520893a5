//! Refund orchestration
//!
//! Full and partial refunds against `paid` (or `partially_refunded`)
//! transactions. The money movement is the dangerous step: the record's
//! async lock is held across the provider call, so concurrent refund
//! attempts against the same transaction are serialized and the refundable
//! remainder can never be spent twice.
//!
//! Failure handling follows the money:
//!
//! * validation failures and illegal states leave the record untouched
//! * a transient provider failure leaves the record untouched and is
//!   retryable by the caller — the engine never retries a money movement
//!   internally
//! * any other provider failure surfaces as `RefundFailed`, record
//!   untouched
//! * once the provider accepts the refund, the entry is appended and the
//!   status recomputed; the audit write is retried, but never unwinds the
//!   persisted transition

use rust_decimal::Decimal;
use serde_json::json;

use crate::audit::{AuditEvent, AuditEventType, AuditSeverity};
use crate::provider::ProviderError;
use crate::types::{
    CommerceError, RefundEntry, TransactionId, TransactionStatus,
};

use super::engine::CommerceEngine;

/// Outcome of a processed refund
#[derive(Debug, Clone, PartialEq)]
pub struct RefundResult {
    pub transaction_id: TransactionId,
    pub provider_refund_id: String,
    pub refunded_amount: Decimal,
    /// `refunded` when the cumulative refunds reach the payable amount,
    /// `partially_refunded` otherwise
    pub status: TransactionStatus,
}

impl CommerceEngine {
    /// Refund `amount` (or the full remaining amount) of a transaction
    ///
    /// # Errors
    ///
    /// * `NotFound` — no such transaction
    /// * `InvalidStateTransition` — the record is not `paid` or
    ///   `partially_refunded`
    /// * `InvalidAmount` — non-positive, or the cumulative refunds would
    ///   exceed the payable amount
    /// * `ProviderTransient` — retryable; nothing was recorded
    /// * `RefundFailed` — the provider refused; nothing was recorded
    pub async fn refund(
        &self,
        id: TransactionId,
        amount: Option<Decimal>,
        reason: &str,
        actor: &str,
    ) -> Result<RefundResult, CommerceError> {
        // Held across the provider call: a second refund of the same
        // record waits here and re-reads the reduced remainder.
        let _guard = self.locks().acquire(id).await;

        let snapshot = self
            .store()
            .get(id)
            .ok_or_else(|| CommerceError::not_found(id))?;
        if !matches!(
            snapshot.status,
            TransactionStatus::Paid | TransactionStatus::PartiallyRefunded
        ) {
            return Err(CommerceError::invalid_transition(
                id,
                snapshot.status,
                "refund",
            ));
        }

        let remaining = snapshot.remaining_refundable();
        let requested = amount.unwrap_or(remaining);
        if requested <= Decimal::ZERO || requested > remaining {
            return Err(CommerceError::invalid_amount(requested, remaining));
        }

        let handle = snapshot
            .provider_handle
            .clone()
            .ok_or_else(|| CommerceError::refund_failed(id, "transaction has no provider handle"))?;
        let gateway = self.gateway_for(snapshot.payment_method)?;

        let provider_refund = match tokio::time::timeout(
            self.provider_timeout(),
            gateway.refund(&handle, Some(requested), reason),
        )
        .await
        {
            Ok(Ok(refund)) => refund,
            Ok(Err(ProviderError::Transient { reason })) => {
                tracing::warn!(transaction = %id, %reason, "transient failure during refund");
                return Err(CommerceError::ProviderTransient {
                    provider: gateway.name().to_string(),
                    transaction: id,
                    reason,
                });
            }
            Ok(Err(error)) => {
                tracing::warn!(transaction = %id, error = %error, "refund refused by provider");
                return Err(CommerceError::refund_failed(id, error.to_string()));
            }
            Err(_) => {
                return Err(CommerceError::ProviderTransient {
                    provider: gateway.name().to_string(),
                    transaction: id,
                    reason: "no response within the provider timeout".to_string(),
                });
            }
        };

        if provider_refund.refunded_amount != requested {
            tracing::warn!(
                transaction = %id,
                requested = %requested,
                echoed = %provider_refund.refunded_amount,
                "provider echoed a different refund amount"
            );
        }

        let entry = RefundEntry {
            amount: requested,
            reason: reason.to_string(),
            provider_refund_id: provider_refund.provider_refund_id.clone(),
            processed_at: chrono::Utc::now(),
            processed_by: actor.to_string(),
        };
        let updated = self.store().update(id, |transaction| {
            transaction.refunds.push(entry.clone());
            transaction.status = if transaction.sum_refunded() >= transaction.payable_amount {
                TransactionStatus::Refunded
            } else {
                TransactionStatus::PartiallyRefunded
            };
            Ok(())
        })?;

        tracing::info!(
            transaction = %id,
            amount = %requested,
            status = %updated.status,
            actor,
            "refund processed"
        );
        self.emit_audit(AuditEvent::new(
            AuditEventType::RefundProcessed,
            format!(
                "refund of {} {} processed ({reason})",
                requested, updated.currency
            ),
            actor,
            AuditSeverity::Info,
            json!({
                "transaction": id,
                "amount": requested,
                "reason": reason,
                "provider_refund_id": provider_refund.provider_refund_id.clone(),
                "status": updated.status,
            }),
        ))
        .await;
        self.send_notification(
            "refund_processed",
            &updated.payer.email,
            json!({ "transaction": id, "amount": requested }),
        )
        .await;

        Ok(RefundResult {
            transaction_id: id,
            provider_refund_id: provider_refund.provider_refund_id,
            refunded_amount: requested,
            status: updated.status,
        })
    }
}
