//! Transaction processing orchestration
//!
//! This module provides the `CommerceEngine` struct, which turns a
//! user-submitted intent (donate, buy, register) into a tracked money
//! movement: admission control for capacity-bounded events, discount
//! evaluation, record creation, and provider handle creation — plus the
//! confirmation, failure, re-open, administrative-edit, and reconciliation
//! surfaces used by callbacks and the back office.
//!
//! # Architecture
//!
//! ```text
//! CommerceEngine
//!     ├── Arc<TransactionStore>    (per-record serialized state)
//!     ├── Arc<CapacityController>  (atomic admission decisions)
//!     ├── Arc<DiscountCatalog>     (active discount codes)
//!     ├── Arc<dyn PaymentGateway>  (card + mobile-money adapters)
//!     ├── Arc<dyn AuditSink>       (append-only audit log)
//!     └── Arc<RecordLocks>         (per-record critical sections
//!                                   spanning provider calls)
//! ```
//!
//! # Thread Safety
//!
//! The engine is cloneable and safe to share across request-handling
//! tasks. Synchronous state checks run under DashMap entry locks; the
//! logical operations that suspend on provider I/O hold the record's async
//! lock for their full duration, so retries and concurrent callbacks can
//! never double-charge or double-refund a record.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;

use crate::audit::{AuditEvent, AuditEventType, AuditSeverity, AuditSink};
use crate::config::EngineConfig;
use crate::notify::Notifier;
use crate::provider::{
    CardGateway, ChargeRequest, MobileMoneyGateway, PaymentGateway, PaymentHandle, ProviderError,
};
use crate::types::{
    AdmissionOutcome, CommerceError, PayerContact, PaymentMethod, Transaction, TransactionId,
    TransactionKind, TransactionMetadata, TransactionStatus,
};

use super::capacity::CapacityController;
use super::locks::RecordLocks;
use super::pricing::DiscountCatalog;
use super::transaction_store::TransactionStore;

/// Default bound on any single provider call
const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

/// A validated submission from one of the public forms
///
/// Kind-specific field validation happens in [`CommerceEngine::submit`]
/// before any state is touched.
#[derive(Debug, Clone)]
pub struct SubmissionRequest {
    pub kind: TransactionKind,
    /// What is being paid for: campaign tag, product list id, or event id
    pub subject: String,
    pub payer: PayerContact,
    /// Ticket count; must be 1 for donations
    pub quantity: u32,
    /// Price per unit in major currency units
    pub unit_amount: Decimal,
    /// ISO currency code, e.g. `"USD"` or `"KES"`
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub discount_code: Option<String>,
    /// Whether a full event may wait-list this registration
    pub waitlist_allowed: bool,
    /// Recorded flag only
    pub recurring: bool,
    pub metadata: TransactionMetadata,
}

/// What the submitter gets back
#[derive(Debug, Clone)]
pub struct SubmissionReceipt {
    pub transaction_id: TransactionId,
    pub status: TransactionStatus,
    pub payable_amount: Decimal,
    /// Present when a provider handle was created for this submission
    pub provider_handle: Option<PaymentHandle>,
    /// Present for registrations
    pub admission: Option<AdmissionOutcome>,
    /// True when a discount code was supplied but not applied, so the form
    /// layer can tell the payer the code was ignored
    pub discount_ignored: bool,
}

/// Orchestrator for the three transaction kinds
///
/// One parametrized engine replaces per-kind copies of the same flow; the
/// kind only influences validation and capacity handling.
#[derive(Clone)]
pub struct CommerceEngine {
    store: Arc<TransactionStore>,
    capacity: Arc<CapacityController>,
    discounts: Arc<DiscountCatalog>,
    card: Arc<dyn PaymentGateway>,
    mobile_money: Arc<dyn PaymentGateway>,
    audit: Arc<dyn AuditSink>,
    notifier: Option<Arc<dyn Notifier>>,
    locks: Arc<RecordLocks>,
    provider_timeout: Duration,
}

impl CommerceEngine {
    /// Create an engine over the given gateways and audit sink
    pub fn new(
        card: Arc<dyn PaymentGateway>,
        mobile_money: Arc<dyn PaymentGateway>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        CommerceEngine {
            store: Arc::new(TransactionStore::new()),
            capacity: Arc::new(CapacityController::new()),
            discounts: Arc::new(DiscountCatalog::new()),
            card,
            mobile_money,
            audit,
            notifier: None,
            locks: Arc::new(RecordLocks::new()),
            provider_timeout: DEFAULT_PROVIDER_TIMEOUT,
        }
    }

    /// Create an engine with real gateways built from configuration
    pub fn from_config(config: &EngineConfig, audit: Arc<dyn AuditSink>) -> Self {
        let card: Arc<dyn PaymentGateway> = Arc::new(CardGateway::new(config.card.clone()));
        let mobile_money: Arc<dyn PaymentGateway> =
            Arc::new(MobileMoneyGateway::new(config.mobile_money.clone()));
        Self::new(card, mobile_money, audit)
            .with_provider_timeout(Duration::from_secs(config.provider_timeout_secs))
    }

    /// Attach a notification sender
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Override the per-call provider timeout
    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    /// The capacity controller, for event administration
    pub fn capacity(&self) -> &CapacityController {
        &self.capacity
    }

    /// The discount catalog, for promotion administration
    pub fn discounts(&self) -> &DiscountCatalog {
        &self.discounts
    }

    /// The record store
    pub fn store(&self) -> &TransactionStore {
        &self.store
    }

    pub(crate) fn locks(&self) -> &RecordLocks {
        &self.locks
    }

    pub(crate) fn provider_timeout(&self) -> Duration {
        self.provider_timeout
    }

    /// Single entry point for all three transaction kinds
    ///
    /// Control flow: validation → admission (registrations only) →
    /// pricing → record creation → provider handle creation (non-zero
    /// totals only). A zero payable amount confirms immediately without
    /// any provider contact; a wait-listed registration stays `pending`
    /// with no charge until promoted.
    ///
    /// On a provider failure the record remains `pending` (with the
    /// decline reason stored when the provider rejected the charge); a
    /// transient failure is retried by calling
    /// [`CommerceEngine::ensure_provider_handle`] with the transaction id
    /// carried in the error.
    pub async fn submit(
        &self,
        request: SubmissionRequest,
    ) -> Result<SubmissionReceipt, CommerceError> {
        self.validate(&request)?;

        let mut admission = None;
        if request.kind == TransactionKind::Registration {
            let outcome =
                self.capacity
                    .admit(&request.subject, request.quantity, request.waitlist_allowed);
            match outcome {
                AdmissionOutcome::Rejected => {
                    let remaining = self
                        .capacity
                        .snapshot(&request.subject)
                        .and_then(|ledger| ledger.remaining())
                        .unwrap_or(0);
                    return Err(CommerceError::capacity_exceeded(
                        &request.subject,
                        request.quantity,
                        remaining,
                    ));
                }
                outcome => admission = Some(outcome),
            }
        }

        let now = Utc::now();
        let quote = self.discounts.quote(
            request.unit_amount,
            request.quantity,
            request.discount_code.as_deref(),
            now,
        );
        let discount_ignored = request.discount_code.is_some() && quote.discount_amount.is_zero();
        if discount_ignored {
            tracing::debug!(
                code = request.discount_code.as_deref().unwrap_or_default(),
                "discount code not applied; proceeding without discount"
            );
        }

        if !quote.payable_amount.is_zero() && request.payment_method == PaymentMethod::Free {
            // Undo the admission this submission just reserved.
            match admission {
                Some(AdmissionOutcome::Admitted) => {
                    self.capacity.release(&request.subject, request.quantity)
                }
                Some(AdmissionOutcome::Waitlisted) => self
                    .capacity
                    .release_waitlisted(&request.subject, request.quantity),
                _ => {}
            }
            return Err(CommerceError::validation(
                "a non-zero total requires a payment method",
            ));
        }

        let gross = request.unit_amount * Decimal::from(request.quantity);
        let payment_method = if quote.payable_amount.is_zero() {
            PaymentMethod::Free
        } else {
            request.payment_method
        };

        let mut transaction = Transaction::new(
            request.kind,
            request.subject.clone(),
            request.payer.clone(),
            request.quantity,
            request.currency.clone(),
            gross,
            quote.discount_amount,
            quote.payable_amount,
            payment_method,
            request.recurring,
            request.metadata.clone(),
        );
        transaction.admission = admission;
        let id = self.store.insert(transaction);

        tracing::info!(
            transaction = %id,
            kind = ?request.kind,
            subject = %request.subject,
            payable = %quote.payable_amount,
            "transaction created"
        );
        self.emit_audit(AuditEvent::new(
            AuditEventType::TransactionCreated,
            format!("submission recorded for {}", request.subject),
            "system",
            AuditSeverity::Info,
            json!({
                "transaction": id,
                "kind": request.kind,
                "subject": request.subject.clone(),
                "payable_amount": quote.payable_amount,
            }),
        ))
        .await;

        if admission == Some(AdmissionOutcome::Waitlisted) {
            self.send_notification(
                "waitlist_joined",
                &request.payer.email,
                json!({ "transaction": id, "subject": request.subject.clone() }),
            )
            .await;
            return Ok(SubmissionReceipt {
                transaction_id: id,
                status: TransactionStatus::Pending,
                payable_amount: quote.payable_amount,
                provider_handle: None,
                admission,
                discount_ignored,
            });
        }

        if quote.payable_amount.is_zero() {
            // Free transactions confirm without contacting a provider.
            let updated =
                self.store
                    .transition(id, TransactionStatus::Confirmed, "confirm")?;
            self.emit_audit(AuditEvent::new(
                AuditEventType::TransactionConfirmed,
                "confirmed without provider contact (zero payable amount)",
                "system",
                AuditSeverity::Info,
                json!({ "transaction": id }),
            ))
            .await;
            self.send_notification(
                "submission_confirmed",
                &updated.payer.email,
                json!({ "transaction": id, "subject": updated.subject.clone() }),
            )
            .await;
            return Ok(SubmissionReceipt {
                transaction_id: id,
                status: TransactionStatus::Confirmed,
                payable_amount: quote.payable_amount,
                provider_handle: None,
                admission,
                discount_ignored,
            });
        }

        let handle = self.ensure_provider_handle(id).await?;
        Ok(SubmissionReceipt {
            transaction_id: id,
            status: TransactionStatus::AwaitingPayment,
            payable_amount: quote.payable_amount,
            provider_handle: Some(handle),
            admission,
            discount_ignored,
        })
    }

    /// Create the provider handle for a `pending` record, or return the
    /// existing one
    ///
    /// Safe to retry after an ambiguous failure: the handle slot is
    /// checked under the record's lock, so a timed-out call that did reach
    /// the provider can never be followed by a second creation.
    pub async fn ensure_provider_handle(
        &self,
        id: TransactionId,
    ) -> Result<PaymentHandle, CommerceError> {
        let _guard = self.locks.acquire(id).await;
        let snapshot = self
            .store
            .get(id)
            .ok_or_else(|| CommerceError::not_found(id))?;

        if let Some(handle_id) = &snapshot.provider_handle {
            return Ok(PaymentHandle {
                handle_id: handle_id.clone(),
                client_reference: snapshot.provider_reference.clone().unwrap_or_default(),
            });
        }
        if snapshot.status != TransactionStatus::Pending {
            return Err(CommerceError::invalid_transition(
                id,
                snapshot.status,
                "create a payment handle for",
            ));
        }
        self.attach_new_handle(&snapshot).await
    }

    /// Provider callback (or admin action) reporting a completed payment
    ///
    /// Idempotent: re-confirming a `paid` record is a no-op that emits no
    /// second audit entry.
    pub async fn confirm_payment(
        &self,
        id: TransactionId,
        actor: &str,
    ) -> Result<Transaction, CommerceError> {
        let _guard = self.locks.acquire(id).await;
        let snapshot = self
            .store
            .get(id)
            .ok_or_else(|| CommerceError::not_found(id))?;
        if snapshot.status == TransactionStatus::Paid {
            return Ok(snapshot);
        }

        let updated = self
            .store
            .transition(id, TransactionStatus::Paid, "confirm payment of")?;
        tracing::info!(transaction = %id, actor, "payment confirmed");
        self.emit_audit(AuditEvent::new(
            AuditEventType::PaymentConfirmed,
            format!(
                "payment of {} {} confirmed",
                updated.payable_amount, updated.currency
            ),
            actor,
            AuditSeverity::Info,
            json!({
                "transaction": id,
                "amount": updated.payable_amount,
                "currency": updated.currency.clone(),
            }),
        ))
        .await;
        self.send_notification(
            "payment_received",
            &updated.payer.email,
            json!({ "transaction": id, "amount": updated.payable_amount }),
        )
        .await;
        Ok(updated)
    }

    /// Provider callback (or admin action) reporting a declined payment
    pub async fn mark_failed(
        &self,
        id: TransactionId,
        reason: &str,
        actor: &str,
    ) -> Result<Transaction, CommerceError> {
        let _guard = self.locks.acquire(id).await;
        let updated = self.store.update(id, |transaction| {
            if !transaction.status.can_transition(TransactionStatus::Failed) {
                return Err(CommerceError::invalid_transition(
                    id,
                    transaction.status,
                    "fail",
                ));
            }
            transaction.status = TransactionStatus::Failed;
            transaction.failure_reason = Some(reason.to_string());
            Ok(())
        })?;

        tracing::warn!(transaction = %id, reason, "payment failed");
        self.emit_audit(AuditEvent::new(
            AuditEventType::PaymentFailed,
            format!("payment failed: {reason}"),
            actor,
            AuditSeverity::Warning,
            json!({ "transaction": id, "reason": reason }),
        ))
        .await;
        Ok(updated)
    }

    /// Administrative re-open of a `failed` record
    ///
    /// The old handle is superseded — moved aside, never overwritten in
    /// place — and a fresh one is created, returning the record to
    /// `awaiting_payment`.
    pub async fn reopen(
        &self,
        id: TransactionId,
        actor: &str,
    ) -> Result<PaymentHandle, CommerceError> {
        let _guard = self.locks.acquire(id).await;
        let snapshot = self
            .store
            .get(id)
            .ok_or_else(|| CommerceError::not_found(id))?;
        if snapshot.status != TransactionStatus::Failed {
            return Err(CommerceError::invalid_transition(
                id,
                snapshot.status,
                "reopen",
            ));
        }

        let cleared = self.store.update(id, |transaction| {
            if let Some(old) = transaction.provider_handle.take() {
                transaction.superseded_handles.push(old);
            }
            transaction.provider_reference = None;
            Ok(())
        })?;

        let handle = self.attach_new_handle(&cleared).await?;
        self.emit_audit(AuditEvent::new(
            AuditEventType::TransactionReopened,
            "failed transaction re-opened with a fresh payment handle",
            actor,
            AuditSeverity::Info,
            json!({ "transaction": id, "handle": handle.handle_id.clone() }),
        ))
        .await;
        Ok(handle)
    }

    /// Snapshot of a record
    pub fn get_status(&self, id: TransactionId) -> Result<Transaction, CommerceError> {
        self.store
            .get(id)
            .ok_or_else(|| CommerceError::not_found(id))
    }

    /// Administrative status edit, subject to lifecycle legality
    ///
    /// Refund states are reachable only through the refund orchestrator;
    /// an admin edit cannot fabricate a refund. Cancelling a registration
    /// frees the capacity it held.
    pub async fn admin_update_status(
        &self,
        id: TransactionId,
        new_status: TransactionStatus,
        actor: &str,
    ) -> Result<Transaction, CommerceError> {
        if matches!(
            new_status,
            TransactionStatus::Refunded | TransactionStatus::PartiallyRefunded
        ) {
            return Err(CommerceError::validation(
                "refund states are reachable only through the refund orchestrator",
            ));
        }

        let _guard = self.locks.acquire(id).await;
        let before = self
            .store
            .get(id)
            .ok_or_else(|| CommerceError::not_found(id))?;
        let updated = self
            .store
            .transition(id, new_status, "administratively update")?;

        if new_status == TransactionStatus::Cancelled
            && updated.kind == TransactionKind::Registration
        {
            match updated.admission {
                Some(AdmissionOutcome::Admitted) => {
                    self.capacity.release(&updated.subject, updated.quantity)
                }
                Some(AdmissionOutcome::Waitlisted) => self
                    .capacity
                    .release_waitlisted(&updated.subject, updated.quantity),
                _ => {}
            }
        }

        tracing::info!(transaction = %id, from = %before.status, to = %updated.status, actor, "status updated");
        self.emit_audit(AuditEvent::new(
            AuditEventType::StatusChanged,
            format!("status changed from {} to {}", before.status, updated.status),
            actor,
            AuditSeverity::Info,
            json!({
                "transaction": id,
                "from": before.status,
                "to": updated.status,
            }),
        ))
        .await;
        Ok(updated)
    }

    /// Flag `awaiting_payment` records older than `older_than` to the
    /// audit log for operator reconciliation
    ///
    /// A stale record means the provider never called back — or the
    /// callback was lost. The sweep never transitions records, because a
    /// timeout is not evidence of failure; it only makes the stuck set
    /// visible. Intended to be scheduled by the embedder.
    pub async fn reconcile_stale(&self, older_than: chrono::Duration) -> Vec<TransactionId> {
        let cutoff = Utc::now() - older_than;
        let stale = self.store.awaiting_payment_older_than(cutoff);
        if stale.is_empty() {
            return stale;
        }

        tracing::warn!(
            count = stale.len(),
            "flagging stale awaiting_payment transactions for reconciliation"
        );
        let audits = stale.iter().map(|id| {
            self.emit_audit(AuditEvent::new(
                AuditEventType::ReconciliationFlagged,
                format!("transaction {id} still awaiting payment past the reconciliation window"),
                "system",
                AuditSeverity::Warning,
                json!({ "transaction": id }),
            ))
        });
        futures::future::join_all(audits).await;
        stale
    }

    /// Validate a submission before any state is touched
    fn validate(&self, request: &SubmissionRequest) -> Result<(), CommerceError> {
        if request.quantity == 0 {
            return Err(CommerceError::validation("quantity must be at least 1"));
        }
        if request.kind == TransactionKind::Donation && request.quantity != 1 {
            return Err(CommerceError::validation(
                "donations always have a quantity of 1",
            ));
        }
        if request.unit_amount < Decimal::ZERO {
            return Err(CommerceError::validation("unit amount must not be negative"));
        }
        if request.unit_amount.normalize().scale() > 2 {
            return Err(CommerceError::validation(
                "unit amount must have at most 2 decimal places",
            ));
        }
        if request.currency.len() != 3
            || !request.currency.chars().all(|c| c.is_ascii_uppercase())
        {
            return Err(CommerceError::validation(
                "currency must be a 3-letter ISO code",
            ));
        }
        if request.payer.name.trim().is_empty() {
            return Err(CommerceError::validation("payer name is required"));
        }
        if !request.payer.email.contains('@') {
            return Err(CommerceError::validation("payer email is invalid"));
        }
        if request.payment_method == PaymentMethod::MobileMoney
            && request
                .payer
                .phone
                .as_deref()
                .map_or(true, |phone| phone.trim().is_empty())
        {
            return Err(CommerceError::validation(
                "mobile money requires a payer phone number",
            ));
        }
        request.metadata.validate_for(request.kind)
    }

    /// Create a provider handle and attach it to the record
    ///
    /// Caller must hold the record's async lock. The handle slot is
    /// written at most once; illegal states fail without mutation.
    async fn attach_new_handle(
        &self,
        snapshot: &Transaction,
    ) -> Result<PaymentHandle, CommerceError> {
        let id = snapshot.id;
        let gateway = self.gateway_for(snapshot.payment_method)?;
        let charge = ChargeRequest {
            amount: snapshot.payable_amount,
            currency: snapshot.currency.clone(),
            reference: id.to_string(),
            customer: snapshot.payer.clone(),
        };

        let result = match tokio::time::timeout(
            self.provider_timeout,
            gateway.create_payment_handle(&charge),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Transient {
                reason: format!("no response within {:?}", self.provider_timeout),
            }),
        };

        match result {
            Ok(handle) => {
                self.store.update(id, |transaction| {
                    // The handle slot is set at most once; re-open clears
                    // it before this point.
                    if transaction.provider_handle.is_some() {
                        return Err(CommerceError::invalid_transition(
                            id,
                            transaction.status,
                            "replace the payment handle of",
                        ));
                    }
                    if !transaction
                        .status
                        .can_transition(TransactionStatus::AwaitingPayment)
                    {
                        return Err(CommerceError::invalid_transition(
                            id,
                            transaction.status,
                            "create a payment handle for",
                        ));
                    }
                    transaction.provider_handle = Some(handle.handle_id.clone());
                    transaction.provider_reference = Some(handle.client_reference.clone());
                    transaction.status = TransactionStatus::AwaitingPayment;
                    transaction.failure_reason = None;
                    Ok(())
                })?;

                tracing::info!(
                    transaction = %id,
                    provider = gateway.name(),
                    handle = %handle.handle_id,
                    "payment handle created"
                );
                self.emit_audit(AuditEvent::new(
                    AuditEventType::PaymentRequested,
                    format!("payment handle created with provider '{}'", gateway.name()),
                    "system",
                    AuditSeverity::Info,
                    json!({
                        "transaction": id,
                        "provider": gateway.name(),
                        "handle": handle.handle_id.clone(),
                    }),
                ))
                .await;
                Ok(handle)
            }
            Err(error) => {
                if let ProviderError::Rejected { reason } = &error {
                    // Stored for operator visibility; the record keeps its
                    // prior state.
                    let reason = reason.clone();
                    let _ = self.store.update(id, |transaction| {
                        transaction.failure_reason = Some(reason);
                        Ok(())
                    });
                }
                tracing::warn!(
                    transaction = %id,
                    provider = gateway.name(),
                    error = %error,
                    "payment handle creation failed"
                );
                Err(CommerceError::from_provider(gateway.name(), id, error))
            }
        }
    }

    /// Select the gateway for a payment method
    pub(crate) fn gateway_for(
        &self,
        method: PaymentMethod,
    ) -> Result<Arc<dyn PaymentGateway>, CommerceError> {
        match method {
            PaymentMethod::Card => Ok(Arc::clone(&self.card)),
            PaymentMethod::MobileMoney => Ok(Arc::clone(&self.mobile_money)),
            PaymentMethod::Free => Err(CommerceError::validation(
                "free transactions never contact a payment provider",
            )),
        }
    }

    /// Record an audit event, retrying once on failure
    ///
    /// A completed state transition is never rolled back over audit
    /// completeness; persistent sink failure is escalated to monitoring
    /// through an error-level log.
    pub(crate) async fn emit_audit(&self, event: AuditEvent) {
        if self.audit.record(event.clone()).await.is_err() {
            if let Err(error) = self.audit.record(event.clone()).await {
                tracing::error!(
                    target: "audit",
                    event_type = %event.event_type,
                    error = %error,
                    "failed to record audit event"
                );
            }
        }
    }

    /// Fire-and-forget notification; failures are logged, never blocking
    pub(crate) async fn send_notification(
        &self,
        template: &str,
        recipient: &str,
        data: serde_json::Value,
    ) {
        if let Some(notifier) = &self.notifier {
            if let Err(error) = notifier.send(template, recipient, data).await {
                tracing::warn!(template, recipient, error = %error, "notification delivery failed");
            }
        }
    }
}
