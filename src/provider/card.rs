//! Card-based intent provider adapter
//!
//! HTTP client for the card payment provider's intent API. A charge is
//! prepared by creating a payment intent; the returned client secret is
//! handed to the browser-side form, and the provider later confirms the
//! payment through its callback channel (outside this adapter).

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{
    from_minor_units, to_minor_units, ChargeRequest, PaymentGateway, PaymentHandle, ProviderError,
    ProviderRefund,
};
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Credentials for the card provider
#[derive(Debug, Clone)]
pub struct CardCredentials {
    /// API secret key, sent as a bearer token
    pub secret_key: String,
    /// API base URL (overridable for tests)
    pub base_url: String,
}

/// HTTP adapter for the card-based intent provider
#[derive(Clone)]
pub struct CardGateway {
    client: Client,
    credentials: Option<CardCredentials>,
}

/// Successful intent creation response
#[derive(Debug, Deserialize)]
struct IntentResponse {
    id: String,
    client_secret: String,
}

/// Successful refund response; amount is in minor units
#[derive(Debug, Deserialize)]
struct RefundResponse {
    id: String,
    amount: i64,
}

#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    error: ApiError,
}

#[derive(Debug, Default, Deserialize)]
struct ApiError {
    message: Option<String>,
    code: Option<String>,
}

impl CardGateway {
    /// Create a new gateway
    ///
    /// `credentials` of `None` produces an unconfigured gateway whose calls
    /// fail with [`ProviderError::Unavailable`]; deployments without a card
    /// account run this way.
    pub fn new(credentials: Option<CardCredentials>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        CardGateway {
            client,
            credentials,
        }
    }

    fn credentials(&self) -> Result<&CardCredentials, ProviderError> {
        self.credentials.as_ref().ok_or(ProviderError::Unavailable)
    }

    /// Map a refund-path error body onto the refund-specific error kinds
    fn refund_error(status: reqwest::StatusCode, body: ApiErrorBody) -> ProviderError {
        let message = body
            .error
            .message
            .unwrap_or_else(|| format!("request failed with {status}"));
        match body.error.code.as_deref() {
            Some("charge_already_refunded") => ProviderError::AlreadyRefunded { reason: message },
            Some("charge_not_captured") | Some("payment_intent_unexpected_state") => {
                ProviderError::NotRefundable { reason: message }
            }
            _ => ProviderError::from_status(status, message),
        }
    }
}

#[async_trait]
impl PaymentGateway for CardGateway {
    fn name(&self) -> &'static str {
        "card"
    }

    async fn create_payment_handle(
        &self,
        request: &ChargeRequest,
    ) -> Result<PaymentHandle, ProviderError> {
        let credentials = self.credentials()?;
        let amount = to_minor_units(request.amount)?;
        let url = format!(
            "{}/v1/payment_intents",
            credentials.base_url.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&credentials.secret_key)
            .json(&json!({
                "amount": amount,
                "currency": request.currency.to_lowercase(),
                "receipt_email": request.customer.email,
                "metadata": { "reference": request.reference },
            }))
            .send()
            .await
            .map_err(ProviderError::from_transport)?;

        let status = response.status();
        if status.is_success() {
            let intent = response
                .json::<IntentResponse>()
                .await
                .map_err(ProviderError::from_transport)?;
            tracing::debug!(intent = %intent.id, reference = %request.reference, "payment intent created");
            Ok(PaymentHandle {
                handle_id: intent.id,
                client_reference: intent.client_secret,
            })
        } else {
            let body = response.json::<ApiErrorBody>().await.unwrap_or_default();
            let message = body
                .error
                .message
                .unwrap_or_else(|| format!("request failed with {status}"));
            Err(ProviderError::from_status(status, message))
        }
    }

    async fn refund(
        &self,
        handle_id: &str,
        amount: Option<Decimal>,
        reason: &str,
    ) -> Result<ProviderRefund, ProviderError> {
        let credentials = self.credentials()?;
        let url = format!("{}/v1/refunds", credentials.base_url.trim_end_matches('/'));

        let mut body = json!({
            "payment_intent": handle_id,
            "metadata": { "reason": reason },
        });
        if let Some(amount) = amount {
            body["amount"] = json!(to_minor_units(amount)?);
        }

        let response = self
            .client
            .post(&url)
            .bearer_auth(&credentials.secret_key)
            .json(&body)
            .send()
            .await
            .map_err(ProviderError::from_transport)?;

        let status = response.status();
        if status.is_success() {
            let refund = response
                .json::<RefundResponse>()
                .await
                .map_err(ProviderError::from_transport)?;
            tracing::debug!(refund = %refund.id, handle = %handle_id, "refund accepted");
            Ok(ProviderRefund {
                provider_refund_id: refund.id,
                refunded_amount: from_minor_units(refund.amount),
            })
        } else {
            let body = response.json::<ApiErrorBody>().await.unwrap_or_default();
            Err(Self::refund_error(status, body))
        }
    }
}
