//! Mobile-money push provider adapter
//!
//! The mobile-money flow is deliberately asymmetric to the card flow: a
//! payment handle is minted locally at submission time (no network I/O), so
//! the transaction record exists before the payer is ever prompted. The
//! payer-facing push prompt ([`MobileMoneyGateway::initiate_push`]) is a
//! separate step triggered later from the checkout page, and the provider
//! confirms the payment through its callback channel.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{ChargeRequest, PaymentGateway, PaymentHandle, ProviderError, ProviderRefund};
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Credentials for the mobile-money provider
#[derive(Debug, Clone)]
pub struct MobileMoneyCredentials {
    pub consumer_key: String,
    pub consumer_secret: String,
    /// Business short code payments are collected under
    pub shortcode: String,
    /// Pass key used to derive the push password
    pub passkey: String,
    /// API base URL (overridable for tests)
    pub base_url: String,
    /// URL the provider posts payment results to
    pub callback_url: String,
}

/// HTTP adapter for the mobile-money push provider
#[derive(Clone)]
pub struct MobileMoneyGateway {
    client: Client,
    credentials: Option<MobileMoneyCredentials>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct PushResponse {
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: String,
    #[serde(rename = "ResponseCode")]
    response_code: String,
}

#[derive(Debug, Deserialize)]
struct ReversalResponse {
    #[serde(rename = "ConversationID")]
    conversation_id: String,
    #[serde(rename = "ResponseCode")]
    response_code: String,
}

#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(rename = "errorMessage")]
    error_message: Option<String>,
}

impl MobileMoneyGateway {
    /// Create a new gateway; `None` credentials produce an unconfigured
    /// gateway whose calls fail with [`ProviderError::Unavailable`]
    pub fn new(credentials: Option<MobileMoneyCredentials>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        MobileMoneyGateway {
            client,
            credentials,
        }
    }

    fn credentials(&self) -> Result<&MobileMoneyCredentials, ProviderError> {
        self.credentials.as_ref().ok_or(ProviderError::Unavailable)
    }

    /// Whole-unit amount for the wire: the provider does not accept cents
    fn whole_units(amount: Decimal) -> Result<u64, ProviderError> {
        if !amount.fract().is_zero() {
            return Err(ProviderError::Rejected {
                reason: format!("amount {amount} must be in whole currency units"),
            });
        }
        amount.to_u64().ok_or_else(|| ProviderError::Rejected {
            reason: format!("amount {amount} is out of range"),
        })
    }

    async fn access_token(
        &self,
        credentials: &MobileMoneyCredentials,
    ) -> Result<String, ProviderError> {
        let url = format!(
            "{}/oauth/v1/generate?grant_type=client_credentials",
            credentials.base_url.trim_end_matches('/')
        );

        let response = self
            .client
            .get(&url)
            .basic_auth(&credentials.consumer_key, Some(&credentials.consumer_secret))
            .send()
            .await
            .map_err(ProviderError::from_transport)?;

        let status = response.status();
        if status.is_success() {
            let token = response
                .json::<TokenResponse>()
                .await
                .map_err(ProviderError::from_transport)?;
            Ok(token.access_token)
        } else {
            Err(Self::api_error(status, response).await)
        }
    }

    async fn api_error(status: reqwest::StatusCode, response: reqwest::Response) -> ProviderError {
        let body = response.json::<ApiErrorBody>().await.unwrap_or_default();
        let message = body
            .error_message
            .unwrap_or_else(|| format!("request failed with {status}"));
        ProviderError::from_status(status, message)
    }

    /// Prompt the payer's phone to authorize a previously created handle
    ///
    /// This is the user-triggered second step of the mobile-money flow.
    /// Returns the provider's checkout request id, which the callback later
    /// references.
    pub async fn initiate_push(
        &self,
        handle_id: &str,
        phone: &str,
        amount: Decimal,
    ) -> Result<String, ProviderError> {
        let credentials = self.credentials()?;
        let amount = Self::whole_units(amount)?;
        let token = self.access_token(credentials).await?;

        let timestamp = Utc::now().format("%Y%m%d%H%M%S").to_string();
        let password = BASE64.encode(format!(
            "{}{}{}",
            credentials.shortcode, credentials.passkey, timestamp
        ));
        let url = format!(
            "{}/mpesa/stkpush/v1/processrequest",
            credentials.base_url.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&json!({
                "BusinessShortCode": credentials.shortcode,
                "Password": password,
                "Timestamp": timestamp,
                "TransactionType": "CustomerPayBillOnline",
                "Amount": amount,
                "PartyA": phone,
                "PartyB": credentials.shortcode,
                "PhoneNumber": phone,
                "CallBackURL": credentials.callback_url,
                "AccountReference": handle_id,
                "TransactionDesc": "online payment",
            }))
            .send()
            .await
            .map_err(ProviderError::from_transport)?;

        let status = response.status();
        if status.is_success() {
            let push = response
                .json::<PushResponse>()
                .await
                .map_err(ProviderError::from_transport)?;
            if push.response_code != "0" {
                return Err(ProviderError::Rejected {
                    reason: format!("push request declined with code {}", push.response_code),
                });
            }
            tracing::debug!(checkout = %push.checkout_request_id, handle = %handle_id, "push initiated");
            Ok(push.checkout_request_id)
        } else {
            Err(Self::api_error(status, response).await)
        }
    }
}

#[async_trait]
impl PaymentGateway for MobileMoneyGateway {
    fn name(&self) -> &'static str {
        "mobile_money"
    }

    /// Mint a handle for a future push payment
    ///
    /// No network I/O happens here: the handle doubles as the account
    /// reference quoted to the provider when the push is initiated, so a
    /// transaction can exist before the payer confirms on their device.
    async fn create_payment_handle(
        &self,
        request: &ChargeRequest,
    ) -> Result<PaymentHandle, ProviderError> {
        let credentials = self.credentials()?;
        Self::whole_units(request.amount)?;
        if request.customer.phone.is_none() {
            return Err(ProviderError::Rejected {
                reason: "mobile money requires a payer phone number".to_string(),
            });
        }

        let handle_id = format!("{}-{}", credentials.shortcode, request.reference);
        Ok(PaymentHandle {
            client_reference: request.reference.clone(),
            handle_id,
        })
    }

    async fn refund(
        &self,
        handle_id: &str,
        amount: Option<Decimal>,
        reason: &str,
    ) -> Result<ProviderRefund, ProviderError> {
        let credentials = self.credentials()?;
        let amount = amount.ok_or_else(|| ProviderError::Rejected {
            reason: "a reversal requires an explicit amount".to_string(),
        })?;
        let whole = Self::whole_units(amount)?;
        let token = self.access_token(credentials).await?;

        let url = format!(
            "{}/mpesa/reversal/v1/request",
            credentials.base_url.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&json!({
                "Initiator": credentials.shortcode,
                "TransactionID": handle_id,
                "Amount": whole,
                "ReceiverParty": credentials.shortcode,
                "RecieverIdentifierType": "11",
                "Remarks": reason,
                "ResultURL": credentials.callback_url,
                "QueueTimeOutURL": credentials.callback_url,
            }))
            .send()
            .await
            .map_err(ProviderError::from_transport)?;

        let status = response.status();
        if status.is_success() {
            let reversal = response
                .json::<ReversalResponse>()
                .await
                .map_err(ProviderError::from_transport)?;
            if reversal.response_code != "0" {
                return Err(ProviderError::Rejected {
                    reason: format!("reversal declined with code {}", reversal.response_code),
                });
            }
            Ok(ProviderRefund {
                provider_refund_id: reversal.conversation_id,
                refunded_amount: amount,
            })
        } else {
            Err(Self::api_error(status, response).await)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PayerContact;

    fn credentials(base_url: String) -> MobileMoneyCredentials {
        MobileMoneyCredentials {
            consumer_key: "key".to_string(),
            consumer_secret: "secret".to_string(),
            shortcode: "600123".to_string(),
            passkey: "passkey".to_string(),
            base_url,
            callback_url: "https://example.org/callbacks/mobile-money".to_string(),
        }
    }

    fn charge_request(phone: Option<&str>) -> ChargeRequest {
        ChargeRequest {
            amount: Decimal::new(200, 0),
            currency: "KES".to_string(),
            reference: "22222222-2222-2222-2222-222222222222".to_string(),
            customer: PayerContact {
                name: "A. Member".to_string(),
                email: "member@example.org".to_string(),
                phone: phone.map(str::to_string),
            },
        }
    }

    #[tokio::test]
    async fn test_handle_is_minted_without_network_io() {
        // Unroutable base URL: creation must still succeed.
        let gateway = MobileMoneyGateway::new(Some(credentials(
            "http://127.0.0.1:1".to_string(),
        )));

        let handle = gateway
            .create_payment_handle(&charge_request(Some("254700000001")))
            .await
            .unwrap();

        assert_eq!(
            handle.handle_id,
            "600123-22222222-2222-2222-2222-222222222222"
        );
        assert_eq!(
            handle.client_reference,
            "22222222-2222-2222-2222-222222222222"
        );
    }

    #[tokio::test]
    async fn test_create_requires_phone() {
        let gateway = MobileMoneyGateway::new(Some(credentials("http://127.0.0.1:1".to_string())));
        let result = gateway.create_payment_handle(&charge_request(None)).await;
        assert!(matches!(result, Err(ProviderError::Rejected { .. })));
    }

    #[tokio::test]
    async fn test_unconfigured_gateway_is_unavailable() {
        let gateway = MobileMoneyGateway::new(None);
        let result = gateway
            .create_payment_handle(&charge_request(Some("254700000001")))
            .await;
        assert_eq!(result.unwrap_err(), ProviderError::Unavailable);
    }

    #[tokio::test]
    async fn test_initiate_push_success() {
        let mut server = mockito::Server::new_async().await;
        let _token = server
            .mock("GET", "/oauth/v1/generate?grant_type=client_credentials")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token": "token-1", "expires_in": "3599"}"#)
            .create_async()
            .await;
        let _push = server
            .mock("POST", "/mpesa/stkpush/v1/processrequest")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"CheckoutRequestID": "ws_CO_1", "ResponseCode": "0", "ResponseDescription": "Success"}"#,
            )
            .create_async()
            .await;

        let gateway = MobileMoneyGateway::new(Some(credentials(server.url())));
        let checkout = gateway
            .initiate_push("600123-ref", "254700000001", Decimal::new(200, 0))
            .await
            .unwrap();

        assert_eq!(checkout, "ws_CO_1");
    }

    #[tokio::test]
    async fn test_push_rejects_fractional_amounts() {
        let gateway = MobileMoneyGateway::new(Some(credentials("http://127.0.0.1:1".to_string())));
        let result = gateway
            .initiate_push("600123-ref", "254700000001", Decimal::new(2005, 1))
            .await;
        assert!(matches!(result, Err(ProviderError::Rejected { .. })));
    }

    #[tokio::test]
    async fn test_refund_requires_explicit_amount() {
        let gateway = MobileMoneyGateway::new(Some(credentials("http://127.0.0.1:1".to_string())));
        let result = gateway.refund("600123-ref", None, "requested").await;
        assert!(matches!(result, Err(ProviderError::Rejected { .. })));
    }

    #[tokio::test]
    async fn test_refund_reversal_success() {
        let mut server = mockito::Server::new_async().await;
        let _token = server
            .mock("GET", "/oauth/v1/generate?grant_type=client_credentials")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token": "token-1", "expires_in": "3599"}"#)
            .create_async()
            .await;
        let _reversal = server
            .mock("POST", "/mpesa/reversal/v1/request")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"ConversationID": "AG_1", "OriginatorConversationID": "1-1", "ResponseCode": "0", "ResponseDescription": "Accepted"}"#,
            )
            .create_async()
            .await;

        let gateway = MobileMoneyGateway::new(Some(credentials(server.url())));
        let refund = gateway
            .refund("600123-ref", Some(Decimal::new(200, 0)), "event cancelled")
            .await
            .unwrap();

        assert_eq!(refund.provider_refund_id, "AG_1");
        assert_eq!(refund.refunded_amount, Decimal::new(200, 0));
    }

    #[tokio::test]
    async fn test_token_failure_is_normalized() {
        let mut server = mockito::Server::new_async().await;
        let _token = server
            .mock("GET", "/oauth/v1/generate?grant_type=client_credentials")
            .with_status(500)
            .create_async()
            .await;

        let gateway = MobileMoneyGateway::new(Some(credentials(server.url())));
        let result = gateway
            .initiate_push("600123-ref", "254700000001", Decimal::new(200, 0))
            .await;

        assert!(matches!(result, Err(ProviderError::Transient { .. })));
    }
}
