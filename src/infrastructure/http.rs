use crate::domain::ports::{GatewayRefund, RefundGateway};
use crate::error::{BillingError, GatewayError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Gateway adapter speaking JSON over HTTP to the payment processor.
///
/// Maps the processor's failure modes onto the internal taxonomy: request
/// timeouts become `GatewayError::Timeout` (outcome unknown), 4xx/5xx
/// responses become `Rejected` with the response body, and connection
/// problems become `Transport`. The idempotency key travels as a header so
/// the processor can de-duplicate retried refunds.
pub struct HttpRefundGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRefundGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BillingError::InternalError(Box::new(e)))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[derive(Deserialize)]
struct RefundResponse {
    id: String,
}

#[async_trait]
impl RefundGateway for HttpRefundGateway {
    async fn create_refund(
        &self,
        payment_intent_ref: &str,
        amount_minor_units: i64,
        idempotency_key: &str,
    ) -> std::result::Result<GatewayRefund, GatewayError> {
        let url = format!("{}/refunds", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .header("Idempotency-Key", idempotency_key)
            .json(&json!({
                "payment_intent": payment_intent_ref,
                "amount": amount_minor_units,
            }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout
                } else {
                    GatewayError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            let body: RefundResponse = response
                .json()
                .await
                .map_err(|e| GatewayError::Transport(e.to_string()))?;
            Ok(GatewayRefund { id: body.id })
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(GatewayError::Rejected(format!("{status}: {message}")))
        }
    }
}
