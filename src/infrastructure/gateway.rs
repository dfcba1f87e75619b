use crate::domain::ports::{GatewayRefund, RefundGateway};
use crate::error::GatewayError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

/// How the sandbox answers the next refund calls.
#[derive(Debug, Clone, Default)]
pub enum SandboxMode {
    #[default]
    Approve,
    Reject(String),
    Timeout,
}

/// One recorded `create_refund` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRefund {
    pub payment_intent_ref: String,
    pub amount_minor_units: i64,
    pub idempotency_key: String,
}

/// In-process stand-in for the external payment processor.
///
/// Approves by default, handing out sequential refund ids; tests script it to
/// reject or time out. Every call is recorded regardless of mode, so tests
/// can assert exactly how often and with what arguments the gateway was hit.
#[derive(Default, Clone)]
pub struct SandboxGateway {
    mode: Arc<RwLock<SandboxMode>>,
    calls: Arc<RwLock<Vec<RecordedRefund>>>,
}

impl SandboxGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn approve(&self) {
        *self.mode.write().await = SandboxMode::Approve;
    }

    pub async fn reject_with(&self, message: impl Into<String>) {
        *self.mode.write().await = SandboxMode::Reject(message.into());
    }

    pub async fn time_out(&self) {
        *self.mode.write().await = SandboxMode::Timeout;
    }

    pub async fn calls(&self) -> Vec<RecordedRefund> {
        self.calls.read().await.clone()
    }
}

#[async_trait]
impl RefundGateway for SandboxGateway {
    async fn create_refund(
        &self,
        payment_intent_ref: &str,
        amount_minor_units: i64,
        idempotency_key: &str,
    ) -> std::result::Result<GatewayRefund, GatewayError> {
        let call_number = {
            let mut calls = self.calls.write().await;
            calls.push(RecordedRefund {
                payment_intent_ref: payment_intent_ref.to_string(),
                amount_minor_units,
                idempotency_key: idempotency_key.to_string(),
            });
            calls.len()
        };

        match &*self.mode.read().await {
            SandboxMode::Approve => Ok(GatewayRefund {
                id: format!("re_{call_number}_{payment_intent_ref}"),
            }),
            SandboxMode::Reject(message) => Err(GatewayError::Rejected(message.clone())),
            SandboxMode::Timeout => Err(GatewayError::Timeout),
        }
    }
}
