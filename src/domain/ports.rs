use crate::domain::appointment::Appointment;
use crate::domain::notification::{EmailTask, Notification, NotificationPreference};
use crate::domain::payment::Payment;
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn store(&self, payment: Payment) -> Result<()>;
    async fn get(&self, payment_id: u32) -> Result<Option<Payment>>;
}

/// Read-only view of appointments; the booking subsystem owns the records.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn store(&self, appointment: Appointment) -> Result<()>;
    async fn get(&self, appointment_id: u32) -> Result<Option<Appointment>>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn store(&self, notification: Notification) -> Result<()>;
    async fn for_user(&self, user: u32) -> Result<Vec<Notification>>;
}

#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Returns the user's preference row, creating an all-enabled one if
    /// absent. Must be atomic under concurrent first access.
    async fn get_or_create(&self, user: u32) -> Result<NotificationPreference>;
    async fn store(&self, prefs: NotificationPreference) -> Result<()>;
}

/// The external payment processor, reduced to the one call the refund path
/// needs. Amounts cross this boundary as integer minor units only.
#[async_trait]
pub trait RefundGateway: Send + Sync {
    async fn create_refund(
        &self,
        payment_intent_ref: &str,
        amount_minor_units: i64,
        idempotency_key: &str,
    ) -> std::result::Result<GatewayRefund, GatewayError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayRefund {
    pub id: String,
}

/// Hand-off to the external at-least-once task executor. Fire-and-forget:
/// callers never observe delivery.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, task: EmailTask) -> Result<()>;
}

/// Injected time source so the refund window boundaries are testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub type PaymentStoreBox = Box<dyn PaymentStore>;
pub type AppointmentStoreBox = Box<dyn AppointmentStore>;
pub type NotificationStoreBox = Box<dyn NotificationStore>;
pub type PreferenceStoreBox = Box<dyn PreferenceStore>;
pub type RefundGatewayBox = Box<dyn RefundGateway>;
pub type TaskQueueBox = Box<dyn TaskQueue>;
pub type ClockHandle = Arc<dyn Clock>;
