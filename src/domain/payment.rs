use crate::error::BillingError;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// A positive monetary amount in decimal dollars.
///
/// Wraps `rust_decimal::Decimal` to enforce that payment amounts are always
/// strictly positive, and to own the conversion to integer minor units used
/// at the gateway boundary.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, BillingError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(BillingError::ValidationError(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = BillingError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

/// Converts a decimal dollar amount to integer minor units (cents).
///
/// The gateway contract takes integer minor units only, so rounding happens
/// exactly once, here, before the value crosses the network boundary.
/// Half-cent ties round away from zero, not to even: a 50% refund of an
/// odd-cent amount rounds up.
pub fn minor_units(amount: Decimal) -> Result<i64, BillingError> {
    (amount * Decimal::from(100))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| BillingError::ValidationError(format!("amount out of range: {amount}")))
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
    Refunded,
}

/// One monetary charge tied to at most one appointment.
///
/// Status transitions are monotonic: pending→succeeded|failed and
/// succeeded→refunded. Nothing leaves `refunded` and nothing re-enters
/// `pending`; the transition methods below reject anything else. Payments are
/// never deleted.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Payment {
    pub id: u32,
    /// The paying user (the patient in this domain).
    pub payer: u32,
    pub appointment: Option<u32>,
    pub amount: Amount,
    pub status: PaymentStatus,
    /// Reference to the original charge at the external gateway.
    pub gateway_ref: String,
    pub paid_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
}

impl Payment {
    pub fn new(
        id: u32,
        payer: u32,
        appointment: Option<u32>,
        amount: Amount,
        gateway_ref: impl Into<String>,
    ) -> Self {
        Self {
            id,
            payer,
            appointment,
            amount,
            status: PaymentStatus::Pending,
            gateway_ref: gateway_ref.into(),
            paid_at: None,
            refunded_at: None,
        }
    }

    /// Marks the payment as succeeded (payment-confirmation path).
    pub fn mark_succeeded(&mut self, at: DateTime<Utc>) -> Result<(), BillingError> {
        match self.status {
            PaymentStatus::Pending => {
                self.status = PaymentStatus::Succeeded;
                self.paid_at = Some(at);
                Ok(())
            }
            other => Err(BillingError::ValidationError(format!(
                "cannot mark payment {} succeeded from {:?}",
                self.id, other
            ))),
        }
    }

    /// Marks the payment as failed (payment-confirmation path).
    pub fn mark_failed(&mut self) -> Result<(), BillingError> {
        match self.status {
            PaymentStatus::Pending => {
                self.status = PaymentStatus::Failed;
                Ok(())
            }
            other => Err(BillingError::ValidationError(format!(
                "cannot mark payment {} failed from {:?}",
                self.id, other
            ))),
        }
    }

    /// Marks the payment as refunded. Only the refund orchestrator calls this,
    /// and only after the gateway confirmed the refund.
    pub fn mark_refunded(&mut self, at: DateTime<Utc>) -> Result<(), BillingError> {
        match self.status {
            PaymentStatus::Succeeded => {
                self.status = PaymentStatus::Refunded;
                self.refunded_at = Some(at);
                Ok(())
            }
            other => Err(BillingError::ValidationError(format!(
                "cannot refund payment {} from {:?}",
                self.id, other
            ))),
        }
    }
}
