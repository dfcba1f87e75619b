use crate::domain::payment::Amount;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Lead time required for a full refund.
pub const FULL_THRESHOLD_HOURS: i64 = 48;
/// Lead time required for a 50% refund.
pub const PARTIAL_THRESHOLD_HOURS: i64 = 24;
/// Tolerance subtracted from both thresholds so clock/scheduling jitter at
/// exactly the boundary resolves to the more generous tier. This is policy,
/// not an implementation detail.
pub const BOUNDARY_TOLERANCE_MINUTES: i64 = 1;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum RefundTier {
    Full,
    Partial,
    None,
}

impl std::fmt::Display for RefundTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefundTier::Full => write!(f, "full"),
            RefundTier::Partial => write!(f, "partial"),
            RefundTier::None => write!(f, "none"),
        }
    }
}

/// Outcome of the refund policy. Produced fresh per call, never persisted.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Copy)]
pub struct RefundDecision {
    pub tier: RefundTier,
    pub percentage: u8,
    pub amount: Decimal,
}

/// Classifies the time remaining until `start_time` into a refund tier.
///
/// Bands over the signed duration Δ = start_time − now:
/// - Δ ≤ 0 (appointment already started or passed): none.
/// - Δ ≥ 48h − 1min: full refund.
/// - 24h − 1min ≤ Δ < 48h − 1min: 50% refund.
/// - otherwise: none.
///
/// Pure and deterministic; callers inject `now` so the boundaries are
/// testable without wall-clock waits.
pub fn decide(amount: Amount, start_time: DateTime<Utc>, now: DateTime<Utc>) -> RefundDecision {
    let delta = start_time - now;
    let tolerance = Duration::minutes(BOUNDARY_TOLERANCE_MINUTES);
    let full_cutoff = Duration::hours(FULL_THRESHOLD_HOURS) - tolerance;
    let partial_cutoff = Duration::hours(PARTIAL_THRESHOLD_HOURS) - tolerance;

    if delta <= Duration::zero() {
        RefundDecision {
            tier: RefundTier::None,
            percentage: 0,
            amount: Decimal::ZERO,
        }
    } else if delta >= full_cutoff {
        RefundDecision {
            tier: RefundTier::Full,
            percentage: 100,
            amount: amount.value(),
        }
    } else if delta >= partial_cutoff {
        RefundDecision {
            tier: RefundTier::Partial,
            percentage: 50,
            amount: amount.value() * dec!(0.5),
        }
    } else {
        RefundDecision {
            tier: RefundTier::None,
            percentage: 0,
            amount: Decimal::ZERO,
        }
    }
}
