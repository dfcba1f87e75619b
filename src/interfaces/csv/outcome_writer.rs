use crate::application::orchestrator::RefundOutcome;
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct OutcomeRow<'a> {
    payment: u32,
    success: bool,
    refund_type: crate::domain::policy::RefundTier,
    refund_amount: Decimal,
    error: Option<&'a str>,
    gateway_ref: Option<&'a str>,
}

/// Writes refund outcomes as CSV, one row per processed cancellation.
pub struct OutcomeWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> OutcomeWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_outcomes(&mut self, outcomes: &[(u32, RefundOutcome)]) -> Result<()> {
        for (payment, outcome) in outcomes {
            self.writer.serialize(OutcomeRow {
                payment: *payment,
                success: outcome.success,
                refund_type: outcome.refund_type,
                refund_amount: outcome.refund_amount,
                error: outcome.error.as_deref(),
                gateway_ref: outcome.gateway_ref.as_deref(),
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
