use crate::error::{BillingError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use std::io::Read;
use std::str::FromStr;

#[derive(Debug, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    /// Seeds a succeeded payment and its appointment.
    Payment,
    /// Requests a cancellation refund for a previously seeded payment.
    Cancel,
}

/// One row of the billing event stream.
///
/// `payment` rows carry client, amount, and the appointment's start offset;
/// `cancel` rows carry the reason. Missing trailing fields deserialize to
/// `None`.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct Event {
    pub r#type: EventType,
    pub payment: u32,
    #[serde(default)]
    pub client: Option<u32>,
    #[serde(default, deserialize_with = "decimal_opt_from_str")]
    pub amount: Option<Decimal>,
    /// Minutes from now until the appointment starts. Negative means the
    /// appointment already passed.
    #[serde(default)]
    pub starts_in_minutes: Option<i64>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Numeric CSV fields otherwise pass through `f64`, which loses the decimal
/// scale; amounts are parsed from the raw field instead.
fn decimal_opt_from_str<'de, D>(deserializer: D) -> std::result::Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref() {
        None | Some("") => Ok(None),
        Some(value) => Decimal::from_str(value)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// Reads billing events from a CSV source.
///
/// Wraps `csv::Reader` with whitespace trimming and flexible record lengths,
/// yielding `Result<Event>` lazily so large files stream.
pub struct EventReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> EventReader<R> {
    /// Creates a new `EventReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    pub fn events(self) -> impl Iterator<Item = Result<Event>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(BillingError::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const HEADER: &str = "type, payment, client, amount, starts_in_minutes, reason";

    #[test]
    fn test_reader_payment_row() {
        let data = format!("{HEADER}\npayment, 1, 10, 150.00, 3000, ");
        let reader = EventReader::new(data.as_bytes());
        let events: Vec<Result<Event>> = reader.events().collect();

        assert_eq!(events.len(), 1);
        let event = events[0].as_ref().unwrap();
        assert_eq!(event.r#type, EventType::Payment);
        assert_eq!(event.payment, 1);
        assert_eq!(event.client, Some(10));
        assert_eq!(event.amount, Some(dec!(150.00)));
        assert_eq!(event.starts_in_minutes, Some(3000));
    }

    #[test]
    fn test_reader_cancel_row_without_amount() {
        let data = format!("{HEADER}\ncancel, 1, , , , changed plans");
        let reader = EventReader::new(data.as_bytes());
        let events: Vec<Result<Event>> = reader.events().collect();

        let event = events[0].as_ref().unwrap();
        assert_eq!(event.r#type, EventType::Cancel);
        assert_eq!(event.payment, 1);
        assert_eq!(event.amount, None);
        assert_eq!(event.reason.as_deref(), Some("changed plans"));
    }

    #[test]
    fn test_reader_preserves_amount_scale() {
        // Decimal equality ignores scale, so pin the textual form: the
        // trailing zeros of "150.00" must survive into the domain.
        let data = format!("{HEADER}\npayment, 1, 10, 150.00, 3000, ");
        let reader = EventReader::new(data.as_bytes());
        let events: Vec<Result<Event>> = reader.events().collect();

        let amount = events[0].as_ref().unwrap().amount.unwrap();
        assert_eq!(amount.to_string(), "150.00");
        assert_eq!(amount.scale(), 2);
    }

    #[test]
    fn test_reader_malformed_row() {
        let data = format!("{HEADER}\nrefund, 1, 10, 1.0, 0, ");
        let reader = EventReader::new(data.as_bytes());
        let events: Vec<Result<Event>> = reader.events().collect();

        assert!(events[0].is_err());
    }
}
