use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reference entity owned by the booking subsystem.
///
/// The refund path only reads `start_time` and the participant identities;
/// appointments are never mutated here.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct Appointment {
    pub id: u32,
    pub patient: u32,
    pub provider: u32,
    pub start_time: DateTime<Utc>,
}

impl Appointment {
    pub fn new(id: u32, patient: u32, provider: u32, start_time: DateTime<Utc>) -> Self {
        Self {
            id,
            patient,
            provider,
            start_time,
        }
    }
}
