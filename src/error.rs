use thiserror::Error;

pub type Result<T> = std::result::Result<T, BillingError>;

#[derive(Error, Debug)]
pub enum BillingError {
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("Storage error: {0}")]
    StorageError(#[from] rocksdb::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

/// Errors surfaced by the payment gateway adapter.
///
/// The adapter maps whatever the concrete gateway reports onto these three
/// cases. `Timeout` is special: the refund's true outcome at the gateway is
/// unknown, so callers must not retry blindly (the idempotency key passed on
/// the original call makes an operator-driven retry safe at the gateway).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("refund rejected by gateway: {0}")]
    Rejected(String),
    #[error("gateway request timed out; refund outcome unknown")]
    Timeout,
    #[error("gateway unreachable: {0}")]
    Transport(String),
}
