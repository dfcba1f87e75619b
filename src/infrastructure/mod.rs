pub mod clock;
pub mod gateway;
#[cfg(feature = "gateway-http")]
pub mod http;
pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
