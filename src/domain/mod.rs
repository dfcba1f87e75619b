pub mod appointment;
pub mod notification;
pub mod payment;
pub mod policy;
pub mod ports;
