//! API types shared between the service and its clients

pub mod types;

pub use types::*;
