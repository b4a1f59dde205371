//! # Cosmowall Common Library
//!
//! Shared code for the cosmowall crates including:
//! - Error types
//! - Configuration loading (TOML + environment)
//! - Clock abstraction and the TTL response cache
//! - Output format table
//! - API request/response types

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod format;
pub mod time;

pub use cache::ResponseCache;
pub use error::{Error, Result};
pub use format::{FormatSpec, FormatTable, OutputFormat};
