//! Admin API access
//!
//! [`AdminClient`] is the single HTTP client for the remote admin API:
//! JSON in and out, offset pagination, and retry with exponential backoff
//! on transient failures.

pub mod client;
pub mod config;

pub use client::{AdminClient, ApiError};
pub use config::{ConnectionConfig, RetryConfig};
