//! Authoritative registry source.

mod client;
mod types;

pub use client::{
    PrimaryClient, PrimaryConfig, DEFAULT_PRIMARY_BACKOFF_MS, DEFAULT_PRIMARY_MAX_ATTEMPTS,
    DEFAULT_PRIMARY_TIMEOUT_MS, DEFAULT_PRIMARY_URL,
};
pub use types::{normalize, RegistryResponse};
