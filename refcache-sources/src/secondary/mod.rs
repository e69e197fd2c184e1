//! Fallback directory source.

mod client;
mod types;

pub use client::{
    SecondaryClient, SecondaryConfig, DEFAULT_SECONDARY_TIMEOUT_MS, DEFAULT_SECONDARY_URL,
};
pub use types::{normalize, DirectoryResponse};
