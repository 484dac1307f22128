//! End-to-end test utilities for dnsproof
//!
//! This crate provides an in-memory DNS backend so the full challenge
//! lifecycle can be tested without a provider account.

pub mod mock_backend;

pub use mock_backend::{MockBackend, StoredRecord};

/// Install a test log subscriber once; honors `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("dnsproof=debug")),
        )
        .with_test_writer()
        .try_init();
}
