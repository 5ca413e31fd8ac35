//! Folio Tests - integration and deterministic property tests for Folio.
//!
//! ## Test Organization
//!
//! **Integration Tests** (`*_tests.rs`):
//! - `processor_tests`: end-to-end processor scenarios on one partition
//! - `property_tests`: seeded random sequences checked against invariants,
//!   including crash-and-retry with `SimulatedStore` faults
//! - `transfer_tests`: ownership transitions, transfer events and interceptors
//! - `service_tests`: the async invocation service
//! - `codec_tests`: versioned envelopes across a rolling upgrade
//!
//! **Support Modules**:
//! - `properties`: invariant checkers over partition snapshots
//! - `scenarios`: seeds, topic presets, members and a recording interceptor
//!
//! ## Naming Conventions
//!
//! - Integration tests: `test_<component>_<scenario>`
//! - Unit tests: inline in each crate under `#[cfg(test)]`

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod properties;
pub mod scenarios;

#[cfg(test)]
mod codec_tests;
#[cfg(test)]
mod property_tests;

/// Installs a test log subscriber once per process.
///
/// Honours `RUST_LOG`; defaults to `warn`. Later calls are no-ops.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
