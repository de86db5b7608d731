//! Read-only access to config entries in a Consul cluster.
//!
//! [`ConfigEntryReader`] is the seam the scenario driver polls through;
//! [`ConsulClient`] implements it over the HTTP API. Lookups are single-shot:
//! retrying is the caller's job.

#![deny(missing_docs)]

pub mod client;
pub mod entry;
pub mod error;
#[cfg(feature = "test-support")]
pub mod testing;

pub use client::{ConfigEntryReader, ConsulClient, ConsulClientConfig, CONSUL_TOKEN_HEADER};
pub use entry::ConfigEntry;
pub use error::ConsulError;
