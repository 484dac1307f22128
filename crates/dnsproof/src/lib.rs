//! DNS-01 challenge record provisioning
//!
//! This library publishes and retracts the `_acme-challenge` TXT records a
//! certificate client needs during DNS-01 validation. It can be embedded in
//! an ACME client or driven from the `dnsproof` command line.
//!
//! - [`challenge`] derives the record name and value
//! - [`zone`] resolves the zone a record belongs to
//! - [`backend`] is the provider capability interface, implemented in [`providers`]
//! - [`store`] remembers the backend reference of each outstanding record
//! - [`ProvisioningEngine`] ties them together behind `present` / `cleanup` / `timeout`

pub mod backend;
pub mod challenge;
pub mod config;
mod engine;
mod error;
pub mod providers;
pub mod store;
pub mod zone;

// Re-export public types
pub use backend::{BackendSession, DnsBackend, RecordReference, TxtRecord};
pub use challenge::{derive, ChallengeDescriptor, Fqdn, ACME_CHALLENGE_LABEL};
pub use config::{DnsproofConfig, ResolvedConfig};
pub use engine::{CleanupOutcome, PropagationSettings, ProvisioningEngine};
pub use error::{BackendError, BackendResult, ChallengeError};
pub use providers::{
    create_backend, BackendConfig, BackendKind, CloudflareAuth, CloudflareBackend,
    CloudflareSettings, InfobloxBackend, InfobloxSettings,
};
pub use store::RecordStore;
pub use zone::{find_longest_suffix, ZoneApex, ZoneResolver};
