//! Backend adapter abstraction for DNS hosting providers
//!
//! A [`DnsBackend`] is built once from configuration and hands out one
//! [`BackendSession`] per engine call. Sessions are never shared between
//! concurrent calls, and the engine closes every session it opens.

use std::fmt::{self, Debug};

use async_trait::async_trait;

use crate::challenge::Fqdn;
use crate::error::{BackendError, BackendResult};
use crate::zone::{ZoneApex, ZoneResolver};

/// Opaque identifier a backend returns when it creates a record.
///
/// The engine stores it and hands it back to the same backend on deletion
/// without looking inside.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordReference(String);

impl RecordReference {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The TXT record a backend is asked to create
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxtRecord {
    pub name: Fqdn,
    /// Unquoted challenge value; adapters quote it if their protocol wants that
    pub value: String,
    pub ttl: u32,
}

/// A DNS hosting provider
///
/// Implementations must be thread-safe: the engine calls [`DnsBackend::open`]
/// concurrently from independent challenge flows.
#[async_trait]
pub trait DnsBackend: Send + Sync + Debug {
    /// Provider name used in logs and error messages (e.g. "cloudflare")
    fn name(&self) -> &'static str;

    /// Lowest TTL the provider accepts for a record
    fn min_ttl(&self) -> u32;

    /// How this backend finds the zone for a record name
    fn zone_resolver(&self) -> &ZoneResolver;

    /// Establish the transport and authentication context for one call
    async fn open(&self) -> BackendResult<Box<dyn BackendSession>>;
}

/// A single-use session with a provider
#[async_trait]
pub trait BackendSession: Send {
    /// Zones visible to the configured credentials
    async fn list_zones(&mut self) -> BackendResult<Vec<ZoneApex>> {
        Err(BackendError::Unsupported("zone listing"))
    }

    /// Create exactly one new TXT record, leaving existing records at the same
    /// name untouched. `zone` is `None` for backends that place records by name.
    async fn create_record(
        &mut self,
        zone: Option<&ZoneApex>,
        record: &TxtRecord,
    ) -> BackendResult<RecordReference>;

    /// Delete the referenced record; [`BackendError::RecordNotFound`] when it
    /// no longer exists
    async fn delete_record(
        &mut self,
        zone: Option<&ZoneApex>,
        reference: &RecordReference,
    ) -> BackendResult<()>;

    /// Release the session. Failures are logged by the adapter.
    async fn close(&mut self);
}
