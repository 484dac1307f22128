//! Zone resolution
//!
//! Records are created under the most specific zone the backend account
//! manages. Backends either enumerate their zones, are pinned to one zone by
//! configuration, or take flat record names and place them themselves.

use tracing::debug;

use crate::backend::BackendSession;
use crate::challenge::Fqdn;
use crate::error::{BackendError, BackendResult};

/// An administrative zone a backend accepts records under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneApex {
    pub name: Fqdn,
    /// Provider-side identifier, when the provider has one
    pub id: Option<String>,
}

impl ZoneApex {
    pub fn new(name: &str, id: Option<String>) -> Self {
        Self {
            name: Fqdn::new(name),
            id,
        }
    }
}

/// Zone resolution strategy, chosen per backend at construction time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZoneResolver {
    /// A configured zone; no enumeration, which suits credentials that can
    /// edit records but not list zones
    Explicit(ZoneApex),
    /// List the zones visible to the credentials and take the longest suffix match
    Enumerate,
    /// The backend takes the full record name and resolves zones internally
    Flat,
}

impl ZoneResolver {
    /// Resolve the zone for `name`. `Ok(None)` means the backend places the
    /// record itself.
    pub async fn resolve(
        &self,
        session: &mut dyn BackendSession,
        name: &Fqdn,
    ) -> BackendResult<Option<ZoneApex>> {
        match self {
            ZoneResolver::Flat => Ok(None),
            ZoneResolver::Explicit(zone) => {
                if name.is_within(&zone.name) {
                    Ok(Some(zone.clone()))
                } else {
                    Err(BackendError::ZoneNotFound(format!(
                        "{} is outside the configured zone {}",
                        name, zone.name
                    )))
                }
            }
            ZoneResolver::Enumerate => {
                let zones = session.list_zones().await?;
                debug!(name = %name, zones = zones.len(), "Enumerated zones");

                find_longest_suffix(name, &zones)
                    .cloned()
                    .map(Some)
                    .ok_or_else(|| BackendError::ZoneNotFound(name.to_string()))
            }
        }
    }

    /// Human-readable zone label for logs and errors
    pub fn describe(zone: Option<&ZoneApex>) -> String {
        match zone {
            Some(zone) => zone.name.to_string(),
            None => "(backend-managed)".to_string(),
        }
    }
}

/// Pick the zone containing `name` with the most labels, so a delegated
/// subdomain zone wins over its parent
pub fn find_longest_suffix<'a>(name: &Fqdn, zones: &'a [ZoneApex]) -> Option<&'a ZoneApex> {
    zones
        .iter()
        .filter(|zone| name.is_within(&zone.name))
        .max_by_key(|zone| zone.name.label_count())
}
