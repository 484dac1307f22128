//! DNS provider backends
//!
//! - [`CloudflareBackend`] - Cloudflare API v4, zone enumeration or a pinned zone
//! - [`InfobloxBackend`] - Infoblox WAPI, records placed by name within a DNS view

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::backend::DnsBackend;
use crate::error::ChallengeError;

pub mod cloudflare;
pub mod infoblox;

pub use cloudflare::{CloudflareAuth, CloudflareBackend, CloudflareSettings};
pub use infoblox::{InfobloxBackend, InfobloxSettings};

/// Supported providers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Cloudflare,
    Infoblox,
}

impl BackendKind {
    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Cloudflare => cloudflare::NAME,
            BackendKind::Infoblox => infoblox::NAME,
        }
    }

    /// Environment namespace for provider options (`CLOUDFLARE_TTL`, ...)
    pub fn env_namespace(&self) -> &'static str {
        match self {
            BackendKind::Cloudflare => "CLOUDFLARE",
            BackendKind::Infoblox => "INFOBLOX",
        }
    }

    /// Legacy alternate namespace still honored for some providers
    pub fn alt_env_namespace(&self) -> Option<&'static str> {
        match self {
            BackendKind::Cloudflare => Some("CF"),
            BackendKind::Infoblox => None,
        }
    }

    pub fn default_ttl(&self) -> u32 {
        match self {
            BackendKind::Cloudflare => cloudflare::MIN_TTL,
            BackendKind::Infoblox => infoblox::DEFAULT_TTL,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = ChallengeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cloudflare" => Ok(BackendKind::Cloudflare),
            "infoblox" => Ok(BackendKind::Infoblox),
            other => Err(ChallengeError::configuration(
                "dnsproof",
                format!(
                    "unknown provider '{}' (expected 'cloudflare' or 'infoblox')",
                    other
                ),
            )),
        }
    }
}

/// Fully resolved settings for one backend
#[derive(Debug, Clone)]
pub enum BackendConfig {
    Cloudflare(CloudflareSettings),
    Infoblox(InfobloxSettings),
}

impl BackendConfig {
    pub fn kind(&self) -> BackendKind {
        match self {
            BackendConfig::Cloudflare(_) => BackendKind::Cloudflare,
            BackendConfig::Infoblox(_) => BackendKind::Infoblox,
        }
    }
}

/// Build the backend selected by configuration
pub fn create_backend(config: BackendConfig) -> Result<Arc<dyn DnsBackend>, ChallengeError> {
    match config {
        BackendConfig::Cloudflare(settings) => Ok(Arc::new(CloudflareBackend::new(settings)?)),
        BackendConfig::Infoblox(settings) => Ok(Arc::new(InfobloxBackend::new(settings)?)),
    }
}
