//! Challenge descriptor derivation
//!
//! Turns the `(domain, token, key authorization)` triple handed over by the
//! ACME client into the TXT record the validating authority will look up.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};

/// Label prepended to the validated domain
pub const ACME_CHALLENGE_LABEL: &str = "_acme-challenge";

/// A domain name held in absolute, lowercase form (`_acme-challenge.example.com.`)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fqdn(String);

impl Fqdn {
    /// Normalize a name: surrounding whitespace and trailing dots are dropped,
    /// ASCII letters are lowercased and a single trailing dot is appended.
    pub fn new(name: &str) -> Self {
        let trimmed = name.trim().trim_end_matches('.');
        Self(format!("{}.", trimmed.to_ascii_lowercase()))
    }

    /// Absolute form with the trailing dot
    pub fn as_absolute(&self) -> &str {
        &self.0
    }

    /// Relative form without the trailing dot, as most provider APIs expect
    pub fn relative(&self) -> &str {
        &self.0[..self.0.len() - 1]
    }

    pub fn is_root(&self) -> bool {
        self.0 == "."
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.relative().split('.').filter(|l| !l.is_empty())
    }

    pub fn label_count(&self) -> usize {
        self.labels().count()
    }

    /// True when `self` equals `zone` or lies beneath it, compared on label boundaries
    pub fn is_within(&self, zone: &Fqdn) -> bool {
        if zone.is_root() || self == zone {
            return true;
        }
        self.0
            .strip_suffix(zone.as_absolute())
            .is_some_and(|prefix| prefix.ends_with('.'))
    }

    /// Name relative to `zone` (`_acme-challenge.sub` for `sub.example.com.` in
    /// `example.com.`), or `@` for the apex itself
    pub fn relative_to(&self, zone: &Fqdn) -> Option<String> {
        if self == zone {
            return Some("@".to_string());
        }
        if zone.is_root() {
            return Some(self.relative().to_string());
        }
        self.0
            .strip_suffix(zone.as_absolute())
            .and_then(|prefix| prefix.strip_suffix('.'))
            .map(str::to_string)
    }
}

impl fmt::Display for Fqdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The record to publish for one challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeDescriptor {
    /// `_acme-challenge.<domain>.`
    pub effective_name: Fqdn,
    /// base64url(SHA-256(key authorization)), unquoted
    pub expected_value: String,
}

/// Derive the challenge record for a domain.
///
/// The key authorization is `token "." thumbprint`, so the digest covers both
/// the token and the account key material. `token` itself only correlates a
/// `present` with its `cleanup` and does not enter the derivation a second time.
/// A wildcard label (`*.example.com`) validates at the base domain.
pub fn derive(domain: &str, _token: &str, key_authorization: &str) -> ChallengeDescriptor {
    let base = domain.trim();
    let base = base.strip_prefix("*.").unwrap_or(base);

    ChallengeDescriptor {
        effective_name: Fqdn::new(&format!("{}.{}", ACME_CHALLENGE_LABEL, base)),
        expected_value: challenge_value(key_authorization),
    }
}

/// The DNS-01 TXT value for a key authorization (RFC 8555 §8.4)
pub fn challenge_value(key_authorization: &str) -> String {
    let digest = Sha256::digest(key_authorization.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}
