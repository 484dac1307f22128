//! Provisioning engine
//!
//! Exposes the three calls an ACME client makes during DNS-01 validation:
//!
//! 1. `present` - derive the record, resolve its zone, create it, remember the reference
//! 2. `timeout` - how long and how often to poll public DNS before asking for validation
//! 3. `cleanup` - look up the reference and delete exactly that record
//!
//! Every call opens its own backend session and closes it before returning.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::backend::{BackendSession, DnsBackend, RecordReference, TxtRecord};
use crate::challenge::{self, ChallengeDescriptor};
use crate::config::ResolvedConfig;
use crate::error::{BackendError, ChallengeError};
use crate::providers::create_backend;
use crate::store::RecordStore;
use crate::zone::{ZoneApex, ZoneResolver};

/// Default ceiling for the external propagation polling loop
pub const DEFAULT_PROPAGATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Default cadence of the external propagation polling loop
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(2);

/// Propagation-wait contract handed to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropagationSettings {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for PropagationSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_PROPAGATION_TIMEOUT,
            interval: DEFAULT_POLLING_INTERVAL,
        }
    }
}

/// How a successful cleanup ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// The backend deleted the record
    Deleted,
    /// The record was already gone; the store entry was cleared anyway
    AlreadyAbsent,
}

/// Challenge record lifecycle engine over one backend
#[derive(Debug)]
pub struct ProvisioningEngine {
    backend: Arc<dyn DnsBackend>,
    store: RecordStore,
    ttl: u32,
    propagation: PropagationSettings,
}

impl ProvisioningEngine {
    /// Build an engine. Fails when the TTL is below the backend's minimum or
    /// the propagation settings are unusable; nothing is clamped.
    pub fn new(
        backend: Arc<dyn DnsBackend>,
        ttl: u32,
        propagation: PropagationSettings,
    ) -> Result<Self, ChallengeError> {
        let name = backend.name();

        if ttl < backend.min_ttl() {
            return Err(ChallengeError::configuration(
                name,
                format!(
                    "invalid TTL, TTL ({}) must be at least {}",
                    ttl,
                    backend.min_ttl()
                ),
            ));
        }

        if propagation.interval.is_zero() {
            return Err(ChallengeError::configuration(
                name,
                "polling interval must be greater than zero",
            ));
        }

        if propagation.timeout < propagation.interval {
            return Err(ChallengeError::configuration(
                name,
                format!(
                    "propagation timeout ({}s) is shorter than the polling interval ({}s)",
                    propagation.timeout.as_secs(),
                    propagation.interval.as_secs()
                ),
            ));
        }

        Ok(Self {
            backend,
            store: RecordStore::new(),
            ttl,
            propagation,
        })
    }

    /// Build the backend named by a resolved configuration and wrap it in an engine
    pub fn from_config(config: ResolvedConfig) -> Result<Self, ChallengeError> {
        let backend = create_backend(config.backend)?;
        Self::new(backend, config.ttl, config.propagation)
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    /// Number of challenges presented but not yet cleaned up
    pub fn outstanding(&self) -> usize {
        self.store.len()
    }

    /// The record `present` would publish, for callers polling public DNS
    pub fn descriptor(
        &self,
        domain: &str,
        token: &str,
        key_authorization: &str,
    ) -> ChallengeDescriptor {
        challenge::derive(domain, token, key_authorization)
    }

    /// Propagation timeout and polling interval
    pub fn timeout(&self) -> (Duration, Duration) {
        (self.propagation.timeout, self.propagation.interval)
    }

    /// Create the TXT record for a challenge and remember its reference
    pub async fn present(
        &self,
        domain: &str,
        token: &str,
        key_authorization: &str,
    ) -> Result<(), ChallengeError> {
        let descriptor = challenge::derive(domain, token, key_authorization);

        let mut session = self
            .backend
            .open()
            .await
            .map_err(|e| self.session_error(domain, e))?;
        debug!(backend = self.backend.name(), domain = %domain, "Backend session opened");

        let result = self
            .create_in_session(session.as_mut(), domain, &descriptor)
            .await;
        if let Ok(reference) = &result {
            self.store.put(token, reference.clone());
        }

        session.close().await;
        debug!(backend = self.backend.name(), domain = %domain, "Backend session closed");

        result.map(|_| ())
    }

    async fn create_in_session(
        &self,
        session: &mut dyn BackendSession,
        domain: &str,
        descriptor: &ChallengeDescriptor,
    ) -> Result<RecordReference, ChallengeError> {
        let zone = self.resolve_zone(session, domain, descriptor).await?;

        let record = TxtRecord {
            name: descriptor.effective_name.clone(),
            value: descriptor.expected_value.clone(),
            ttl: self.ttl,
        };

        let reference = session
            .create_record(zone.as_ref(), &record)
            .await
            .map_err(|e| match e {
                BackendError::Authentication(_) | BackendError::Transport(_) => {
                    self.session_error(domain, e)
                }
                other => ChallengeError::RecordCreate {
                    backend: self.backend.name(),
                    domain: domain.to_string(),
                    name: descriptor.effective_name.relative().to_string(),
                    zone: ZoneResolver::describe(zone.as_ref()),
                    message: other.to_string(),
                },
            })?;

        info!(
            backend = self.backend.name(),
            domain = %domain,
            zone = %ZoneResolver::describe(zone.as_ref()),
            record = %descriptor.effective_name,
            reference = %reference,
            "Created challenge TXT record"
        );
        Ok(reference)
    }

    /// Delete the record created by the matching `present`.
    ///
    /// A record that vanished out-of-band is reported as
    /// [`CleanupOutcome::AlreadyAbsent`] rather than an error.
    pub async fn cleanup(
        &self,
        domain: &str,
        token: &str,
        key_authorization: &str,
    ) -> Result<CleanupOutcome, ChallengeError> {
        let descriptor = challenge::derive(domain, token, key_authorization);

        let reference = self
            .store
            .get(token)
            .ok_or_else(|| ChallengeError::UnknownChallenge {
                backend: self.backend.name(),
                domain: domain.to_string(),
                name: descriptor.effective_name.to_string(),
                token: token.to_string(),
            })?;

        let mut session = self
            .backend
            .open()
            .await
            .map_err(|e| self.session_error(domain, e))?;
        debug!(backend = self.backend.name(), domain = %domain, "Backend session opened");

        let result = self
            .delete_in_session(session.as_mut(), domain, &descriptor, &reference)
            .await;
        if matches!(
            result,
            Ok(_) | Err(ChallengeError::RecordNotFound { .. })
        ) {
            self.store.remove(token);
        }

        session.close().await;
        debug!(backend = self.backend.name(), domain = %domain, "Backend session closed");

        match result {
            Ok(()) => Ok(CleanupOutcome::Deleted),
            Err(err @ ChallengeError::RecordNotFound { .. }) => {
                warn!(
                    backend = self.backend.name(),
                    domain = %domain,
                    reference = %reference,
                    error = %err,
                    "Challenge TXT record was already gone"
                );
                Ok(CleanupOutcome::AlreadyAbsent)
            }
            Err(err) => Err(err),
        }
    }

    async fn delete_in_session(
        &self,
        session: &mut dyn BackendSession,
        domain: &str,
        descriptor: &ChallengeDescriptor,
        reference: &RecordReference,
    ) -> Result<(), ChallengeError> {
        let zone = self.resolve_zone(session, domain, descriptor).await?;

        session
            .delete_record(zone.as_ref(), reference)
            .await
            .map_err(|e| match e {
                BackendError::Authentication(_) | BackendError::Transport(_) => {
                    self.session_error(domain, e)
                }
                BackendError::RecordNotFound(_) => ChallengeError::RecordNotFound {
                    backend: self.backend.name(),
                    domain: domain.to_string(),
                    reference: reference.to_string(),
                },
                other => ChallengeError::RecordDelete {
                    backend: self.backend.name(),
                    domain: domain.to_string(),
                    zone: ZoneResolver::describe(zone.as_ref()),
                    reference: reference.to_string(),
                    message: other.to_string(),
                },
            })?;

        info!(
            backend = self.backend.name(),
            domain = %domain,
            zone = %ZoneResolver::describe(zone.as_ref()),
            record = %descriptor.effective_name,
            reference = %reference,
            "Deleted challenge TXT record"
        );
        Ok(())
    }

    async fn resolve_zone(
        &self,
        session: &mut dyn BackendSession,
        domain: &str,
        descriptor: &ChallengeDescriptor,
    ) -> Result<Option<ZoneApex>, ChallengeError> {
        let resolved = self
            .backend
            .zone_resolver()
            .resolve(session, &descriptor.effective_name)
            .await;

        match resolved {
            Ok(zone) => {
                debug!(
                    backend = self.backend.name(),
                    domain = %domain,
                    zone = %ZoneResolver::describe(zone.as_ref()),
                    "Resolved zone"
                );
                Ok(zone)
            }
            Err(BackendError::ZoneNotFound(_)) => Err(ChallengeError::ZoneNotFound {
                backend: self.backend.name(),
                domain: domain.to_string(),
                name: descriptor.effective_name.to_string(),
            }),
            Err(e) => Err(self.session_error(domain, e)),
        }
    }

    /// Map failures of session establishment or zone enumeration
    fn session_error(&self, domain: &str, err: BackendError) -> ChallengeError {
        let backend = self.backend.name();
        let domain = domain.to_string();
        match err {
            BackendError::Authentication(message) => ChallengeError::Authentication {
                backend,
                domain,
                message,
            },
            other => ChallengeError::Transport {
                backend,
                domain,
                message: other.to_string(),
            },
        }
    }
}

impl Drop for ProvisioningEngine {
    fn drop(&mut self) {
        if !self.store.is_empty() {
            warn!(
                backend = self.backend.name(),
                outstanding = self.store.len(),
                "Engine dropped with challenge records still published; remove them out-of-band"
            );
        }
    }
}
