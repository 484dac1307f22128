use thiserror::Error;

/// Result type for backend adapter operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors reported by a backend adapter, before the engine attaches
/// backend and domain context
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("no zone matches '{0}'")]
    ZoneNotFound(String),

    #[error("record not found: {0}")]
    RecordNotFound(String),

    #[error("{0} is not supported by this backend")]
    Unsupported(&'static str),
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            BackendError::Api(format!("malformed response: {}", e))
        } else {
            BackendError::Transport(e.to_string())
        }
    }
}

/// Errors returned to callers of the provisioning engine
///
/// Every variant names the backend and the domain or zone involved.
#[derive(Debug, Error)]
pub enum ChallengeError {
    #[error("{backend}: invalid configuration: {message}")]
    Configuration {
        backend: &'static str,
        message: String,
    },

    #[error("{backend}: could not find zone for domain '{domain}' (record '{name}')")]
    ZoneNotFound {
        backend: &'static str,
        domain: String,
        name: String,
    },

    #[error("{backend}: authentication failed for domain '{domain}': {message}")]
    Authentication {
        backend: &'static str,
        domain: String,
        message: String,
    },

    #[error("{backend}: transport error for domain '{domain}': {message}")]
    Transport {
        backend: &'static str,
        domain: String,
        message: String,
    },

    #[error("{backend}: failed to create TXT record '{name}' in zone '{zone}' for domain '{domain}': {message}")]
    RecordCreate {
        backend: &'static str,
        domain: String,
        name: String,
        zone: String,
        message: String,
    },

    #[error("{backend}: TXT record '{reference}' for domain '{domain}' no longer exists")]
    RecordNotFound {
        backend: &'static str,
        domain: String,
        reference: String,
    },

    #[error("{backend}: failed to delete TXT record '{reference}' in zone '{zone}' for domain '{domain}': {message}")]
    RecordDelete {
        backend: &'static str,
        domain: String,
        zone: String,
        reference: String,
        message: String,
    },

    #[error("{backend}: unknown record reference for '{name}' (token '{token}'), nothing to clean up for domain '{domain}'")]
    UnknownChallenge {
        backend: &'static str,
        domain: String,
        name: String,
        token: String,
    },
}

impl ChallengeError {
    pub fn configuration(backend: &'static str, message: impl Into<String>) -> Self {
        Self::Configuration {
            backend,
            message: message.into(),
        }
    }

    /// Backend name carried by this error
    pub fn backend(&self) -> &'static str {
        match self {
            Self::Configuration { backend, .. }
            | Self::ZoneNotFound { backend, .. }
            | Self::Authentication { backend, .. }
            | Self::Transport { backend, .. }
            | Self::RecordCreate { backend, .. }
            | Self::RecordNotFound { backend, .. }
            | Self::RecordDelete { backend, .. }
            | Self::UnknownChallenge { backend, .. } => backend,
        }
    }

    /// Whether repeating the whole call may succeed. The engine itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}
