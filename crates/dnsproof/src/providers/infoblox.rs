//! Infoblox DNS backend
//!
//! Manages TXT records on an on-premises Infoblox grid through the WAPI REST
//! interface. Each session authenticates with username/password and logs out
//! when closed. Records are placed by full name inside the configured DNS
//! view, so no zone lookup is needed.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Certificate, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::backend::{BackendSession, DnsBackend, RecordReference, TxtRecord};
use crate::error::{BackendError, BackendResult, ChallengeError};
use crate::zone::{ZoneApex, ZoneResolver};

pub const NAME: &str = "infoblox";

pub const DEFAULT_TTL: u32 = 120;

/// Zero would make resolvers drop the answer immediately
pub const MIN_TTL: u32 = 1;

pub const DEFAULT_PORT: u16 = 443;
pub const DEFAULT_DNS_VIEW: &str = "External";
pub const DEFAULT_WAPI_VERSION: &str = "2.11";

/// Comment attached to every record this backend creates
const RECORD_COMMENT: &str = "dnsproof";

#[derive(Clone)]
pub struct InfobloxSettings {
    /// Grid manager host; may carry an explicit `http://` or `https://` scheme
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub dns_view: String,
    pub wapi_version: String,
    pub ssl_verify: bool,
    /// PEM bundle trusted in addition to the system roots
    pub ca_certificate: Option<String>,
    pub http_timeout: Duration,
}

impl fmt::Debug for InfobloxSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfobloxSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("dns_view", &self.dns_view)
            .field("wapi_version", &self.wapi_version)
            .field("ssl_verify", &self.ssl_verify)
            .field("ca_certificate", &self.ca_certificate.is_some())
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}

impl InfobloxSettings {
    pub fn new(host: &str, username: &str, password: &str) -> Self {
        Self {
            host: host.to_string(),
            port: DEFAULT_PORT,
            username: username.to_string(),
            password: password.to_string(),
            dns_view: DEFAULT_DNS_VIEW.to_string(),
            wapi_version: DEFAULT_WAPI_VERSION.to_string(),
            ssl_verify: true,
            ca_certificate: None,
            http_timeout: Duration::from_secs(30),
        }
    }

    /// `https://host:port/wapi/v<version>`
    pub fn base_url(&self) -> String {
        let host = self.host.trim_end_matches('/');
        let origin = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{}:{}", host, self.port)
        };
        format!("{}/wapi/v{}", origin, self.wapi_version)
    }
}

/// Infoblox WAPI backend
#[derive(Debug)]
pub struct InfobloxBackend {
    client: Client,
    base_url: String,
    username: String,
    password: String,
    dns_view: String,
    resolver: ZoneResolver,
}

impl InfobloxBackend {
    pub fn new(settings: InfobloxSettings) -> Result<Self, ChallengeError> {
        if settings.host.trim().is_empty() {
            return Err(ChallengeError::configuration(NAME, "missing host"));
        }
        if settings.username.is_empty() || settings.password.is_empty() {
            return Err(ChallengeError::configuration(NAME, "missing credentials"));
        }

        let mut builder = Client::builder().timeout(settings.http_timeout);
        if let Some(pem) = &settings.ca_certificate {
            let certificate = Certificate::from_pem(pem.as_bytes()).map_err(|e| {
                ChallengeError::configuration(NAME, format!("invalid CA certificate: {}", e))
            })?;
            builder = builder.add_root_certificate(certificate);
        } else if !settings.ssl_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder.build().map_err(|e| {
            ChallengeError::configuration(NAME, format!("failed to create HTTP client: {}", e))
        })?;

        Ok(Self {
            client,
            base_url: settings.base_url(),
            username: settings.username,
            password: settings.password,
            dns_view: settings.dns_view,
            resolver: ZoneResolver::Flat,
        })
    }
}

#[async_trait]
impl DnsBackend for InfobloxBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn min_ttl(&self) -> u32 {
        MIN_TTL
    }

    fn zone_resolver(&self) -> &ZoneResolver {
        &self.resolver
    }

    /// Authenticate against the grid before any record operation
    async fn open(&self) -> BackendResult<Box<dyn BackendSession>> {
        let response = self
            .client
            .get(format!("{}/grid", self.base_url))
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;
        let _: serde_json::Value = decode(response).await?;

        debug!(base_url = %self.base_url, "Infoblox session established");
        Ok(Box::new(InfobloxSession {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            dns_view: self.dns_view.clone(),
            open: true,
        }))
    }
}

struct InfobloxSession {
    client: Client,
    base_url: String,
    username: String,
    password: String,
    dns_view: String,
    open: bool,
}

#[async_trait]
impl BackendSession for InfobloxSession {
    async fn create_record(
        &mut self,
        _zone: Option<&ZoneApex>,
        record: &TxtRecord,
    ) -> BackendResult<RecordReference> {
        let response = self
            .client
            .post(format!("{}/record:txt", self.base_url))
            .basic_auth(&self.username, Some(&self.password))
            .json(&CreateTxtRecord {
                name: record.name.relative(),
                text: &record.value,
                ttl: record.ttl,
                use_ttl: true,
                view: &self.dns_view,
                comment: RECORD_COMMENT,
            })
            .send()
            .await?;

        let reference: String = decode(response).await?;
        debug!(reference = %reference, view = %self.dns_view, "Infoblox record created");
        Ok(RecordReference::new(reference))
    }

    async fn delete_record(
        &mut self,
        _zone: Option<&ZoneApex>,
        reference: &RecordReference,
    ) -> BackendResult<()> {
        let response = self
            .client
            .delete(format!("{}/{}", self.base_url, reference))
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;

        let _: serde_json::Value = decode(response).await?;
        debug!(reference = %reference, "Infoblox record deleted");
        Ok(())
    }

    async fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;

        let result = self
            .client
            .post(format!("{}/logout", self.base_url))
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                debug!("Infoblox session logged out");
            }
            Ok(response) => {
                warn!(status = %response.status(), "Infoblox logout rejected");
            }
            Err(e) => {
                warn!(error = %e, "Infoblox logout failed");
            }
        }
    }
}

/// Decode a WAPI response, turning error bodies into backend errors
async fn decode<T: DeserializeOwned>(response: Response) -> BackendResult<T> {
    let status = response.status();
    let text = response.text().await?;

    if status.is_success() {
        return serde_json::from_str(&text)
            .map_err(|e| BackendError::Api(format!("unexpected response body: {}", e)));
    }

    let error: Option<WapiError> = serde_json::from_str(&text).ok();
    let detail = match &error {
        Some(e) => format!("HTTP {}: {} ({})", status, e.text, e.code),
        None => format!("HTTP {}: {}", status, text.trim()),
    };

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        Err(BackendError::Authentication(detail))
    } else if status == StatusCode::NOT_FOUND
        || error.as_ref().is_some_and(|e| e.code.ends_with("NotFound"))
    {
        Err(BackendError::RecordNotFound(detail))
    } else {
        Err(BackendError::Api(detail))
    }
}

// WAPI types

#[derive(Debug, Serialize)]
struct CreateTxtRecord<'a> {
    name: &'a str,
    text: &'a str,
    ttl: u32,
    use_ttl: bool,
    view: &'a str,
    comment: &'a str,
}

#[derive(Debug, Deserialize)]
struct WapiError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url() {
        let settings = InfobloxSettings::new("grid.example.net", "admin", "secret");
        assert_eq!(settings.base_url(), "https://grid.example.net:443/wapi/v2.11");

        let mut settings = InfobloxSettings::new("http://127.0.0.1:8080/", "admin", "secret");
        settings.wapi_version = "2.12".to_string();
        assert_eq!(settings.base_url(), "http://127.0.0.1:8080/wapi/v2.12");
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let err = InfobloxBackend::new(InfobloxSettings::new("grid.example.net", "admin", ""))
            .unwrap_err();
        assert!(err.to_string().contains("missing credentials"));

        let err = InfobloxBackend::new(InfobloxSettings::new("", "admin", "secret")).unwrap_err();
        assert!(err.to_string().contains("missing host"));
    }

    #[test]
    fn test_debug_redacts_password() {
        let settings = InfobloxSettings::new("grid.example.net", "admin", "hunter2");
        let rendered = format!("{:?}", settings);
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("hunter2"));
    }
}
