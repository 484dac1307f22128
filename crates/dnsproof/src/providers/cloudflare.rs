//! Cloudflare DNS backend
//!
//! Talks to the Cloudflare API v4. Authenticates either with a global API key
//! (`X-Auth-Email` / `X-Auth-Key`) or with scoped API tokens. A separate
//! Zone:Read token may be supplied for zone enumeration while the DNS:Edit
//! token only touches records.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::backend::{BackendSession, DnsBackend, RecordReference, TxtRecord};
use crate::error::{BackendError, BackendResult, ChallengeError};
use crate::zone::{ZoneApex, ZoneResolver};

pub const NAME: &str = "cloudflare";

pub const DEFAULT_BASE_URL: &str = "https://api.cloudflare.com/client/v4";

/// Cloudflare rejects lower TTLs for non-enterprise zones
pub const MIN_TTL: u32 = 120;

pub const DEFAULT_PROPAGATION_TIMEOUT: Duration = Duration::from_secs(120);

const ZONES_PER_PAGE: u32 = 50;

/// "Record does not exist"
const CODE_RECORD_NOT_FOUND: i64 = 81044;

/// Invalid or missing credentials / insufficient permissions
const AUTH_ERROR_CODES: &[i64] = &[9103, 9106, 9109, 10000];

/// Cloudflare credentials
#[derive(Clone)]
pub enum CloudflareAuth {
    /// Global API key
    ApiKey { email: String, key: String },
    /// Scoped API tokens; `zone_token` defaults to `dns_token`
    Token {
        dns_token: String,
        zone_token: Option<String>,
    },
}

impl fmt::Debug for CloudflareAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloudflareAuth::ApiKey { email, .. } => f
                .debug_struct("ApiKey")
                .field("email", email)
                .field("key", &"<redacted>")
                .finish(),
            CloudflareAuth::Token { zone_token, .. } => f
                .debug_struct("Token")
                .field("dns_token", &"<redacted>")
                .field("zone_token", &zone_token.as_ref().map(|_| "<redacted>"))
                .finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CloudflareSettings {
    pub auth: CloudflareAuth,
    pub base_url: String,
    /// Pinned zone; skips enumeration when set
    pub zone: Option<ZoneApex>,
    pub http_timeout: Duration,
}

impl CloudflareSettings {
    pub fn new(auth: CloudflareAuth) -> Self {
        Self {
            auth,
            base_url: DEFAULT_BASE_URL.to_string(),
            zone: None,
            http_timeout: Duration::from_secs(30),
        }
    }
}

/// Which permission set a request needs
#[derive(Debug, Clone, Copy)]
enum Scope {
    Zone,
    Dns,
}

/// Cloudflare API backend
#[derive(Debug)]
pub struct CloudflareBackend {
    client: Client,
    auth: CloudflareAuth,
    base_url: String,
    resolver: ZoneResolver,
}

impl CloudflareBackend {
    pub fn new(settings: CloudflareSettings) -> Result<Self, ChallengeError> {
        if let Some(zone) = &settings.zone {
            if zone.id.as_deref().map_or(true, str::is_empty) {
                return Err(ChallengeError::configuration(
                    NAME,
                    format!("zone '{}' is pinned without a zone id", zone.name),
                ));
            }
        }

        let client = Client::builder()
            .timeout(settings.http_timeout)
            .build()
            .map_err(|e| {
                ChallengeError::configuration(NAME, format!("failed to create HTTP client: {}", e))
            })?;

        let resolver = match settings.zone {
            Some(zone) => ZoneResolver::Explicit(zone),
            None => ZoneResolver::Enumerate,
        };

        Ok(Self {
            client,
            auth: settings.auth,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            resolver,
        })
    }
}

#[async_trait]
impl DnsBackend for CloudflareBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn min_ttl(&self) -> u32 {
        MIN_TTL
    }

    fn zone_resolver(&self) -> &ZoneResolver {
        &self.resolver
    }

    /// Token authentication has no handshake; the session only carries the
    /// pooled client and credentials
    async fn open(&self) -> BackendResult<Box<dyn BackendSession>> {
        Ok(Box::new(CloudflareSession {
            client: self.client.clone(),
            auth: self.auth.clone(),
            base_url: self.base_url.clone(),
        }))
    }
}

struct CloudflareSession {
    client: Client,
    auth: CloudflareAuth,
    base_url: String,
}

impl CloudflareSession {
    fn authorize(&self, request: RequestBuilder, scope: Scope) -> RequestBuilder {
        match (&self.auth, scope) {
            (CloudflareAuth::ApiKey { email, key }, _) => request
                .header("X-Auth-Email", email)
                .header("X-Auth-Key", key),
            (CloudflareAuth::Token { dns_token, .. }, Scope::Dns) => request.bearer_auth(dns_token),
            (
                CloudflareAuth::Token {
                    dns_token,
                    zone_token,
                },
                Scope::Zone,
            ) => request.bearer_auth(zone_token.as_deref().unwrap_or(dns_token)),
        }
    }

    fn zone_id<'a>(zone: Option<&'a ZoneApex>) -> BackendResult<&'a str> {
        zone.and_then(|z| z.id.as_deref())
            .ok_or_else(|| BackendError::Api("zone id is required for record operations".to_string()))
    }
}

#[async_trait]
impl BackendSession for CloudflareSession {
    async fn list_zones(&mut self) -> BackendResult<Vec<ZoneApex>> {
        let mut zones = Vec::new();
        let mut page = 1;

        loop {
            let request = self.client.get(format!(
                "{}/zones?per_page={}&page={}",
                self.base_url, ZONES_PER_PAGE, page
            ));
            let response = self.authorize(request, Scope::Zone).send().await?;
            let body: ApiResponse<Vec<Zone>> = decode(response).await?;

            let batch = body.result.unwrap_or_default();
            let fetched = batch.len();
            zones.extend(batch.into_iter().map(|z| ZoneApex::new(&z.name, Some(z.id))));

            let total_pages = body.result_info.map_or(1, |info| info.total_pages);
            trace!(page, total_pages, fetched, "Fetched zone page");

            if fetched == 0 || page >= total_pages {
                break;
            }
            page += 1;
        }

        debug!(zones = zones.len(), "Listed Cloudflare zones");
        Ok(zones)
    }

    async fn create_record(
        &mut self,
        zone: Option<&ZoneApex>,
        record: &TxtRecord,
    ) -> BackendResult<RecordReference> {
        let zone_id = Self::zone_id(zone)?;

        let request = self
            .client
            .post(format!("{}/zones/{}/dns_records", self.base_url, zone_id))
            .json(&CreateDnsRecord {
                record_type: "TXT",
                name: record.name.relative(),
                content: format!("\"{}\"", record.value),
                ttl: record.ttl,
            });
        let response = self.authorize(request, Scope::Dns).send().await?;
        let body: ApiResponse<DnsRecord> = decode(response).await?;

        let created = body
            .result
            .ok_or_else(|| BackendError::Api("no record in response".to_string()))?;
        debug!(zone_id = %zone_id, record_id = %created.id, "Cloudflare record created");
        Ok(RecordReference::new(created.id))
    }

    async fn delete_record(
        &mut self,
        zone: Option<&ZoneApex>,
        reference: &RecordReference,
    ) -> BackendResult<()> {
        let zone_id = Self::zone_id(zone)?;

        let request = self.client.delete(format!(
            "{}/zones/{}/dns_records/{}",
            self.base_url, zone_id, reference
        ));
        let response = self.authorize(request, Scope::Dns).send().await?;
        let _: ApiResponse<DnsRecord> = decode(response).await?;

        debug!(zone_id = %zone_id, record_id = %reference, "Cloudflare record deleted");
        Ok(())
    }

    async fn close(&mut self) {}
}

/// Decode the Cloudflare response envelope, turning API failures into backend errors
async fn decode<T: DeserializeOwned>(response: Response) -> BackendResult<ApiResponse<T>> {
    let status = response.status();
    let text = response.text().await?;

    match serde_json::from_str::<ApiResponse<T>>(&text) {
        Ok(body) if body.success && status.is_success() => Ok(body),
        Ok(body) => Err(classify(status, &body.errors, &text)),
        Err(e) if status.is_success() => Err(BackendError::Api(format!(
            "unexpected response body: {}",
            e
        ))),
        Err(_) => Err(classify(status, &[], &text)),
    }
}

fn classify(status: StatusCode, errors: &[ApiMessage], body: &str) -> BackendError {
    let detail = if errors.is_empty() {
        format!("HTTP {}: {}", status, body.trim())
    } else {
        let messages = errors
            .iter()
            .map(|e| format!("{}: {}", e.code, e.message))
            .collect::<Vec<_>>()
            .join(", ");
        format!("HTTP {}: {}", status, messages)
    };

    if status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || errors.iter().any(|e| AUTH_ERROR_CODES.contains(&e.code))
    {
        BackendError::Authentication(detail)
    } else if status == StatusCode::NOT_FOUND
        || errors.iter().any(|e| e.code == CODE_RECORD_NOT_FOUND)
    {
        BackendError::RecordNotFound(detail)
    } else {
        BackendError::Api(detail)
    }
}

// Cloudflare API types

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
    result_info: Option<ResultInfo>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    total_pages: u32,
}

#[derive(Debug, Deserialize)]
struct Zone {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct DnsRecord {
    id: String,
}

#[derive(Debug, Serialize)]
struct CreateDnsRecord<'a> {
    #[serde(rename = "type")]
    record_type: &'a str,
    name: &'a str,
    content: String,
    ttl: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(code: i64) -> ApiMessage {
        ApiMessage {
            code,
            message: "msg".to_string(),
        }
    }

    #[test]
    fn test_classify_auth_failures() {
        assert!(matches!(
            classify(StatusCode::FORBIDDEN, &[], ""),
            BackendError::Authentication(_)
        ));
        assert!(matches!(
            classify(StatusCode::BAD_REQUEST, &[message(9109)], ""),
            BackendError::Authentication(_)
        ));
    }

    #[test]
    fn test_classify_record_not_found() {
        assert!(matches!(
            classify(StatusCode::NOT_FOUND, &[message(81044)], ""),
            BackendError::RecordNotFound(_)
        ));
        assert!(matches!(
            classify(StatusCode::BAD_REQUEST, &[message(81044)], ""),
            BackendError::RecordNotFound(_)
        ));
    }

    #[test]
    fn test_classify_keeps_provider_detail() {
        let err = classify(
            StatusCode::BAD_REQUEST,
            &[ApiMessage {
                code: 81058,
                message: "An identical record already exists.".to_string(),
            }],
            "",
        );
        let text = err.to_string();
        assert!(text.contains("81058"));
        assert!(text.contains("identical record"));
    }

    #[test]
    fn test_pinned_zone_requires_id() {
        let mut settings = CloudflareSettings::new(CloudflareAuth::Token {
            dns_token: "token".to_string(),
            zone_token: None,
        });
        settings.zone = Some(ZoneApex::new("example.com", None));

        let err = CloudflareBackend::new(settings).unwrap_err();
        assert!(matches!(err, ChallengeError::Configuration { .. }));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let auth = CloudflareAuth::ApiKey {
            email: "ops@example.com".to_string(),
            key: "super-secret-key".to_string(),
        };
        let rendered = format!("{:?}", auth);
        assert!(rendered.contains("ops@example.com"));
        assert!(!rendered.contains("super-secret-key"));
    }
}
