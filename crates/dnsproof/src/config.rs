//! Configuration with environment variable priority
//!
//! Configuration is resolved in this order (first found wins):
//! 1. Environment variables (`DNSPROOF_PROVIDER`, `CLOUDFLARE_*` / `CF_*`, `INFOBLOX_*`)
//! 2. Config file (dnsproof.toml)
//! 3. Default values (where applicable)
//!
//! Credentials accept secret references (`env://`, `file://`, `base64://`)
//! in the config file, and every credential variable has a `*_FILE` twin
//! naming a file that holds the value.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use dnsproof_secrets::{SecretResolver, SecretUri};
use serde::Deserialize;

use crate::engine::{PropagationSettings, DEFAULT_POLLING_INTERVAL, DEFAULT_PROPAGATION_TIMEOUT};
use crate::error::ChallengeError;
use crate::providers::{
    cloudflare, infoblox, BackendConfig, BackendKind, CloudflareAuth, CloudflareSettings,
    InfobloxSettings,
};
use crate::zone::ZoneApex;

/// Environment variable prefix for engine-wide options
const ENV_PREFIX: &str = "DNSPROOF";

pub const DEFAULT_CONFIG_PATH: &str = "dnsproof.toml";

pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration as parsed from TOML, before environment overrides
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct DnsproofConfig {
    /// "cloudflare" or "infoblox"
    pub provider: Option<String>,

    /// TTL of the challenge record (seconds)
    pub ttl: Option<u32>,

    /// Ceiling for the propagation polling loop (seconds)
    pub propagation_timeout_secs: Option<u64>,

    /// Cadence of the propagation polling loop (seconds)
    pub polling_interval_secs: Option<u64>,

    /// Timeout of every backend HTTP request (seconds)
    pub http_timeout_secs: Option<u64>,

    pub cloudflare: Option<CloudflareConfig>,

    pub infoblox: Option<InfobloxConfig>,
}

/// Cloudflare options
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct CloudflareConfig {
    /// Account email, paired with `api_key`
    pub email: Option<String>,

    /// Global API key (secret reference)
    pub api_key: Option<String>,

    /// API token with DNS:Edit permission (secret reference)
    pub dns_api_token: Option<String>,

    /// API token with Zone:Read permission (secret reference)
    pub zone_api_token: Option<String>,

    pub base_url: Option<String>,

    /// Pin the zone instead of enumerating; requires `zone_name` too
    pub zone_id: Option<String>,

    pub zone_name: Option<String>,
}

/// Infoblox options
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct InfobloxConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    /// Secret reference
    pub password: Option<String>,
    pub dns_view: Option<String>,
    pub wapi_version: Option<String>,
    pub ssl_verify: Option<bool>,
    /// PEM bundle: a path or secret reference
    pub ca_certificate: Option<String>,
}

/// Resolved configuration with actual secret values
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub backend: BackendConfig,
    pub ttl: u32,
    pub propagation: PropagationSettings,
}

/// Environment lookups, injectable for tests
struct EnvSource<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvSource<F> {
    fn var(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.trim().is_empty())
    }

    /// First plain value among `names`
    fn first(&self, names: &[String]) -> Option<(String, String)> {
        names
            .iter()
            .find_map(|name| self.var(name).map(|v| (name.clone(), v)))
    }

    /// First credential among `names`, also honoring `<NAME>_FILE`
    fn first_secret(&self, names: &[String]) -> Option<(String, SecretUri)> {
        names.iter().find_map(|name| {
            if let Some(value) = self.var(name) {
                return Some((name.clone(), SecretUri::Plain(value)));
            }
            let file_var = format!("{}_FILE", name);
            self.var(&file_var).map(|path| {
                (
                    file_var,
                    SecretUri::File {
                        path: path.trim().into(),
                    },
                )
            })
        })
    }
}

/// Variable names for a provider option: primary namespace first, then the alternate
fn env_names(kind: BackendKind, key: &str) -> Vec<String> {
    let mut names = vec![format!("{}_{}", kind.env_namespace(), key)];
    if let Some(alt) = kind.alt_env_namespace() {
        names.push(format!("{}_{}", alt, key));
    }
    names
}

fn parse_env<T: FromStr>(
    backend: &'static str,
    found: Option<(String, String)>,
) -> Result<Option<T>, ChallengeError> {
    match found {
        None => Ok(None),
        Some((name, raw)) => raw.trim().parse().map(Some).map_err(|_| {
            ChallengeError::configuration(backend, format!("invalid value '{}' for {}", raw, name))
        }),
    }
}

fn parse_bool(backend: &'static str, found: Option<(String, String)>) -> Result<Option<bool>, ChallengeError> {
    match found {
        None => Ok(None),
        Some((name, raw)) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(ChallengeError::configuration(
                backend,
                format!("invalid boolean '{}' for {}", raw, name),
            )),
        },
    }
}

/// Resolve a credential from the environment or the config file value
fn resolve_secret(
    resolver: &SecretResolver,
    backend: &'static str,
    option: &str,
    from_env: Option<(String, SecretUri)>,
    from_file: Option<&String>,
) -> Result<Option<String>, ChallengeError> {
    let uri = match (from_env, from_file) {
        (Some((_, uri)), _) => uri,
        (None, Some(raw)) => raw.parse::<SecretUri>().map_err(|e| {
            ChallengeError::configuration(backend, format!("invalid {}: {}", option, e))
        })?,
        (None, None) => return Ok(None),
    };

    resolver
        .resolve_trimmed(&uri)
        .map(Some)
        .map_err(|e| ChallengeError::configuration(backend, format!("failed to resolve {}: {}", option, e)))
}

impl DnsproofConfig {
    /// Load configuration from a TOML file. A missing file yields the defaults.
    pub fn load(path: &str) -> Result<Self, ChallengeError> {
        if !Path::new(path).exists() {
            tracing::debug!("No config file at {}, using environment only", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            ChallengeError::configuration("dnsproof", format!("failed to read {}: {}", path, e))
        })?;
        let config = toml::from_str(&content).map_err(|e| {
            ChallengeError::configuration("dnsproof", format!("failed to parse {}: {}", path, e))
        })?;

        tracing::info!("Loaded config from {}", path);
        Ok(config)
    }

    /// Resolve against the process environment
    pub fn resolve(self) -> Result<ResolvedConfig, ChallengeError> {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    /// Resolve against an arbitrary environment lookup
    pub fn resolve_with<F>(self, lookup: F) -> Result<ResolvedConfig, ChallengeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvSource { lookup };
        let resolver = SecretResolver::new();

        // Provider: ENV > config > required
        let provider = env
            .var(&format!("{}_PROVIDER", ENV_PREFIX))
            .or(self.provider)
            .ok_or_else(|| {
                ChallengeError::configuration(
                    "dnsproof",
                    "provider required. Set DNSPROOF_PROVIDER or provider in config",
                )
            })?;
        let kind: BackendKind = provider.parse()?;
        let name = kind.name();

        // TTL: ENV > config > provider default
        let ttl = parse_env::<u32>(name, env.first(&env_names(kind, "TTL")))?
            .or(self.ttl)
            .unwrap_or_else(|| kind.default_ttl());

        let default_timeout = match kind {
            BackendKind::Cloudflare => cloudflare::DEFAULT_PROPAGATION_TIMEOUT,
            BackendKind::Infoblox => DEFAULT_PROPAGATION_TIMEOUT,
        };
        let timeout = parse_env::<u64>(name, env.first(&env_names(kind, "PROPAGATION_TIMEOUT")))?
            .or(self.propagation_timeout_secs)
            .map(Duration::from_secs)
            .unwrap_or(default_timeout);
        let interval = parse_env::<u64>(name, env.first(&env_names(kind, "POLLING_INTERVAL")))?
            .or(self.polling_interval_secs)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_POLLING_INTERVAL);
        let http_timeout = parse_env::<u64>(name, env.first(&env_names(kind, "HTTP_TIMEOUT")))?
            .or(self.http_timeout_secs)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_HTTP_TIMEOUT);

        let backend = match kind {
            BackendKind::Cloudflare => BackendConfig::Cloudflare(resolve_cloudflare(
                &env,
                &resolver,
                self.cloudflare.unwrap_or_default(),
                http_timeout,
            )?),
            BackendKind::Infoblox => BackendConfig::Infoblox(resolve_infoblox(
                &env,
                &resolver,
                self.infoblox.unwrap_or_default(),
                http_timeout,
            )?),
        };

        Ok(ResolvedConfig {
            backend,
            ttl,
            propagation: PropagationSettings { timeout, interval },
        })
    }

    /// Load config file and resolve with environment variable overrides
    pub fn load_and_resolve(path: &str) -> Result<ResolvedConfig, ChallengeError> {
        Self::load(path)?.resolve()
    }
}

fn resolve_cloudflare<F: Fn(&str) -> Option<String>>(
    env: &EnvSource<F>,
    resolver: &SecretResolver,
    config: CloudflareConfig,
    http_timeout: Duration,
) -> Result<CloudflareSettings, ChallengeError> {
    let kind = BackendKind::Cloudflare;
    let name = kind.name();

    let email_names = vec!["CLOUDFLARE_EMAIL".to_string(), "CF_API_EMAIL".to_string()];
    let email = env
        .first(&email_names)
        .map(|(_, v)| v)
        .or(config.email)
        .map(|v| v.trim().to_string());
    let api_key = resolve_secret(
        resolver,
        name,
        "API key",
        env.first_secret(&env_names(kind, "API_KEY")),
        config.api_key.as_ref(),
    )?;
    let dns_token = resolve_secret(
        resolver,
        name,
        "DNS API token",
        env.first_secret(&env_names(kind, "DNS_API_TOKEN")),
        config.dns_api_token.as_ref(),
    )?;
    let zone_token = resolve_secret(
        resolver,
        name,
        "zone API token",
        env.first_secret(&env_names(kind, "ZONE_API_TOKEN")),
        config.zone_api_token.as_ref(),
    )?;

    // Global key when both halves are present, scoped tokens otherwise
    let auth = match (email, api_key, dns_token) {
        (Some(email), Some(key), _) => CloudflareAuth::ApiKey { email, key },
        (_, _, Some(dns_token)) => CloudflareAuth::Token {
            dns_token,
            zone_token,
        },
        _ => {
            return Err(ChallengeError::configuration(
                name,
                "credentials missing: set CLOUDFLARE_EMAIL and CLOUDFLARE_API_KEY, or CLOUDFLARE_DNS_API_TOKEN",
            ))
        }
    };

    let base_url = env
        .first(&env_names(kind, "BASE_URL"))
        .map(|(_, v)| v)
        .or(config.base_url)
        .unwrap_or_else(|| cloudflare::DEFAULT_BASE_URL.to_string());

    let zone_id = env
        .first(&env_names(kind, "ZONE_ID"))
        .map(|(_, v)| v)
        .or(config.zone_id);
    let zone_name = env
        .first(&env_names(kind, "ZONE_NAME"))
        .map(|(_, v)| v)
        .or(config.zone_name);
    let zone = match (zone_id, zone_name) {
        (Some(id), Some(zone_name)) => Some(ZoneApex::new(&zone_name, Some(id.trim().to_string()))),
        (None, None) => None,
        _ => {
            return Err(ChallengeError::configuration(
                name,
                "a pinned zone needs both CLOUDFLARE_ZONE_ID and CLOUDFLARE_ZONE_NAME",
            ))
        }
    };

    Ok(CloudflareSettings {
        auth,
        base_url,
        zone,
        http_timeout,
    })
}

fn resolve_infoblox<F: Fn(&str) -> Option<String>>(
    env: &EnvSource<F>,
    resolver: &SecretResolver,
    config: InfobloxConfig,
    http_timeout: Duration,
) -> Result<InfobloxSettings, ChallengeError> {
    let kind = BackendKind::Infoblox;
    let name = kind.name();

    let host = env
        .first(&env_names(kind, "HOST"))
        .map(|(_, v)| v)
        .or(config.host)
        .ok_or_else(|| {
            ChallengeError::configuration(name, "missing host. Set INFOBLOX_HOST or infoblox.host in config")
        })?;

    let username = resolve_secret(
        resolver,
        name,
        "username",
        env.first_secret(&env_names(kind, "USERNAME")),
        config.username.as_ref(),
    )?;
    let password = resolve_secret(
        resolver,
        name,
        "password",
        env.first_secret(&env_names(kind, "PASSWORD")),
        config.password.as_ref(),
    )?;
    let (username, password) = match (username, password) {
        (Some(u), Some(p)) => (u, p),
        _ => {
            return Err(ChallengeError::configuration(
                name,
                "missing credentials. Set INFOBLOX_USERNAME and INFOBLOX_PASSWORD",
            ))
        }
    };

    let port = parse_env::<u16>(name, env.first(&env_names(kind, "PORT")))?
        .or(config.port)
        .unwrap_or(infoblox::DEFAULT_PORT);
    let dns_view = env
        .first(&env_names(kind, "DNS_VIEW"))
        .map(|(_, v)| v)
        .or(config.dns_view)
        .unwrap_or_else(|| infoblox::DEFAULT_DNS_VIEW.to_string());
    let wapi_version = env
        .first(&env_names(kind, "WAPI_VERSION"))
        .map(|(_, v)| v)
        .or(config.wapi_version)
        .unwrap_or_else(|| infoblox::DEFAULT_WAPI_VERSION.to_string());
    let ssl_verify = parse_bool(name, env.first(&env_names(kind, "SSL_VERIFY")))?
        .or(config.ssl_verify)
        .unwrap_or(true);

    let ca_from_env = env.first(&env_names(kind, "CA_CERTIFICATE")).map(|(var, raw)| {
        let uri = raw.parse::<SecretUri>().unwrap_or(SecretUri::Plain(raw));
        (var, uri)
    });
    let ca_certificate = resolve_secret(
        resolver,
        name,
        "CA certificate",
        ca_from_env,
        config.ca_certificate.as_ref(),
    )?;

    Ok(InfobloxSettings {
        host: host.trim().to_string(),
        port,
        username,
        password,
        dns_view,
        wapi_version,
        ssl_verify,
        ca_certificate,
        http_timeout,
    })
}
