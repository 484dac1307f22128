//! Credential reference resolution for DNS provider backends
//!
//! Provider credentials (API tokens, passwords, CA bundles) are configured as
//! references and resolved once, when the provisioning engine is built:
//!
//! - **Environment variables** (`env://VAR_NAME`): read from the process environment
//! - **Files** (`file:///path` or just `/path`): read from the filesystem
//! - **Base64** (`base64://DATA`): decoded inline data
//! - **Plain values**: any string without a scheme is the literal value
//!
//! # Example
//!
//! ```rust,ignore
//! use dnsproof_secrets::{SecretResolver, SecretUri};
//!
//! let uri: SecretUri = "env://CLOUDFLARE_DNS_API_TOKEN".parse()?;
//! let token = SecretResolver::new().resolve_trimmed(&uri)?;
//! ```
//!
//! # Features
//!
//! - `env` (default): environment variable references
//! - `file` (default): file references
//! - `base64` (default): inline base64 references

mod backends;
mod error;
mod resolver;
mod uri;

pub use error::SecretError;
pub use resolver::SecretResolver;
pub use uri::SecretUri;
