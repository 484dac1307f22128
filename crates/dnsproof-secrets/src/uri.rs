use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Deserializer};

use crate::error::SecretError;

/// A credential reference that can be resolved from one of the backends.
///
/// Supported forms:
/// - `env://VAR_NAME` - environment variable
/// - `file:///path/to/file` - file content
/// - `base64://DATA` - inline base64 data
/// - Plain string - literal value
#[derive(Debug, Clone, PartialEq)]
pub enum SecretUri {
    /// Literal value
    Plain(String),

    /// Environment variable: `env://VAR_NAME`
    Env { var_name: String },

    /// File path: `file:///path/to/file` or a bare path
    File { path: PathBuf },

    /// Inline base64: `base64://DATA`
    Base64 { data: String },
}

impl SecretUri {
    pub fn is_plain(&self) -> bool {
        matches!(self, SecretUri::Plain(_))
    }

    /// Backend name for logging and errors
    pub fn backend_name(&self) -> &'static str {
        match self {
            SecretUri::Plain(_) => "plain",
            SecretUri::Env { .. } => "env",
            SecretUri::File { .. } => "file",
            SecretUri::Base64 { .. } => "base64",
        }
    }
}

impl FromStr for SecretUri {
    type Err = SecretError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(var_name) = s.strip_prefix("env://") {
            if var_name.is_empty() {
                return Err(SecretError::invalid_uri(
                    s,
                    "env URI must specify a variable name",
                ));
            }
            Ok(SecretUri::Env {
                var_name: var_name.to_string(),
            })
        } else if let Some(path) = s.strip_prefix("file://") {
            if path.is_empty() {
                return Err(SecretError::invalid_uri(s, "file URI must specify a path"));
            }
            Ok(SecretUri::File {
                path: PathBuf::from(path),
            })
        } else if let Some(data) = s.strip_prefix("base64://") {
            if data.is_empty() {
                return Err(SecretError::invalid_uri(s, "base64 URI must carry data"));
            }
            Ok(SecretUri::Base64 {
                data: data.to_string(),
            })
        } else if looks_like_file_path(s) {
            Ok(SecretUri::File {
                path: PathBuf::from(s),
            })
        } else {
            Ok(SecretUri::Plain(s.to_string()))
        }
    }
}

/// Bare paths are accepted for certificate bundles and credential files
fn looks_like_file_path(s: &str) -> bool {
    s.starts_with('/')
        || s.starts_with("./")
        || s.starts_with("../")
        || s.ends_with(".pem")
        || s.ends_with(".crt")
}

impl<'de> Deserialize<'de> for SecretUri {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        SecretUri::from_str(&s).map_err(serde::de::Error::custom)
    }
}
