use std::path::Path;

use crate::error::SecretError;

/// Read a secret from a file
pub fn resolve(path: &Path) -> Result<String, SecretError> {
    std::fs::read_to_string(path).map_err(|e| SecretError::FileError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
