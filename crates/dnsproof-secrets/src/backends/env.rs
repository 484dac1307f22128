use crate::error::SecretError;

/// Read a secret from an environment variable
pub fn resolve(var_name: &str) -> Result<String, SecretError> {
    std::env::var(var_name).map_err(|_| SecretError::EnvNotSet {
        var: var_name.to_string(),
    })
}
