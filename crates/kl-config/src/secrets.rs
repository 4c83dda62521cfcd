//! Registry credential resolution.
//!
//! # Contract
//! - Config YAML stores only **env var NAMES** under
//!   `registry.credentials.{username_env,password_env}`.
//! - Callers invoke [`resolve_registry_credentials`] once at startup and pass
//!   the result into the registry client constructor.
//! - `Debug` redacts the values; errors name the variable, never its value.

use anyhow::{bail, Result};
use serde_json::Value;

use crate::registry::optional_str;

pub const DEFAULT_USERNAME_ENV: &str = "KL_REGISTRY_USERNAME";
pub const DEFAULT_PASSWORD_ENV: &str = "KL_REGISTRY_PASSWORD";

/// Network-server login. **Values are redacted in `Debug` output.**
#[derive(Clone)]
pub struct RegistryCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for RegistryCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryCredentials")
            .field("username", &"<REDACTED>")
            .field("password", &"<REDACTED>")
            .finish()
    }
}

/// Returns `None` if the variable is unset or blank.
fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Resolve the login from the environment variables named in config
/// (falling back to `KL_REGISTRY_USERNAME` / `KL_REGISTRY_PASSWORD`).
///
/// # Errors
/// SECRETS_MISSING with the **env var NAME** of the first missing variable.
pub fn resolve_registry_credentials(config_json: &Value) -> Result<RegistryCredentials> {
    let username_var = optional_str(config_json, "/registry/credentials/username_env")
        .unwrap_or_else(|| DEFAULT_USERNAME_ENV.to_string());
    let password_var = optional_str(config_json, "/registry/credentials/password_env")
        .unwrap_or_else(|| DEFAULT_PASSWORD_ENV.to_string());

    let Some(username) = resolve_env(&username_var) else {
        bail!(
            "SECRETS_MISSING: required env var '{}' (registry username) is not set or empty",
            username_var
        );
    };
    let Some(password) = resolve_env(&password_var) else {
        bail!(
            "SECRETS_MISSING: required env var '{}' (registry password) is not set or empty",
            password_var
        );
    };

    Ok(RegistryCredentials { username, password })
}
