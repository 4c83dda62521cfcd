//! Typed view of the `registry:` config section.

use anyhow::{bail, Context, Result};
use serde_json::Value;

pub const DEFAULT_DESCRIPTION: &str = "Agricultural sensor";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Network-server endpoint and the metadata stamped on devices it creates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySettings {
    /// Scheme + host + port, no trailing slash.
    pub base_url: String,
    pub application_id: i64,
    pub device_profile_id: String,
    pub description: String,
    pub timeout_secs: u64,
    /// Skip TLS certificate verification (self-signed network servers).
    pub accept_invalid_certs: bool,
}

impl RegistrySettings {
    /// Extract and validate. Missing required fields fail before any network
    /// traffic happens.
    pub fn from_config_json(config: &Value) -> Result<Self> {
        let base_url = required_str(config, "/registry/base_url")?;
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            bail!("CONFIG_INVALID /registry/base_url must start with http:// or https://");
        }

        let application_id = match config.pointer("/registry/application_id") {
            Some(Value::Number(n)) => n
                .as_i64()
                .context("CONFIG_INVALID /registry/application_id must be an integer")?,
            Some(Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .context("CONFIG_INVALID /registry/application_id must be an integer")?,
            _ => bail!("CONFIG_MISSING /registry/application_id"),
        };

        let device_profile_id = required_str(config, "/registry/device_profile_id")?;

        let description = optional_str(config, "/registry/description")
            .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string());

        let timeout_secs = match config.pointer("/registry/timeout_secs") {
            None | Some(Value::Null) => DEFAULT_TIMEOUT_SECS,
            Some(v) => v
                .as_u64()
                .filter(|t| *t > 0)
                .context("CONFIG_INVALID /registry/timeout_secs must be a positive integer")?,
        };

        let accept_invalid_certs = match config.pointer("/registry/accept_invalid_certs") {
            None | Some(Value::Null) => false,
            Some(v) => v
                .as_bool()
                .context("CONFIG_INVALID /registry/accept_invalid_certs must be a boolean")?,
        };

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            application_id,
            device_profile_id,
            description,
            timeout_secs,
            accept_invalid_certs,
        })
    }
}

pub(crate) fn optional_str(config: &Value, pointer: &str) -> Option<String> {
    let s = config.pointer(pointer)?.as_str()?.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

fn required_str(config: &Value, pointer: &str) -> Result<String> {
    optional_str(config, pointer).with_context(|| format!("CONFIG_MISSING {pointer}"))
}
