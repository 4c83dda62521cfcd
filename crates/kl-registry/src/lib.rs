//! LoRa network-server (LoRa App Server REST API) registry client.
//!
//! One [`LoraServerRegistry`] is built per run: construction logs in and the
//! JWT stays inside the client. Every call is a single awaited round-trip;
//! there is no retry and no batching.
//!
//! Endpoints used:
//!
//! | Operation       | Request                              |
//! |-----------------|--------------------------------------|
//! | login           | `POST /api/internal/login`           |
//! | fetch_device    | `GET  /api/devices/{devEUI}`         |
//! | fetch_key       | `GET  /api/devices/{devEUI}/keys`    |
//! | create_device   | `POST /api/devices`                  |
//! | provision_key   | `POST /api/devices/{devEUI}/keys`    |
//! | overwrite_key   | `PUT  /api/devices/{devEUI}/keys`    |

mod wire;

use std::time::Duration;

use kl_config::registry::RegistrySettings;
use kl_config::secrets::RegistryCredentials;
use kl_reconcile::{ReconcileError, Registry, RegistryDevice, RegistryOp};
use reqwest::{Method, RequestBuilder, Url};
use serde_json::Value;
use tracing::debug;

use wire::{
    device_name, error_message, is_not_found, CreateDeviceBody, DeviceBody, DeviceKeysBody,
    DeviceKeysWire, DeviceResponse, KeysResponse, LoginBody, LoginResponse,
};

/// Header carrying the session JWT.
pub const AUTH_HEADER: &str = "Grpc-Metadata-Authorization";

/// Metadata stamped on every device this client creates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTemplate {
    pub application_id: i64,
    pub device_profile_id: String,
    pub description: String,
}

impl From<&RegistrySettings> for DeviceTemplate {
    fn from(s: &RegistrySettings) -> Self {
        Self {
            application_id: s.application_id,
            device_profile_id: s.device_profile_id.clone(),
            description: s.description.clone(),
        }
    }
}

/// Authenticated registry session. **The JWT is redacted in `Debug` output.**
#[derive(Clone)]
pub struct LoraServerRegistry {
    http: reqwest::Client,
    base_url: String,
    jwt: String,
    template: DeviceTemplate,
}

impl std::fmt::Debug for LoraServerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoraServerRegistry")
            .field("base_url", &self.base_url)
            .field("jwt", &"<REDACTED>")
            .field("template", &self.template)
            .finish()
    }
}

impl LoraServerRegistry {
    /// Build the HTTP client from settings and log in.
    pub async fn login(
        settings: &RegistrySettings,
        creds: &RegistryCredentials,
    ) -> Result<Self, ReconcileError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .danger_accept_invalid_certs(settings.accept_invalid_certs)
            .build()
            .map_err(|e| ReconcileError::remote(None, RegistryOp::Login, e.to_string()))?;

        Self::login_with_client(http, settings, creds).await
    }

    /// Log in with a caller-supplied client (custom TLS roots, proxies).
    pub async fn login_with_client(
        http: reqwest::Client,
        settings: &RegistrySettings,
        creds: &RegistryCredentials,
    ) -> Result<Self, ReconcileError> {
        let base_url = settings.base_url.trim_end_matches('/').to_string();
        let url = format!("{base_url}/api/internal/login");
        debug!(url = %url, "registry login");

        let body = LoginBody {
            username: &creds.username,
            password: &creds.password,
        };
        let v = send(http.post(url).json(&body), None, RegistryOp::Login).await?;
        let login: LoginResponse = decode(v, None, RegistryOp::Login)?;
        if login.jwt.trim().is_empty() {
            return Err(ReconcileError::remote(
                None,
                RegistryOp::Login,
                "login response carried an empty jwt",
            ));
        }

        Ok(Self {
            http,
            base_url,
            jwt: login.jwt,
            template: DeviceTemplate::from(settings),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `{base}/api/devices[/{devEUI}][/{tail}...]`. The devEUI is pushed as a
    /// single percent-encoded path segment, so `?`, `#` and `/` in it cannot
    /// reach another resource.
    fn devices_url(
        &self,
        dev_eui: Option<&str>,
        tail: &[&str],
        op: RegistryOp,
    ) -> Result<Url, ReconcileError> {
        if let Some(d) = dev_eui {
            if d.is_empty() || d == "." || d == ".." {
                return Err(ReconcileError::remote(
                    Some(d),
                    op,
                    "devEUI cannot be used as a url path segment",
                ));
            }
        }

        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ReconcileError::remote(dev_eui, op, format!("invalid base url: {e}")))?;
        {
            let mut segs = url
                .path_segments_mut()
                .map_err(|_| ReconcileError::remote(dev_eui, op, "base url cannot carry a path"))?;
            segs.pop_if_empty().extend(["api", "devices"]);
            if let Some(d) = dev_eui {
                segs.push(d);
            }
            segs.extend(tail);
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        debug!(method = %method, url = %url, "registry request");
        self.http
            .request(method, url)
            .header(AUTH_HEADER, self.jwt.as_str())
    }

    async fn write_keys(
        &self,
        method: Method,
        dev_eui: &str,
        nwk_key: &str,
        op: RegistryOp,
    ) -> Result<(), ReconcileError> {
        let body = DeviceKeysBody {
            device_keys: DeviceKeysWire {
                dev_eui: dev_eui.to_string(),
                nwk_key: Some(nwk_key.to_string()),
            },
        };
        let url = self.devices_url(Some(dev_eui), &["keys"], op)?;
        let req = self.request(method, url).json(&body);
        send(req, Some(dev_eui), op).await.map(|_| ())
    }
}

/// Send a request and return the JSON body (`Null` when empty).
///
/// An error payload saying the object does not exist becomes
/// [`ReconcileError::NotFound`]; any other error payload, non-2xx status, or
/// transport problem becomes [`ReconcileError::RemoteFailure`].
async fn send(
    req: RequestBuilder,
    dev_eui: Option<&str>,
    op: RegistryOp,
) -> Result<Value, ReconcileError> {
    let resp = req
        .send()
        .await
        .map_err(|e| ReconcileError::remote(dev_eui, op, format!("request failed: {e}")))?;

    let status = resp.status();
    let text = resp
        .text()
        .await
        .map_err(|e| ReconcileError::remote(dev_eui, op, format!("read body failed: {e}")))?;

    let body: Value = if text.trim().is_empty() {
        Value::Null
    } else {
        match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(e) if status.is_success() => {
                return Err(ReconcileError::remote(
                    dev_eui,
                    op,
                    format!("response json decode failed: {e}"),
                ))
            }
            Err(_) => Value::Null,
        }
    };

    if is_not_found(&body) {
        return Err(ReconcileError::NotFound {
            dev_eui: dev_eui.unwrap_or_default().to_string(),
            object: match op {
                RegistryOp::FetchKey => "keys",
                _ => "device",
            },
        });
    }

    if let Some(msg) = error_message(&body) {
        return Err(ReconcileError::remote(
            dev_eui,
            op,
            format!("http {} error: {msg}", status.as_u16()),
        ));
    }

    if !status.is_success() {
        return Err(ReconcileError::remote(
            dev_eui,
            op,
            format!("http {}", status.as_u16()),
        ));
    }

    Ok(body)
}

fn decode<T: serde::de::DeserializeOwned>(
    v: Value,
    dev_eui: Option<&str>,
    op: RegistryOp,
) -> Result<T, ReconcileError> {
    serde_json::from_value(v)
        .map_err(|e| ReconcileError::remote(dev_eui, op, format!("malformed response: {e}")))
}

fn not_found_as_none<T>(r: Result<T, ReconcileError>) -> Result<Option<T>, ReconcileError> {
    match r {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

#[async_trait::async_trait]
impl Registry for LoraServerRegistry {
    async fn fetch_device(&self, dev_eui: &str) -> Result<Option<RegistryDevice>, ReconcileError> {
        let op = RegistryOp::FetchDevice;
        let url = self.devices_url(Some(dev_eui), &[], op)?;
        let req = self.request(Method::GET, url);
        let Some(v) = not_found_as_none(send(req, Some(dev_eui), op).await)? else {
            return Ok(None);
        };
        let resp: DeviceResponse = decode(v, Some(dev_eui), op)?;
        Ok(Some(RegistryDevice {
            dev_eui: dev_eui.to_string(),
            name: resp.device.name,
            application_id: resp.device.application_id.map(|id| match id {
                Value::String(s) => s,
                other => other.to_string(),
            }),
        }))
    }

    async fn fetch_key(&self, dev_eui: &str) -> Result<Option<String>, ReconcileError> {
        let op = RegistryOp::FetchKey;
        let url = self.devices_url(Some(dev_eui), &["keys"], op)?;
        let req = self.request(Method::GET, url);
        let Some(v) = not_found_as_none(send(req, Some(dev_eui), op).await)? else {
            return Ok(None);
        };
        let resp: KeysResponse = decode(v, Some(dev_eui), op)?;
        match resp.device_keys.nwk_key {
            Some(k) if !k.is_empty() => Ok(Some(k)),
            _ => Err(ReconcileError::remote(
                Some(dev_eui),
                op,
                "malformed response: deviceKeys.nwkKey missing",
            )),
        }
    }

    async fn create_device(&self, dev_eui: &str) -> Result<(), ReconcileError> {
        let body = CreateDeviceBody {
            device: DeviceBody {
                application_id: self.template.application_id,
                description: &self.template.description,
                dev_eui,
                device_profile_id: &self.template.device_profile_id,
                name: device_name(dev_eui),
            },
        };
        let url = self.devices_url(None, &[], RegistryOp::CreateDevice)?;
        let req = self.request(Method::POST, url).json(&body);
        send(req, Some(dev_eui), RegistryOp::CreateDevice)
            .await
            .map(|_| ())
    }

    async fn provision_key(&self, dev_eui: &str, nwk_key: &str) -> Result<(), ReconcileError> {
        self.write_keys(Method::POST, dev_eui, nwk_key, RegistryOp::ProvisionKey)
            .await
    }

    async fn overwrite_key(&self, dev_eui: &str, nwk_key: &str) -> Result<(), ReconcileError> {
        self.write_keys(Method::PUT, dev_eui, nwk_key, RegistryOp::OverwriteKey)
            .await
    }
}
