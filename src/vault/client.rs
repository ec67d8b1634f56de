// Warden — External Vault Client
//
// `GET {base}/secrets/{name}` against an OpenBao-style HTTP store, with an
// optional `X-Vault-Token` header. The body carries the value under `value`
// (or `password`) and an optional `description`.

use std::fmt;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::Url;
use serde::Deserialize;
use zeroize::Zeroizing;

use super::VaultError;

const TOKEN_HEADER: &str = "X-Vault-Token";

/// A secret served by the external store.
pub struct VaultRecord {
    pub name: String,
    pub description: Option<String>,
    value: Zeroizing<String>,
}

impl VaultRecord {
    pub fn new(name: String, description: Option<String>, value: Zeroizing<String>) -> Self {
        Self {
            name,
            description,
            value,
        }
    }

    pub fn into_value(self) -> Zeroizing<String> {
        self.value
    }
}

impl fmt::Debug for VaultRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultRecord")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

/// Source of secrets that are not held locally.
pub trait VaultFallback: Send + Sync {
    /// `None` on a miss and on any failure.
    fn lookup(&self, secret_name: &str) -> Option<VaultRecord>;
}

#[derive(Deserialize)]
struct VaultSecretBody {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(alias = "password")]
    value: String,
}

/// Blocking HTTP implementation. Build and use it off the async runtime.
pub struct HttpVaultFallback {
    base_url: Url,
    token: Option<Zeroizing<String>>,
    client: Client,
}

impl HttpVaultFallback {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        token: Option<Zeroizing<String>>,
    ) -> Result<Self, VaultError> {
        let base_url =
            Url::parse(base_url).map_err(|_| VaultError::InvalidUrl(base_url.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(VaultError::InvalidUrl(base_url.to_string()));
        }

        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            base_url,
            token,
            client,
        })
    }

    fn secret_url(&self, secret_name: &str) -> Result<Url, VaultError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| VaultError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push("secrets")
            .push(secret_name);
        Ok(url)
    }

    fn fetch(&self, secret_name: &str) -> Result<VaultRecord, VaultError> {
        let mut request = self.client.get(self.secret_url(secret_name)?);
        if let Some(ref token) = self.token {
            request = request.header(TOKEN_HEADER, token.as_str());
        }

        let response = request.send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(VaultError::Status(status));
        }

        let body: VaultSecretBody = response.json()?;
        Ok(VaultRecord::new(
            body.name.unwrap_or_else(|| secret_name.to_string()),
            body.description,
            Zeroizing::new(body.value),
        ))
    }
}

impl VaultFallback for HttpVaultFallback {
    fn lookup(&self, secret_name: &str) -> Option<VaultRecord> {
        match self.fetch(secret_name) {
            Ok(record) => {
                tracing::info!(secret = %secret_name, "Secret served by external vault");
                Some(record)
            }
            Err(VaultError::Status(status)) if status == reqwest::StatusCode::NOT_FOUND => {
                tracing::debug!(secret = %secret_name, "Secret not present in external vault");
                None
            }
            Err(e) => {
                tracing::warn!(
                    secret = %secret_name,
                    error = %e,
                    "External vault lookup failed; treating as not found"
                );
                None
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
