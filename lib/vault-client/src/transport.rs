use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::Deserialize;

use crate::config::TlsConfig;
use crate::error::VaultError;
use crate::models::Secret;

/// Logical access to a Vault server.
///
/// Paths are relative to `/v1/`, e.g. `auth/approle/login`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn write(&self, path: &str, payload: serde_json::Value)
    -> Result<Option<Secret>, VaultError>;

    async fn read(&self, path: &str) -> Result<Option<Secret>, VaultError>;

    /// Make `token` the credential of all subsequent requests
    fn set_token(&self, token: &str);

    fn token(&self) -> Option<String>;

    /// Re-read the CA bundle and rebuild the TLS client configuration
    fn reload_tls(&self) -> Result<(), VaultError>;
}

/// `Transport` over HTTPS with reloadable trust roots
pub struct HttpTransport {
    base_url: String,
    tls: TlsConfig,
    token: RwLock<Option<String>>,
    http: RwLock<reqwest::Client>,
}

#[derive(Deserialize, Default)]
struct ErrorResponse {
    #[serde(default)]
    errors: Vec<String>,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, tls: TlsConfig) -> Result<Self, VaultError> {
        let http = build_http_client(&tls)?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tls,
            token: RwLock::new(None),
            http: RwLock::new(http),
        })
    }

    /// Address from `VAULT_ADDR`
    pub fn from_env(tls: TlsConfig) -> Result<Self, VaultError> {
        let base_url = std::env::var("VAULT_ADDR").map_err(|_| VaultError::VaultNotDetected)?;
        Self::new(base_url, tls)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url, path.trim_start_matches('/'))
    }

    // reqwest::Client is reference counted, cloning it releases the lock right away
    fn http(&self) -> reqwest::Client {
        self.http.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn authorize(&self, mut request: RequestBuilder) -> RequestBuilder {
        request = request.header("X-Vault-Request", "true");
        match self.token() {
            Some(token) => request.header("X-Vault-Token", token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Option<Secret>, VaultError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| VaultError::RequestError(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let body = response
            .text()
            .await
            .map_err(|e| VaultError::RequestError(e.to_string()))?;

        if !status.is_success() {
            let errors = serde_json::from_str::<ErrorResponse>(&body)
                .unwrap_or_default()
                .errors;
            // Vault answers 404 without errors for paths that simply hold nothing
            if status == StatusCode::NOT_FOUND && errors.is_empty() {
                return Ok(None);
            }
            return Err(VaultError::ClientError {
                status: status.as_u16(),
                message: if errors.is_empty() { body } else { errors.join(", ") },
                errors,
            });
        }

        if body.trim().is_empty() {
            return Ok(None);
        }

        Ok(Some(serde_json::from_str(&body)?))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn write(
        &self,
        path: &str,
        payload: serde_json::Value,
    ) -> Result<Option<Secret>, VaultError> {
        let request = self.http().post(self.url(path)).json(&payload);
        self.send(request).await
    }

    async fn read(&self, path: &str) -> Result<Option<Secret>, VaultError> {
        let request = self.http().get(self.url(path));
        self.send(request).await
    }

    fn set_token(&self, token: &str) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
    }

    fn token(&self) -> Option<String> {
        self.token.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn reload_tls(&self) -> Result<(), VaultError> {
        let http = build_http_client(&self.tls)?;
        *self.http.write().unwrap_or_else(PoisonError::into_inner) = http;
        Ok(())
    }
}

fn build_http_client(tls: &TlsConfig) -> Result<reqwest::Client, VaultError> {
    let mut builder = reqwest::Client::builder()
        .timeout(tls.request_timeout)
        .connect_timeout(tls.connect_timeout);

    if let Some(path) = &tls.ca_cert {
        let pem = std::fs::read(path)?;
        let certs = reqwest::Certificate::from_pem_bundle(&pem)
            .map_err(|e| VaultError::TlsConfig(format!("{}: {}", path.display(), e)))?;
        if certs.is_empty() {
            return Err(VaultError::TlsConfig(format!(
                "{}: no certificates found",
                path.display()
            )));
        }
        for cert in certs {
            builder = builder.add_root_certificate(cert);
        }
    }

    builder
        .build()
        .map_err(|e| VaultError::TlsConfig(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_url_joins_path() {
        let transport = HttpTransport::new("http://vault:8200/", TlsConfig::default()).unwrap();
        assert_eq!(
            transport.url("/auth/approle/login"),
            "http://vault:8200/v1/auth/approle/login"
        );
    }

    #[test]
    fn test_set_token() {
        let transport = HttpTransport::new("http://vault:8200", TlsConfig::default()).unwrap();
        assert!(transport.token().is_none());
        transport.set_token("s.abc");
        assert_eq!(transport.token().as_deref(), Some("s.abc"));
    }

    #[test]
    fn test_missing_ca_file_fails() {
        let tls = TlsConfig {
            ca_cert: Some("/nonexistent/ca.pem".into()),
            ..TlsConfig::default()
        };
        assert!(matches!(
            HttpTransport::new("https://vault:8200", tls),
            Err(VaultError::Io(_))
        ));
    }

    #[test]
    fn test_reload_with_garbage_bundle_fails() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "not a certificate").unwrap();

        let tls = TlsConfig {
            ca_cert: Some(file.path().to_path_buf()),
            ..TlsConfig::default()
        };
        assert!(build_http_client(&tls).is_err());
    }
}
