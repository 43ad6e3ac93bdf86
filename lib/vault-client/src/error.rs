use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("Vault not detected: VAULT_ADDR not set")]
    VaultNotDetected,

    #[error("failed to retrieve the AppRole {0}")]
    MissingCredential(&'static str),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("Vault client error ({status}): {message}")]
    ClientError {
        status: u16,
        message: String,
        errors: Vec<String>,
    },

    #[error("Vault request error: {0}")]
    RequestError(String),

    #[error("Received empty answer from Vault for {path}")]
    EmptyResponse { path: String },

    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("timeout [{0:?}] during waiting for Vault token")]
    StartupTimeout(Duration),

    #[error("failed to watch {path} for CA certificate changes: {source}")]
    WatchSetup {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    #[error("Vault connection closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
