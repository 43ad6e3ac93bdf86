//! vault-client - AppRole authentication for HashiCorp Vault
//!
//! Logs in with a RoleID and a single use SecretID, rotates the SecretID on
//! every login, keeps the resulting token renewed in the background and
//! reloads the CA bundle when it changes on disk.

pub mod auth;
mod client;
pub mod config;
mod error;
mod models;
mod state;
mod supervisor;
mod transport;
mod watcher;

#[cfg(test)]
mod testutil;

pub use auth::{AppRoleAuthenticator, CredentialSource, CredentialStore, LoginOutcome, RotationStatus};
pub use client::{VaultClient, VaultClientBuilder};
pub use config::{ApproleConfig, ClientConfig, RenewerConfig, TlsConfig};
pub use error::VaultError;
pub use models::{Secret, SecretAuth};
pub use state::SupervisorPhase;
pub use transport::{HttpTransport, Transport};
pub use watcher::{KUBERNETES_DATA_DIR, WatcherHandle, is_trust_bundle_event};
