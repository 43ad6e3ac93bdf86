use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::AppRoleAuthenticator;
use crate::config::{ApproleConfig, ClientConfig, RenewerConfig};
use crate::error::VaultError;
use crate::state::{Shared, SupervisorPhase};
use crate::supervisor::{RenewalSupervisor, startup_gate};
use crate::transport::{HttpTransport, Transport};
use crate::watcher::TrustReloadWatcher;

pub struct VaultClientBuilder {
    base_url: Option<String>,
    transport: Option<Arc<dyn Transport>>,
    config: ClientConfig,
    approle: ApproleConfig,
}

impl Default for VaultClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl VaultClientBuilder {
    pub fn new() -> Self {
        Self {
            base_url: None,
            transport: None,
            config: ClientConfig::default(),
            approle: ApproleConfig::default(),
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Use a ready-made transport instead of building an `HttpTransport`
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn approle(mut self, approle: ApproleConfig) -> Self {
        self.approle = approle;
        self
    }

    pub fn auth_path(mut self, auth_path: impl Into<String>) -> Self {
        self.config.auth_path = auth_path.into();
        self
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.config.role = role.into();
        self
    }

    /// Explicit RoleID, wins over every other source
    pub fn role_id(mut self, role_id: impl Into<String>) -> Self {
        self.approle.role_id = Some(role_id.into());
        self
    }

    /// Explicit SecretID, wins over every other source
    pub fn secret_id(mut self, secret_id: impl Into<String>) -> Self {
        self.approle.initial_secret_id = Some(secret_id.into());
        self
    }

    pub fn secret_id_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.approle.secret_id_store_path = Some(path.into());
        self
    }

    pub fn ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tls.ca_cert = Some(path.into());
        self
    }

    pub fn ca_cert_reload(mut self, enabled: bool) -> Self {
        self.config.tls.ca_cert_reload = enabled;
        self
    }

    pub fn startup_timeout(mut self, timeout: Duration) -> Self {
        self.config.startup_timeout = timeout;
        self
    }

    pub fn login_backoff(mut self, backoff: Duration) -> Self {
        self.config.login_backoff = backoff;
        self
    }

    pub fn renewer(mut self, renewer: RenewerConfig) -> Self {
        self.config.renewer = renewer;
        self
    }

    fn resolve_transport(&mut self) -> Result<Arc<dyn Transport>, VaultError> {
        if let Some(transport) = self.transport.take() {
            return Ok(transport);
        }
        let transport = match self.base_url.take() {
            Some(base_url) => HttpTransport::new(base_url, self.config.tls.clone())?,
            None => HttpTransport::from_env(self.config.tls.clone())?,
        };
        Ok(Arc::new(transport))
    }

    /// Returns once the first token arrived, or fails after the startup timeout.
    pub async fn build(mut self) -> Result<VaultClient, VaultError> {
        self.config.validate()?;

        let authenticator = Arc::new(AppRoleAuthenticator::from_config(&self.approle)?);
        let transport = self.resolve_transport()?;

        let client = VaultClient {
            transport: Arc::clone(&transport),
            authenticator: Arc::clone(&authenticator),
            shared: Shared::new(),
        };

        let (signal, ready) = startup_gate();
        RenewalSupervisor::new(
            Arc::clone(&transport),
            authenticator,
            Arc::clone(&client.shared),
            self.config.clone(),
        )
        .spawn(signal);

        match tokio::time::timeout(self.config.startup_timeout, ready).await {
            Ok(Ok(session)) => tracing::info!(accessor = %session, "Initial Vault token arrived"),
            Ok(Err(_)) => {
                client.close();
                return Err(VaultError::Closed);
            }
            Err(_) => {
                client.close();
                return Err(VaultError::StartupTimeout(self.config.startup_timeout));
            }
        }

        if let Some(ca_file) = self.config.tls.watched_ca_cert() {
            let watcher =
                TrustReloadWatcher::new(ca_file, Arc::clone(&transport), Arc::clone(&client.shared));
            let handle = match watcher.start() {
                Ok(handle) => handle,
                Err(e) => {
                    client.close();
                    return Err(e);
                }
            };
            {
                let mut state = client.shared.lock();
                if state.closed {
                    handle.stop();
                } else {
                    state.watcher = Some(handle);
                }
            }
        }

        Ok(client)
    }
}

/// Authenticated connection to Vault, kept alive in the background until closed
pub struct VaultClient {
    transport: Arc<dyn Transport>,
    authenticator: Arc<AppRoleAuthenticator>,
    shared: Arc<Shared>,
}

impl VaultClient {
    pub async fn from_env() -> Result<Self, VaultError> {
        VaultClientBuilder::new().build().await
    }

    pub fn builder() -> VaultClientBuilder {
        VaultClientBuilder::new()
    }

    /// The authenticated transport; its token may be mid-renewal
    pub fn raw_connection(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    pub fn authenticator(&self) -> &AppRoleAuthenticator {
        &self.authenticator
    }

    pub fn phase(&self) -> SupervisorPhase {
        self.shared.phase()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Stops token renewal and the CA watcher. Later calls do nothing.
    pub fn close(&self) {
        if self.shared.close() {
            tracing::debug!("Vault client closed");
        }
    }
}

impl Drop for VaultClient {
    fn drop(&mut self) {
        self.close();
    }
}
