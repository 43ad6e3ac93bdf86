use std::path::PathBuf;
use std::time::Duration;

use crate::auth::CredentialSource;
use crate::error::VaultError;

pub const DEFAULT_AUTH_PATH: &str = "approle";
pub const DEFAULT_ROLE: &str = "default";
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_LOGIN_BACKOFF: Duration = Duration::from_secs(1);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

const DEFAULT_REFRESH_THRESHOLD: f64 = 2.0 / 3.0;
const DEFAULT_MIN_RENEWAL_DURATION: Duration = Duration::from_secs(30);

/// Settings of the connection and its background tasks.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Mount path of the AppRole auth method, `auth/<auth_path>/login`
    pub auth_path: String,
    /// Role whose secret-IDs are rotated
    pub role: String,
    /// How long construction waits for the first token
    pub startup_timeout: Duration,
    /// Pause between failed logins
    pub login_backoff: Duration,
    pub renewer: RenewerConfig,
    pub tls: TlsConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            auth_path: DEFAULT_AUTH_PATH.to_string(),
            role: DEFAULT_ROLE.to_string(),
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            login_backoff: DEFAULT_LOGIN_BACKOFF,
            renewer: RenewerConfig::default(),
            tls: TlsConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<(), VaultError> {
        if self.auth_path.trim_matches('/').is_empty() {
            return Err(VaultError::Config("auth path must not be empty".to_string()));
        }
        if self.role.is_empty() {
            return Err(VaultError::Config("role must not be empty".to_string()));
        }
        if !(self.renewer.refresh_threshold > 0.0 && self.renewer.refresh_threshold < 1.0) {
            return Err(VaultError::Config(format!(
                "refresh threshold must be within (0, 1), got {}",
                self.renewer.refresh_threshold
            )));
        }
        Ok(())
    }

    /// Auth path without surrounding slashes
    pub fn auth_mount(&self) -> &str {
        self.auth_path.trim_matches('/')
    }
}

/// Trust material used for the connection to Vault.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// PEM bundle with the CA certificates Vault is verified against
    pub ca_cert: Option<PathBuf>,
    /// Watch `ca_cert` and reload it on change
    pub ca_cert_reload: bool,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            ca_cert: None,
            ca_cert_reload: true,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_TLS_HANDSHAKE_TIMEOUT,
        }
    }
}

impl TlsConfig {
    /// CA file to watch, if hot reload applies
    pub fn watched_ca_cert(&self) -> Option<&PathBuf> {
        self.ca_cert.as_ref().filter(|_| self.ca_cert_reload)
    }
}

#[derive(Debug, Clone)]
pub struct RenewerConfig {
    /// Fraction of the lease after which the token is renewed
    pub refresh_threshold: f64,
    /// Leases shorter than this are left to expire instead of being renewed
    pub min_renewal_duration: Duration,
    /// Requested TTL extension, Vault picks the role default when unset
    pub increment: Option<Duration>,
}

impl Default for RenewerConfig {
    fn default() -> Self {
        Self {
            refresh_threshold: DEFAULT_REFRESH_THRESHOLD,
            min_renewal_duration: DEFAULT_MIN_RENEWAL_DURATION,
            increment: None,
        }
    }
}

/// Where the AppRole RoleID and SecretID come from.
///
/// Precedence:
///   RoleID:   explicit value > cli option / environment > file
///   SecretID: explicit value > store file > cli option / environment > initial file
///
/// The store file wins over the bootstrap values so that a restarted process
/// continues the rotation chain instead of reusing a consumed SecretID.
#[derive(Debug, Clone, Default)]
pub struct ApproleConfig {
    pub role_id: Option<String>,
    pub role_id_setting: Option<String>,
    pub role_id_path: Option<PathBuf>,
    pub initial_secret_id: Option<String>,
    pub initial_secret_id_setting: Option<String>,
    pub initial_secret_id_path: Option<PathBuf>,
    /// Rotated SecretIDs are written here
    pub secret_id_store_path: Option<PathBuf>,
}

impl ApproleConfig {
    pub fn role_id_sources(&self) -> Vec<CredentialSource> {
        let mut sources = Vec::with_capacity(3);
        sources.extend(self.role_id.clone().map(CredentialSource::Value));
        sources.extend(self.role_id_setting.clone().map(CredentialSource::Value));
        sources.extend(self.role_id_path.clone().map(CredentialSource::File));
        sources
    }

    pub fn secret_id_sources(&self) -> Vec<CredentialSource> {
        let mut sources = Vec::with_capacity(4);
        sources.extend(self.initial_secret_id.clone().map(CredentialSource::Value));
        sources.extend(self.secret_id_store_path.clone().map(CredentialSource::File));
        sources.extend(self.initial_secret_id_setting.clone().map(CredentialSource::Value));
        sources.extend(self.initial_secret_id_path.clone().map(CredentialSource::File));
        sources
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.auth_path, "approle");
        assert_eq!(config.role, "default");
        assert_eq!(config.startup_timeout, Duration::from_secs(10));
        assert_eq!(config.login_backoff, Duration::from_secs(1));
        assert!(config.tls.ca_cert_reload);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let mut config = ClientConfig::default();
        config.renewer.refresh_threshold = 1.5;
        assert!(matches!(config.validate(), Err(VaultError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_empty_role_and_auth_path() {
        let config = ClientConfig {
            role: String::new(),
            ..ClientConfig::default()
        };
        assert!(matches!(config.validate(), Err(VaultError::Config(_))));

        let config = ClientConfig {
            auth_path: "/".to_string(),
            ..ClientConfig::default()
        };
        assert!(matches!(config.validate(), Err(VaultError::Config(_))));
    }

    #[test]
    fn test_auth_mount_strips_slashes() {
        let config = ClientConfig {
            auth_path: "/approle/".to_string(),
            ..ClientConfig::default()
        };
        assert_eq!(config.auth_mount(), "approle");
    }

    #[test]
    fn test_watched_ca_cert_respects_reload_flag() {
        let mut tls = TlsConfig {
            ca_cert: Some(PathBuf::from("/etc/vault/ca.pem")),
            ..TlsConfig::default()
        };
        assert!(tls.watched_ca_cert().is_some());
        tls.ca_cert_reload = false;
        assert!(tls.watched_ca_cert().is_none());
    }

    #[test]
    fn test_secret_id_sources_order() {
        let config = ApproleConfig {
            initial_secret_id: Some("explicit".to_string()),
            initial_secret_id_setting: Some("flag".to_string()),
            initial_secret_id_path: Some(PathBuf::from("/initial")),
            secret_id_store_path: Some(PathBuf::from("/store")),
            ..ApproleConfig::default()
        };
        assert_eq!(
            config.secret_id_sources(),
            vec![
                CredentialSource::Value("explicit".to_string()),
                CredentialSource::File(PathBuf::from("/store")),
                CredentialSource::Value("flag".to_string()),
                CredentialSource::File(PathBuf::from("/initial")),
            ]
        );
    }

    #[test]
    fn test_role_id_sources_skip_unset() {
        let config = ApproleConfig {
            role_id_path: Some(PathBuf::from("/role-id")),
            ..ApproleConfig::default()
        };
        assert_eq!(
            config.role_id_sources(),
            vec![CredentialSource::File(PathBuf::from("/role-id"))]
        );
    }
}
