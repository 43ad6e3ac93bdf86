use serde_json::json;
use tokio::sync::Mutex;

use super::store::CredentialStore;
use crate::VaultError;
use crate::config::ApproleConfig;
use crate::models::{Secret, SecretAuth};
use crate::transport::Transport;

/// Opinionated AppRole authentication built around single use SecretIDs.
///
/// Every successful login issues a fresh SecretID for the role and destroys the
/// one that was just used, so a leaked SecretID unlocks at most one session.
/// See <https://developer.hashicorp.com/vault/api-docs/auth/approle>.
pub struct AppRoleAuthenticator {
    role_id: String,
    store: CredentialStore,
    // held for the whole login so rotation steps never interleave
    state: Mutex<RotationState>,
}

struct RotationState {
    secret_id: String,
    persisted: bool,
}

/// How far SecretID rotation got after a successful login
#[derive(Debug)]
pub enum RotationStatus {
    Rotated { persisted: bool, old_destroyed: bool },
    /// A new SecretID could not be issued, the current one stays in use
    IssueFailed(VaultError),
}

#[derive(Debug)]
pub struct LoginOutcome {
    pub secret: Secret,
    pub auth: SecretAuth,
    pub rotation: RotationStatus,
}

impl AppRoleAuthenticator {
    /// The initial SecretID is persisted right away.
    pub fn new(role_id: String, initial_secret_id: String, store: CredentialStore) -> Self {
        let persisted = store.persist(&initial_secret_id);
        Self {
            role_id,
            store,
            state: Mutex::new(RotationState {
                secret_id: initial_secret_id,
                persisted,
            }),
        }
    }

    pub fn from_config(config: &ApproleConfig) -> Result<Self, VaultError> {
        let role_id = CredentialStore::load("RoleID", &config.role_id_sources())?;
        let secret_id = CredentialStore::load("SecretID", &config.secret_id_sources())?;
        let store = CredentialStore::new(config.secret_id_store_path.clone());
        Ok(Self::new(role_id, secret_id, store))
    }

    /// Whether the current SecretID made it to disk
    pub async fn persisted(&self) -> bool {
        self.state.lock().await.persisted
    }

    pub async fn secret_id(&self) -> String {
        self.state.lock().await.secret_id.clone()
    }

    /// Log in at `auth/<auth_path>/login`, then rotate the SecretID of `role`.
    ///
    /// Only the login itself can fail. Rotation problems are reported through
    /// [`RotationStatus`] next to the token that was obtained.
    pub async fn login(
        &self,
        transport: &dyn Transport,
        auth_path: &str,
        role: &str,
    ) -> Result<LoginOutcome, VaultError> {
        let mut state = self.state.lock().await;

        let login_path = format!("auth/{auth_path}/login");
        let payload = json!({ "role_id": self.role_id, "secret_id": state.secret_id });
        let secret = transport
            .write(&login_path, payload)
            .await?
            .ok_or_else(|| VaultError::EmptyResponse { path: login_path.clone() })?;

        let auth = secret
            .auth
            .clone()
            .filter(|auth| !auth.client_token.is_empty())
            .ok_or_else(|| VaultError::AuthError("login response carries no client token".to_string()))?;

        // issuing the next SecretID needs an authenticated request
        transport.set_token(&auth.client_token);

        let new_secret_id = match issue_secret_id(transport, auth_path, role).await {
            Ok(secret_id) => secret_id,
            Err(e) => {
                tracing::warn!(role, error = %e, "Failed to generate new SecretID");
                return Ok(LoginOutcome {
                    secret,
                    auth,
                    rotation: RotationStatus::IssueFailed(e),
                });
            }
        };

        let old_secret_id = std::mem::replace(&mut state.secret_id, new_secret_id);
        state.persisted = self.store.persist(&state.secret_id);

        let destroy_path = format!("auth/{auth_path}/role/{role}/secret-id/destroy");
        let old_destroyed = match transport
            .write(&destroy_path, json!({ "secret_id": old_secret_id }))
            .await
        {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(role, error = %e, "Failed to destroy old SecretID");
                false
            }
        };

        Ok(LoginOutcome {
            secret,
            auth,
            rotation: RotationStatus::Rotated {
                persisted: state.persisted,
                old_destroyed,
            },
        })
    }
}

async fn issue_secret_id(
    transport: &dyn Transport,
    auth_path: &str,
    role: &str,
) -> Result<String, VaultError> {
    let path = format!("auth/{auth_path}/role/{role}/secret-id");
    let secret = transport
        .write(&path, json!({}))
        .await?
        .ok_or_else(|| VaultError::EmptyResponse { path: path.clone() })?;
    secret
        .data_str("secret_id")
        .filter(|secret_id| !secret_id.is_empty())
        .map(str::to_string)
        .ok_or(VaultError::EmptyResponse { path })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockTransport;
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    fn authenticator(dir: &TempDir) -> AppRoleAuthenticator {
        let store = CredentialStore::new(Some(dir.path().join("secret-id")));
        AppRoleAuthenticator::new("r1".to_string(), "s0".to_string(), store)
    }

    #[tokio::test]
    async fn test_initial_secret_id_is_persisted() {
        let dir = TempDir::new().unwrap();
        let approle = authenticator(&dir);
        assert!(approle.persisted().await);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("secret-id")).unwrap(),
            "s0"
        );
    }

    #[tokio::test]
    async fn test_login_rotates_and_destroys_previous_secret_id() {
        let dir = TempDir::new().unwrap();
        let approle = authenticator(&dir);
        let transport = MockTransport::new();

        let outcome = approle.login(&transport, "approle", "default").await.unwrap();

        assert_eq!(outcome.auth.client_token, "token-1");
        assert_eq!(transport.token().as_deref(), Some("token-1"));
        assert!(matches!(
            outcome.rotation,
            RotationStatus::Rotated { persisted: true, old_destroyed: true }
        ));

        let logins = transport.payloads("auth/approle/login");
        assert_eq!(logins, vec![json!({ "role_id": "r1", "secret_id": "s0" })]);
        assert_eq!(transport.payloads("auth/approle/role/default/secret-id").len(), 1);
        assert_eq!(
            transport.payloads("auth/approle/role/default/secret-id/destroy"),
            vec![json!({ "secret_id": "s0" })]
        );

        assert_eq!(approle.secret_id().await, "secret-1");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("secret-id")).unwrap(),
            "secret-1"
        );
    }

    #[tokio::test]
    async fn test_second_login_uses_rotated_secret_id() {
        let dir = TempDir::new().unwrap();
        let approle = authenticator(&dir);
        let transport = MockTransport::new();

        approle.login(&transport, "approle", "default").await.unwrap();
        approle.login(&transport, "approle", "default").await.unwrap();

        let logins = transport.payloads("auth/approle/login");
        assert_eq!(logins[1]["secret_id"], "secret-1");
        let destroyed = transport.payloads("auth/approle/role/default/secret-id/destroy");
        assert_eq!(destroyed[1], json!({ "secret_id": "secret-1" }));
        assert_eq!(approle.secret_id().await, "secret-2");
    }

    #[tokio::test]
    async fn test_login_failure_is_returned_unchanged() {
        let dir = TempDir::new().unwrap();
        let approle = authenticator(&dir);
        let transport = MockTransport::new();
        transport.fail_login.store(true, Ordering::SeqCst);

        let err = approle.login(&transport, "approle", "default").await.unwrap_err();
        assert!(matches!(err, VaultError::ClientError { status: 400, .. }));
        assert_eq!(transport.count("auth/approle/role/default/secret-id"), 0);
        assert_eq!(approle.secret_id().await, "s0");
    }

    #[tokio::test]
    async fn test_empty_login_response() {
        let dir = TempDir::new().unwrap();
        let approle = authenticator(&dir);
        let transport = MockTransport::new();
        transport.empty_login.store(true, Ordering::SeqCst);

        let err = approle.login(&transport, "approle", "default").await.unwrap_err();
        assert!(matches!(err, VaultError::EmptyResponse { .. }));
    }

    #[tokio::test]
    async fn test_issue_failure_keeps_token_and_secret_id() {
        let dir = TempDir::new().unwrap();
        let approle = authenticator(&dir);
        let transport = MockTransport::new();
        transport.fail_issue.store(true, Ordering::SeqCst);

        let outcome = approle.login(&transport, "approle", "default").await.unwrap();

        assert_eq!(outcome.auth.client_token, "token-1");
        assert!(matches!(outcome.rotation, RotationStatus::IssueFailed(_)));
        assert_eq!(approle.secret_id().await, "s0");
        assert_eq!(transport.count("auth/approle/role/default/secret-id/destroy"), 0);
    }

    #[tokio::test]
    async fn test_destroy_failure_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let approle = authenticator(&dir);
        let transport = MockTransport::new();
        transport.fail_destroy.store(true, Ordering::SeqCst);

        let outcome = approle.login(&transport, "approle", "default").await.unwrap();

        assert!(matches!(
            outcome.rotation,
            RotationStatus::Rotated { persisted: true, old_destroyed: false }
        ));
        assert_eq!(approle.secret_id().await, "secret-1");
    }

    #[tokio::test]
    async fn test_persist_failure_only_changes_flag() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(Some(dir.path().join("missing").join("secret-id")));
        let approle = AppRoleAuthenticator::new("r1".to_string(), "s0".to_string(), store);
        let transport = MockTransport::new();

        let outcome = approle.login(&transport, "approle", "default").await.unwrap();

        assert_eq!(outcome.auth.client_token, "token-1");
        assert!(matches!(
            outcome.rotation,
            RotationStatus::Rotated { persisted: false, old_destroyed: true }
        ));
        assert!(!approle.persisted().await);
        assert_eq!(approle.secret_id().await, "secret-1");
    }
}
