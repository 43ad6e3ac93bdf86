use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::TokenInfo;
use crate::VaultError;
use crate::config::RenewerConfig;
use crate::models::SecretAuth;
use crate::transport::Transport;

const RENEW_SELF_PATH: &str = "auth/token/renew-self";

/// Stops a running renewal
#[derive(Debug, Clone)]
pub struct RenewalHandle {
    cancel: CancellationToken,
}

impl RenewalHandle {
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

#[derive(Debug, Clone)]
pub struct RenewedEvent {
    pub accessor: String,
    pub lease_duration: Duration,
}

/// Signals of a running renewal.
///
/// `done` fires exactly once: `None` when the token ran out its lease or the
/// renewal was stopped, `Some(err)` when renewing failed.
pub struct RenewalEvents {
    pub renewed: mpsc::UnboundedReceiver<RenewedEvent>,
    pub done: oneshot::Receiver<Option<VaultError>>,
}

/// Keeps one token alive via `renew-self` until it can no longer be extended
pub struct TokenRenewer {
    transport: Arc<dyn Transport>,
    token: TokenInfo,
    config: RenewerConfig,
}

impl TokenRenewer {
    pub fn new(transport: Arc<dyn Transport>, auth: &SecretAuth, config: RenewerConfig) -> Self {
        Self {
            transport,
            token: TokenInfo::from_auth(auth),
            config,
        }
    }

    /// Spawn the renewal task, it stops when `cancel` fires
    pub fn renew(self, cancel: CancellationToken) -> (RenewalHandle, RenewalEvents) {
        let (renewed_tx, renewed_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = oneshot::channel();
        let handle = RenewalHandle {
            cancel: cancel.clone(),
        };

        tokio::spawn(async move {
            let result = tokio::select! {
                _ = cancel.cancelled() => None,
                result = self.run(renewed_tx) => result,
            };
            let _ = done_tx.send(result);
        });

        (
            handle,
            RenewalEvents {
                renewed: renewed_rx,
                done: done_rx,
            },
        )
    }

    async fn run(mut self, renewed: mpsc::UnboundedSender<RenewedEvent>) -> Option<VaultError> {
        loop {
            if self.token.never_expires() {
                std::future::pending::<()>().await;
            }

            let threshold = self.config.refresh_threshold;
            tokio::time::sleep(self.token.until_refresh(threshold)).await;

            if !self.token.renewable || self.token.lease_duration < self.config.min_renewal_duration {
                tracing::debug!(
                    accessor = %self.token.accessor,
                    lease = ?self.token.lease_duration,
                    "Token lease cannot be extended, letting it expire"
                );
                tokio::time::sleep(self.token.until_expiry()).await;
                return None;
            }

            match self.renew_once().await {
                Ok(token) => {
                    self.token = token;
                    let _ = renewed.send(RenewedEvent {
                        accessor: self.token.accessor.clone(),
                        lease_duration: self.token.lease_duration,
                    });
                }
                Err(e) => return Some(e),
            }
        }
    }

    async fn renew_once(&self) -> Result<TokenInfo, VaultError> {
        let payload = match self.config.increment {
            Some(increment) => json!({ "increment": increment.as_secs() }),
            None => json!({}),
        };
        let secret = self
            .transport
            .write(RENEW_SELF_PATH, payload)
            .await?
            .ok_or_else(|| VaultError::EmptyResponse {
                path: RENEW_SELF_PATH.to_string(),
            })?;
        let auth = secret
            .auth
            .ok_or_else(|| VaultError::AuthError("renewal response carries no auth block".to_string()))?;
        Ok(TokenInfo::from_auth(&auth))
    }
}
