use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::VaultError;
use crate::auth::{AppRoleAuthenticator, LoginOutcome, RotationStatus, TokenRenewer};
use crate::config::ClientConfig;
use crate::state::{Shared, SupervisorPhase};
use crate::transport::Transport;

/// Fires once with the session identifier of the first token.
///
/// `fire` consumes the signal, a second send does not type check.
pub(crate) struct ReadySignal(oneshot::Sender<String>);

impl ReadySignal {
    fn fire(self, session: String) {
        let _ = self.0.send(session);
    }
}

pub(crate) fn startup_gate() -> (ReadySignal, oneshot::Receiver<String>) {
    let (tx, rx) = oneshot::channel();
    (ReadySignal(tx), rx)
}

/// Logs in, keeps the token renewed and logs in again whenever renewal ends.
///
/// LoggingIn -> Renewing -> RenewalExpired | RenewalError -> LoggingIn, until
/// the connection is closed (Stopped).
pub(crate) struct RenewalSupervisor {
    transport: Arc<dyn Transport>,
    authenticator: Arc<AppRoleAuthenticator>,
    shared: Arc<Shared>,
    config: ClientConfig,
}

impl RenewalSupervisor {
    pub fn new(
        transport: Arc<dyn Transport>,
        authenticator: Arc<AppRoleAuthenticator>,
        shared: Arc<Shared>,
        config: ClientConfig,
    ) -> Self {
        Self {
            transport,
            authenticator,
            shared,
            config,
        }
    }

    pub fn spawn(self, ready: ReadySignal) -> JoinHandle<()> {
        tokio::spawn(self.run(ready))
    }

    async fn run(self, ready: ReadySignal) {
        let shutdown = self.shared.shutdown_token();
        let mut ready = Some(ready);

        loop {
            if self.shared.is_closed() {
                break;
            }
            self.shared.set_phase(SupervisorPhase::LoggingIn);

            // never cancelled midway, an interrupted rotation would strand a SecretID
            let outcome = self
                .authenticator
                .login(self.transport.as_ref(), self.config.auth_mount(), &self.config.role)
                .await;

            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(VaultError::EmptyResponse { .. }) => {
                    tracing::info!("Received empty answer from Vault, retrying");
                    if !self.backoff(&shutdown).await {
                        break;
                    }
                    continue;
                }
                Err(e) => {
                    tracing::info!(error = %e, "Failed to request new Vault token");
                    if !self.backoff(&shutdown).await {
                        break;
                    }
                    continue;
                }
            };

            log_rotation(&outcome);
            tracing::info!(accessor = %outcome.auth.accessor, "Received new Vault token");

            if let Some(signal) = ready.take() {
                signal.fire(outcome.auth.accessor.clone());
            }

            let renewer = TokenRenewer::new(
                Arc::clone(&self.transport),
                &outcome.auth,
                self.config.renewer.clone(),
            );
            let mut events = {
                let mut state = self.shared.lock();
                if state.closed {
                    break;
                }
                let (handle, events) = renewer.renew(shutdown.child_token());
                state.renewal = Some(handle);
                state.phase = SupervisorPhase::Renewing;
                events
            };

            let phase = loop {
                tokio::select! {
                    Some(renewed) = events.renewed.recv() => {
                        tracing::info!(
                            accessor = %renewed.accessor,
                            lease = ?renewed.lease_duration,
                            "Renewed Vault token"
                        );
                    }
                    done = &mut events.done => {
                        match done {
                            Ok(Some(e)) => {
                                tracing::error!(error = %e, "Vault token renewal error");
                                break SupervisorPhase::RenewalError;
                            }
                            _ => break SupervisorPhase::RenewalExpired,
                        }
                    }
                }
            };

            let mut state = self.shared.lock();
            state.renewal = None;
            if !state.closed {
                state.phase = phase;
            }
        }

        self.shared.set_phase(SupervisorPhase::Stopped);
        tracing::info!("Vault token renewal closed");
    }

    /// False when the connection got closed while waiting
    async fn backoff(&self, shutdown: &CancellationToken) -> bool {
        tokio::select! {
            _ = shutdown.cancelled() => false,
            _ = tokio::time::sleep(self.config.login_backoff) => !self.shared.is_closed(),
        }
    }
}

fn log_rotation(outcome: &LoginOutcome) {
    match &outcome.rotation {
        RotationStatus::Rotated {
            persisted,
            old_destroyed,
        } => {
            if !persisted {
                tracing::warn!("New SecretID is only held in memory and will be lost on restart");
            }
            tracing::debug!(old_destroyed, "SecretID rotated");
        }
        RotationStatus::IssueFailed(e) => {
            tracing::warn!(error = %e, "SecretID rotation did not advance, keeping the current one");
        }
    }
}
