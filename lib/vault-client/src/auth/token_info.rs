use std::time::Duration;
use tokio::time::Instant;

use crate::models::SecretAuth;

/// Token lease as seen by the renewer
#[derive(Debug, Clone)]
pub struct TokenInfo {
    pub accessor: String,
    pub lease_duration: Duration,
    pub renewable: bool,
    pub obtained_at: Instant,
}

impl TokenInfo {
    pub fn new(accessor: String, lease_duration: Duration, renewable: bool) -> Self {
        Self {
            accessor,
            lease_duration,
            renewable,
            obtained_at: Instant::now(),
        }
    }

    pub fn from_auth(auth: &SecretAuth) -> Self {
        Self::new(auth.accessor.clone(), auth.lease(), auth.renewable)
    }

    /// Zero lease, e.g. a root token
    pub fn never_expires(&self) -> bool {
        self.lease_duration.is_zero()
    }

    /// Time left until the refresh threshold is reached
    pub fn until_refresh(&self, threshold: f64) -> Duration {
        self.threshold_duration(threshold)
            .saturating_sub(self.obtained_at.elapsed())
    }

    pub fn until_expiry(&self) -> Duration {
        self.lease_duration.saturating_sub(self.obtained_at.elapsed())
    }

    fn threshold_duration(&self, threshold: f64) -> Duration {
        Duration::from_secs_f64(self.lease_duration.as_secs_f64() * threshold)
    }
}
