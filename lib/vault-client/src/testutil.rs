//! In-memory `Transport` speaking just enough of the AppRole and token APIs.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::error::VaultError;
use crate::models::Secret;
use crate::transport::Transport;

pub struct MockTransport {
    calls: Mutex<Vec<(String, Value)>>,
    token: Mutex<Option<String>>,
    logins: AtomicUsize,
    issued: AtomicUsize,
    reloads: AtomicUsize,
    pub fail_login: AtomicBool,
    pub empty_login: AtomicBool,
    pub fail_issue: AtomicBool,
    pub fail_destroy: AtomicBool,
    pub fail_renew: AtomicBool,
    pub fail_reload: AtomicBool,
    pub renewable: AtomicBool,
    pub lease_secs: AtomicU64,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            token: Mutex::new(None),
            logins: AtomicUsize::new(0),
            issued: AtomicUsize::new(0),
            reloads: AtomicUsize::new(0),
            fail_login: AtomicBool::new(false),
            empty_login: AtomicBool::new(false),
            fail_issue: AtomicBool::new(false),
            fail_destroy: AtomicBool::new(false),
            fail_renew: AtomicBool::new(false),
            fail_reload: AtomicBool::new(false),
            renewable: AtomicBool::new(true),
            lease_secs: AtomicU64::new(3600),
        }
    }

    /// Payloads written to `path`, in call order
    pub fn payloads(&self, path: &str) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    pub fn count(&self, path: &str) -> usize {
        self.payloads(path).len()
    }

    /// Login attempts, failed ones included
    pub fn login_count(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    pub fn renew_count(&self) -> usize {
        self.count("auth/token/renew-self")
    }

    pub fn reload_count(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }

    fn auth(&self, n: usize) -> Secret {
        serde_json::from_value(json!({
            "auth": {
                "client_token": format!("token-{n}"),
                "accessor": format!("accessor-{n}"),
                "policies": ["default"],
                "lease_duration": self.lease_secs.load(Ordering::SeqCst),
                "renewable": self.renewable.load(Ordering::SeqCst),
            }
        }))
        .unwrap()
    }

    fn rejected(message: &str) -> VaultError {
        VaultError::ClientError {
            status: 400,
            message: message.to_string(),
            errors: vec![message.to_string()],
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn write(&self, path: &str, payload: Value) -> Result<Option<Secret>, VaultError> {
        self.calls
            .lock()
            .unwrap()
            .push((path.to_string(), payload));

        if path.ends_with("/login") {
            let n = self.logins.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_login.load(Ordering::SeqCst) {
                return Err(Self::rejected("invalid secret id"));
            }
            if self.empty_login.load(Ordering::SeqCst) {
                return Ok(None);
            }
            return Ok(Some(self.auth(n)));
        }
        if path.ends_with("/secret-id/destroy") {
            if self.fail_destroy.load(Ordering::SeqCst) {
                return Err(Self::rejected("permission denied"));
            }
            return Ok(None);
        }
        if path.ends_with("/secret-id") {
            if self.fail_issue.load(Ordering::SeqCst) {
                return Err(Self::rejected("permission denied"));
            }
            let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
            return Ok(Some(
                serde_json::from_value(json!({
                    "data": { "secret_id": format!("secret-{n}"), "secret_id_accessor": "sa" }
                }))
                .unwrap(),
            ));
        }
        if path == "auth/token/renew-self" {
            if self.fail_renew.load(Ordering::SeqCst) {
                return Err(Self::rejected("token expired"));
            }
            return Ok(Some(self.auth(self.logins.load(Ordering::SeqCst))));
        }
        Err(VaultError::ClientError {
            status: 404,
            message: format!("no handler for {path}"),
            errors: Vec::new(),
        })
    }

    async fn read(&self, path: &str) -> Result<Option<Secret>, VaultError> {
        if path == "auth/token/lookup-self" {
            return Ok(Some(
                serde_json::from_value(json!({ "data": { "display_name": "approle" } })).unwrap(),
            ));
        }
        Ok(None)
    }

    fn set_token(&self, token: &str) {
        *self.token.lock().unwrap() = Some(token.to_string());
    }

    fn token(&self) -> Option<String> {
        self.token.lock().unwrap().clone()
    }

    fn reload_tls(&self) -> Result<(), VaultError> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reload.load(Ordering::SeqCst) {
            return Err(VaultError::TlsConfig("bad bundle".to_string()));
        }
        Ok(())
    }
}
