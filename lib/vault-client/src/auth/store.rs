use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::VaultError;

/// One place a credential may be found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    Value(String),
    File(PathBuf),
}

impl CredentialSource {
    fn resolve(&self) -> Option<String> {
        let value = match self {
            Self::Value(value) => value.clone(),
            Self::File(path) => match fs::read_to_string(path) {
                Ok(content) => content,
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "Credential file not readable");
                    return None;
                }
            },
        };
        let value = value.trim();
        (!value.is_empty()).then(|| value.to_string())
    }
}

/// Durable holder of the current SecretID
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: Option<PathBuf>,
}

impl CredentialStore {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    /// First non-empty source wins; `what` names the credential in the error
    pub fn load(what: &'static str, sources: &[CredentialSource]) -> Result<String, VaultError> {
        sources
            .iter()
            .find_map(CredentialSource::resolve)
            .ok_or(VaultError::MissingCredential(what))
    }

    /// Write `value` to the store, readable by the owner only.
    ///
    /// Failure is not fatal, the in-memory value stays usable until restart.
    pub fn persist(&self, value: &str) -> bool {
        let Some(path) = &self.path else {
            tracing::warn!("Failed to persist SecretID: no store path configured");
            return false;
        };
        match write_private(path, value) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to persist SecretID");
                false
            }
        }
    }
}

fn write_private(path: &Path, value: &str) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    // mode() only applies on creation
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(value.as_bytes())?;
    file.sync_all()
}
