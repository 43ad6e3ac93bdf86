use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::VaultError;
use crate::state::Shared;
use crate::transport::Transport;

/// Directory Kubernetes swaps atomically when a mounted Secret changes
pub const KUBERNETES_DATA_DIR: &str = "..data";

/// Stops a running trust bundle watcher
#[derive(Debug, Clone)]
pub struct WatcherHandle {
    cancel: CancellationToken,
}

impl WatcherHandle {
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

/// Reloads the transport's TLS configuration when the CA bundle changes.
///
/// The parent directory is watched rather than the file, so atomic replaces
/// and symlink swaps of mounted secret volumes are noticed as well.
pub(crate) struct TrustReloadWatcher {
    ca_file: PathBuf,
    transport: Arc<dyn Transport>,
    shared: Arc<Shared>,
}

impl TrustReloadWatcher {
    pub fn new(ca_file: &Path, transport: Arc<dyn Transport>, shared: Arc<Shared>) -> Self {
        Self {
            ca_file: clean(ca_file),
            transport,
            shared,
        }
    }

    pub fn start(self) -> Result<WatcherHandle, VaultError> {
        let dir = match self.ca_file.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.send(res);
        })
        .map_err(|source| VaultError::WatchSetup {
            path: dir.clone(),
            source,
        })?;
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|source| VaultError::WatchSetup {
                path: dir.clone(),
                source,
            })?;

        let cancel = self.shared.shutdown_token().child_token();
        let handle = WatcherHandle {
            cancel: cancel.clone(),
        };

        tracing::debug!(path = %self.ca_file.display(), "Watching CA certificate");
        tokio::spawn(async move {
            // dropping the watcher releases the inotify handle
            let _watcher = watcher;
            loop {
                if self.shared.is_closed() {
                    break;
                }
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = rx.recv() => match event {
                        Some(Ok(event)) => {
                            self.handle_event(&event);
                        }
                        Some(Err(e)) => tracing::error!(error = %e, "watcher error"),
                        None => break,
                    },
                }
            }
            tracing::debug!("CA certificate watcher closed");
        });

        Ok(handle)
    }

    /// Returns whether the event triggered a reload
    pub fn handle_event(&self, event: &Event) -> bool {
        if !is_trust_bundle_event(event, &self.ca_file) {
            return false;
        }
        match self.transport.reload_tls() {
            Ok(()) => tracing::info!("CA certificate reloaded"),
            Err(e) => tracing::error!(error = %e, "failed to reload Vault config"),
        }
        true
    }
}

/// A write or create touching the CA file itself or the Kubernetes data dir
pub fn is_trust_bundle_event(event: &Event, ca_file: &Path) -> bool {
    let relevant_kind = matches!(
        event.kind,
        EventKind::Create(_)
            | EventKind::Modify(ModifyKind::Any)
            | EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Name(
                RenameMode::To | RenameMode::Both | RenameMode::Any
            ))
    );
    if !relevant_kind {
        return false;
    }

    event.paths.iter().any(|path| {
        clean(path) == ca_file
            || path.file_name().is_some_and(|name| name == KUBERNETES_DATA_DIR)
    })
}

/// Lexical cleanup, no filesystem access
fn clean(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !cleaned.pop() {
                    cleaned.push("..");
                }
            }
            other => cleaned.push(other.as_os_str()),
        }
    }
    if cleaned.as_os_str().is_empty() {
        cleaned.push(".");
    }
    cleaned
}
