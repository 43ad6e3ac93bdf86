mod handlers;
mod router;
mod tls;

use std::sync::Arc;

use vault_client::Transport;

pub use router::start_server;

/// Shared with every handler
#[derive(Clone)]
pub struct AppState {
    pub connection: Arc<dyn Transport>,
}
