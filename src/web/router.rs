use std::net::SocketAddr;

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use vault_client::VaultClient;

use crate::cli::ServeArgs;
use crate::web::handlers::{health, root};
use crate::web::tls::{load_acceptor, TlsListener};
use crate::web::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root::api_root))
        .route("/ping/", get(health::health))
        .with_state(state)
}

/// Serves until Ctrl-C, then closes the Vault connection.
pub async fn start_server(params: ServeArgs, client: VaultClient) -> anyhow::Result<()> {
    let app = build_router(AppState {
        connection: client.raw_connection(),
    });

    let result = if params.tls {
        let acceptor = load_acceptor(&params.tls_cert, &params.tls_key)?;
        let addr = SocketAddr::new(params.listen_ip, params.listen_tls_port);
        let listener = TcpListener::bind(addr).await?;
        tracing::warn!("listening on https://{}", addr);
        axum::serve(TlsListener::new(listener, acceptor)?, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
    } else {
        let addr = SocketAddr::new(params.listen_ip, params.listen_port);
        let listener = TcpListener::bind(addr).await?;
        tracing::warn!("listening on http://{}", addr);
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
    };

    client.close();
    tracing::info!("API server shutdown completed");
    Ok(result?)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "API server shutdown listener failed");
    }
}
