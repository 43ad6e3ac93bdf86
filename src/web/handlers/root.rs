use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::consts::{APPLICATION_NAME, VERSION};
use crate::web::AppState;

const LOOKUP_SELF_PATH: &str = "auth/token/lookup-self";

/// App name and version, followed by the lease data of the token the broker
/// is currently authenticated with.
pub async fn api_root(State(state): State<AppState>) -> Response {
    let version = format!("{APPLICATION_NAME} {VERSION}");

    match state.connection.read(LOOKUP_SELF_PATH).await {
        Ok(secret) => {
            let data = secret.and_then(|s| s.data).unwrap_or_default();
            let body = serde_json::to_string(&data).unwrap_or_default();
            (StatusCode::OK, format!("{version}\n{body}")).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "Token lookup failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "500 - Something bad happened!",
            )
                .into_response()
        }
    }
}
