use axum::extract::Query;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::consts::{APPLICATION_NAME, VERSION};

#[derive(Debug, Deserialize)]
pub struct HealthRequest {
    noresponse: Option<String>,
}

#[derive(Serialize)]
pub struct HealthResult<'a> {
    success: bool,
    application_name: &'a str,
    version: &'a str,
}

pub async fn health(Query(params): Query<HealthRequest>) -> Json<Option<HealthResult<'static>>> {
    let result = match params.noresponse {
        Some(_) => None,
        _ => Some(HealthResult {
            success: true,
            application_name: APPLICATION_NAME,
            version: VERSION,
        }),
    };
    Json(result)
}
