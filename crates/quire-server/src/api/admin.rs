//! Operator routes behind `ADMIN_TOKEN`.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use quire_store::{PeerServer, ReconcileFlag, ReconcileReport};
use serde::Deserialize;
use subtle::ConstantTimeEq;
use tracing::info;

use super::{bearer_token, blocking, ApiJson, AppState};
use crate::config::ServerConfig;
use crate::error::ApiError;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterServerRequest {
    group_number: u32,
    token: String,
    url: String,
}

fn verify_admin_token(headers: &HeaderMap, config: &ServerConfig) -> Result<(), ApiError> {
    let Some(ref expected) = config.admin_token else {
        return Err(ApiError::Forbidden(
            "Admin API is disabled (no ADMIN_TOKEN configured)".into(),
        ));
    };

    let token = bearer_token(headers).unwrap_or("");

    // Constant-time comparison of the admin token.
    let token_bytes = token.as_bytes();
    let expected_bytes = expected.as_bytes();
    if token_bytes.len() != expected_bytes.len()
        || token_bytes.ct_eq(expected_bytes).unwrap_u8() != 1
    {
        return Err(ApiError::Unauthorized("Invalid admin token".into()));
    }

    Ok(())
}

pub async fn reconcile(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<ReconcileReport>, ApiError> {
    verify_admin_token(&headers, &state.config)?;
    let report = blocking(&state.repo, |repo| repo.reconcile()).await?;
    info!(clean = report.is_clean(), "On-demand reconciliation finished");
    Ok(Json(report))
}

pub async fn flags(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<Vec<ReconcileFlag>>, ApiError> {
    verify_admin_token(&headers, &state.config)?;
    Ok(Json(blocking(&state.repo, |repo| repo.flagged_submissions()).await?))
}

pub async fn register_server(
    headers: HeaderMap,
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterServerRequest>,
) -> Result<Json<PeerServer>, ApiError> {
    verify_admin_token(&headers, &state.config)?;
    let peer = blocking(&state.repo, move |repo| {
        repo.register_peer(req.group_number, &req.token, &req.url)
    })
    .await?;
    Ok(Json(peer))
}
