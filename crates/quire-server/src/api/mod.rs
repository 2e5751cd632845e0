//! HTTP API.
//!
//! Handlers are thin: they parse the request, run the repository call on
//! the blocking pool and serialize the result. Every JSON body is camelCase.

mod admin;
mod comments;
mod federation;
mod submissions;
mod users;

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{DefaultBodyLimit, FromRequest, FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, Method},
    middleware,
    routing::{delete, get, post, put},
    Json, Router,
};
use quire_shared::constants::APP_NAME;
use quire_shared::GlobalUserId;
use quire_store::{JournalResult, Repository};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::sessions::SessionStore;

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub sessions: SessionStore,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    let federation = Router::new()
        .route("/federation/submissions/:id", get(federation::submission))
        .route("/federation/users/:id", get(federation::user))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            federation::require_peer,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/info", get(server_info))
        .route("/users/register", post(users::register))
        .route("/users/login", post(users::login))
        .route("/users/logout", post(users::logout))
        .route("/users/me", delete(users::remove_me))
        .route("/users/:id", get(users::profile))
        .route("/categories", get(submissions::categories))
        .route(
            "/submissions",
            get(submissions::list).post(submissions::create),
        )
        .route("/submissions/zip", post(submissions::create_from_zip))
        .route(
            "/submissions/:id",
            get(submissions::get_one).delete(submissions::remove),
        )
        .route("/submissions/:id/files", post(submissions::add_file))
        .route("/submissions/:id/reviewers", post(submissions::assign_reviewers))
        .route("/submissions/:id/reviews", post(submissions::append_review))
        .route("/submissions/:id/approval", post(submissions::set_approval))
        .route("/files/:id", get(comments::get_file))
        .route("/files/:id/comments", post(comments::add))
        .route(
            "/files/:id/comments/:cid",
            put(comments::edit).delete(comments::remove),
        )
        .route("/admin/reconcile", post(admin::reconcile))
        .route("/admin/flags", get(admin::flags))
        .route("/admin/servers", post(admin::register_server))
        .merge(federation)
        .layer(DefaultBodyLimit::max(state.config.max_upload_size))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ServerInfoResponse {
    name: &'static str,
    version: &'static str,
    group_number: u32,
    pending_repairs: usize,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn server_info(State(state): State<AppState>) -> Json<ServerInfoResponse> {
    Json(ServerInfoResponse {
        name: APP_NAME,
        version: env!("CARGO_PKG_VERSION"),
        group_number: state.repo.group_number(),
        pending_repairs: state.repo.pending_repairs(),
    })
}

// ---------------------------------------------------------------------------
// Shared plumbing
// ---------------------------------------------------------------------------

/// Run a repository call on the blocking pool.
pub(crate) async fn blocking<T, F>(repo: &Arc<Repository>, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Repository) -> JournalResult<T> + Send + 'static,
{
    let repo = Arc::clone(repo);
    tokio::task::spawn_blocking(move || f(&repo))
        .await
        .map_err(|e| ApiError::Internal(format!("Blocking task failed: {e}")))?
        .map_err(ApiError::from)
}

/// `axum::Json` whose rejection is reported as a validation error.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
        Ok(Self(value))
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// The caller behind a live session token.
pub struct AuthUser {
    pub id: GlobalUserId,
    pub token: String,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| ApiError::Unauthorized("Missing session token".into()))?
            .to_string();
        let id = state
            .sessions
            .resolve(&token)
            .await
            .ok_or_else(|| ApiError::Unauthorized("Unknown or expired session".into()))?;
        Ok(Self { id, token })
    }
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
