//! Read-only routes for peer journals, guarded by the security token.

use axum::{
    extract::{Path, Request, State},
    middleware::Next,
    response::Response,
    Extension, Json,
};
use quire_shared::constants::{PEER_GROUP_HEADER, SECURITY_TOKEN_HEADER};
use quire_shared::GlobalUserId;
use quire_store::{PeerServer, Person, SubmissionView};
use tracing::{debug, warn};

use super::{blocking, AppState};
use crate::error::ApiError;

/// Reject requests that do not carry a registered peer token. A claimed
/// group, when present, must own the token.
pub async fn require_peer(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let headers = request.headers();
    let token = headers
        .get(SECURITY_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("Missing security token".into()))?
        .to_string();
    let claimed_group = match headers.get(PEER_GROUP_HEADER) {
        None => None,
        Some(value) => Some(
            value
                .to_str()
                .ok()
                .and_then(|v| v.trim().parse::<u32>().ok())
                .ok_or_else(|| ApiError::Unauthorized("Malformed group header".into()))?,
        ),
    };

    let peer = blocking(&state.repo, move |repo| repo.authenticate_peer(&token, claimed_group)).await?;
    let Some(peer) = peer else {
        warn!(?claimed_group, "Rejected peer request with unknown security token");
        return Err(ApiError::Unauthorized("Unknown security token".into()));
    };

    debug!(group = peer.group_number, path = %request.uri().path(), "Peer request");
    request.extensions_mut().insert(peer);
    Ok(next.run(request).await)
}

pub async fn submission(
    State(state): State<AppState>,
    Extension(peer): Extension<PeerServer>,
    Path(id): Path<i64>,
) -> Result<Json<SubmissionView>, ApiError> {
    debug!(group = peer.group_number, submission_id = id, "Serving submission to peer");
    Ok(Json(blocking(&state.repo, move |repo| repo.get_submission(id)).await?))
}

pub async fn user(
    State(state): State<AppState>,
    Extension(peer): Extension<PeerServer>,
    Path(id): Path<String>,
) -> Result<Json<Person>, ApiError> {
    let id = GlobalUserId::parse(&id)?;
    debug!(group = peer.group_number, user_id = %id, "Serving profile to peer");
    Ok(Json(blocking(&state.repo, move |repo| repo.profile(&id)).await?))
}

#[cfg(test)]
mod tests {
    use super::super::tests::test_app;
    use super::*;
    use axum::body::Body;
    use axum::http::{Request as HttpRequest, StatusCode};

    fn peer_request(uri: &str, token: Option<&str>, group: Option<&str>) -> HttpRequest<Body> {
        let mut builder = HttpRequest::builder().method("GET").uri(uri);
        if let Some(token) = token {
            builder = builder.header(SECURITY_TOKEN_HEADER, token);
        }
        if let Some(group) = group {
            builder = builder.header(PEER_GROUP_HEADER, group);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_security_token_is_required() {
        let app = test_app();
        app.state.repo.register_peer(7, "peer-secret", "https://seven.example").unwrap();
        let (user_id, _) = app.signup("a@example.org", &["publisher"]).await;
        let uri = format!("/federation/users/{user_id}");

        let (status, body) = app.send(peer_request(&uri, None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "unauthorized");

        let (status, _) = app.send(peer_request(&uri, Some("wrong"), None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = app.send(peer_request(&uri, Some("peer-secret"), Some("8"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = app.send(peer_request(&uri, Some("peer-secret"), Some("seven"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = app.send(peer_request(&uri, Some("peer-secret"), Some("7"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], user_id.as_str());

        let (status, body) = app
            .send(peer_request("/federation/submissions/99", Some("peer-secret"), None))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "no_submission");
    }
}
