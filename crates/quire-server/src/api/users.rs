//! Registration, login and profiles.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use quire_shared::validation::validate_password;
use quire_shared::{Capabilities, Capability, GlobalUserId, UserRole};
use quire_store::{JournalError, NewAccount, Person};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{blocking, ApiJson, AppState, AuthUser};
use crate::error::ApiError;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    email: String,
    password: String,
    first_name: String,
    last_name: String,
    #[serde(default)]
    phone_number: Option<String>,
    #[serde(default)]
    organization: Option<String>,
    /// Legacy role code, unioned with `capabilities`.
    #[serde(default)]
    user_type: Option<u8>,
    #[serde(default)]
    capabilities: Vec<Capability>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    user_id: GlobalUserId,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    user_id: GlobalUserId,
    token: String,
}

pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<Json<RegisterResponse>, ApiError> {
    validate_password(&req.password)?;

    let mut capabilities: Capabilities = req.capabilities.into_iter().collect();
    if let Some(code) = req.user_type {
        capabilities = capabilities.union(UserRole::from_code(code)?.capabilities());
    }

    let cost = state.config.bcrypt_cost;
    let password = req.password;
    let password_hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| ApiError::Internal(format!("Hashing task failed: {e}")))?
        .map_err(|e| ApiError::Internal(format!("Password hashing failed: {e}")))?;

    let account = NewAccount {
        email: req.email,
        password_hash,
        first_name: req.first_name,
        last_name: req.last_name,
        phone_number: req.phone_number,
        organization: req.organization,
        capabilities,
    };
    let account = blocking(&state.repo, move |repo| repo.register_user(account)).await?;

    Ok(Json(RegisterResponse {
        user_id: account.global.id,
    }))
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let email = req.email.clone();
    let account = match blocking(&state.repo, move |repo| repo.find_account(&email)).await {
        Ok(account) => account,
        Err(ApiError::Journal(JournalError::BadUser(_))) => return Err(ApiError::BadCredentials),
        Err(e) => return Err(e),
    };

    let hash = account.user.password_hash.clone();
    let password = req.password;
    let valid = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| ApiError::Internal(format!("Verification task failed: {e}")))?
        // A malformed stored hash is treated like a wrong password.
        .unwrap_or(false);
    if !valid {
        debug!(user_id = %account.global.id, "Login rejected");
        return Err(ApiError::BadCredentials);
    }

    let token = state.sessions.create(account.global.id.clone()).await;
    info!(user_id = %account.global.id, "User logged in");
    Ok(Json(LoginResponse {
        user_id: account.global.id,
        token,
    }))
}

pub async fn logout(State(state): State<AppState>, user: AuthUser) -> StatusCode {
    state.sessions.revoke(&user.token).await;
    StatusCode::NO_CONTENT
}

pub async fn profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Person>, ApiError> {
    let id = GlobalUserId::parse(&id)?;
    let person = blocking(&state.repo, move |repo| repo.profile(&id)).await?;
    Ok(Json(person))
}

pub async fn remove_me(State(state): State<AppState>, user: AuthUser) -> Result<StatusCode, ApiError> {
    let id = user.id.clone();
    blocking(&state.repo, move |repo| repo.remove_account(&id)).await?;
    state.sessions.revoke_user(&user.id).await;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::super::tests::{test_app, PASSWORD};
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_register_login_profile() {
        let app = test_app();
        let (user_id, token) = app.signup("ada@example.org", &["publisher"]).await;
        assert!(user_id.starts_with("13"));

        let (status, body) = app.call("GET", &format!("/users/{user_id}"), None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["email"], "ada@example.org");
        assert_eq!(body["capabilities"], json!(["publisher"]));
        assert!(body.get("passwordHash").is_none());

        let (status, _) = app.call("POST", "/users/logout", Some(&token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = app.call("POST", "/users/logout", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_register_rejections() {
        let app = test_app();
        app.signup("ada@example.org", &[]).await;

        let (status, body) = app
            .call(
                "POST",
                "/users/register",
                None,
                Some(json!({
                    "email": "ADA@example.org",
                    "password": PASSWORD,
                    "firstName": "Ada",
                    "lastName": "L",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "duplicate_email");

        let (status, body) = app
            .call(
                "POST",
                "/users/register",
                None,
                Some(json!({
                    "email": "weak@example.org",
                    "password": "password",
                    "firstName": "W",
                    "lastName": "K",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "validation_error");
    }

    #[tokio::test]
    async fn test_bad_credentials() {
        let app = test_app();
        app.signup("ada@example.org", &[]).await;

        for (email, password) in [("ada@example.org", "Wr0ng!pass"), ("nobody@example.org", PASSWORD)] {
            let (status, body) = app
                .call(
                    "POST",
                    "/users/login",
                    None,
                    Some(json!({ "email": email, "password": password })),
                )
                .await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert_eq!(body["code"], "bad_credentials");
        }
    }

    #[tokio::test]
    async fn test_unknown_profile_and_remove_me() {
        let app = test_app();
        let (user_id, token) = app.signup("ada@example.org", &[]).await;

        let (status, body) = app
            .call("GET", "/users/13aaaaaaaa-aaaa-4aaa-8aaa-aaaaaaaaaaaa", None, None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "bad_user");

        let (status, _) = app.call("DELETE", "/users/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, body) = app.call("GET", &format!("/users/{user_id}"), None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deleted"], true);
        assert_eq!(body["firstName"], "[deleted]");
        assert!(body.get("email").map_or(true, |e| e.is_null()));
        let (status, _) = app.call("POST", "/users/logout", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
