//! File reads and line comments.

use axum::extract::{Path, State};
use axum::Json;
use quire_store::{Comment, CommentInput, FileView};
use serde::Deserialize;

use super::{blocking, ApiJson, AppState, AuthUser};
use crate::error::ApiError;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCommentRequest {
    /// Base64 comment text.
    body: String,
    start_line: i64,
    end_line: i64,
    #[serde(default)]
    parent_id: Option<i64>,
}

#[derive(Deserialize)]
pub struct EditCommentRequest {
    body: String,
}

pub async fn get_file(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<FileView>, ApiError> {
    Ok(Json(blocking(&state.repo, move |repo| repo.get_file(id)).await?))
}

pub async fn add(
    State(state): State<AppState>,
    user: AuthUser,
    Path(file_id): Path<i64>,
    ApiJson(req): ApiJson<AddCommentRequest>,
) -> Result<Json<Comment>, ApiError> {
    let input = CommentInput {
        body: req.body,
        start_line: req.start_line,
        end_line: req.end_line,
        parent_id: req.parent_id,
    };
    let comment = blocking(&state.repo, move |repo| repo.add_comment(&user.id, file_id, input)).await?;
    Ok(Json(comment))
}

pub async fn edit(
    State(state): State<AppState>,
    user: AuthUser,
    Path((file_id, comment_id)): Path<(i64, i64)>,
    ApiJson(req): ApiJson<EditCommentRequest>,
) -> Result<Json<Comment>, ApiError> {
    let comment = blocking(&state.repo, move |repo| {
        repo.edit_comment(&user.id, file_id, comment_id, &req.body)
    })
    .await?;
    Ok(Json(comment))
}

/// Responds with the tombstone.
pub async fn remove(
    State(state): State<AppState>,
    user: AuthUser,
    Path((file_id, comment_id)): Path<(i64, i64)>,
) -> Result<Json<Comment>, ApiError> {
    let comment = blocking(&state.repo, move |repo| {
        repo.delete_comment(&user.id, file_id, comment_id)
    })
    .await?;
    Ok(Json(comment))
}

#[cfg(test)]
mod tests {
    use super::super::tests::test_app;
    use axum::http::StatusCode;
    use quire_shared::constants::DELETED_COMMENT_BODY;
    use quire_shared::validation::encode_base64;
    use serde_json::json;

    #[tokio::test]
    async fn test_comment_thread_over_http() {
        let app = test_app();
        let (author, token) = app.signup("a@example.org", &["publisher"]).await;
        let (_, other_token) = app.signup("o@example.org", &["publisher"]).await;

        let (status, body) = app
            .call(
                "POST",
                "/submissions",
                Some(&token),
                Some(json!({
                    "name": "demo",
                    "authors": [author],
                    "files": [{ "path": "main.c", "content": encode_base64(b"int main(){}\nreturn 0;\n") }],
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        let id = body["id"].as_i64().unwrap();
        let (_, body) = app.call("GET", &format!("/submissions/{id}"), None, None).await;
        let file_id = body["files"][0]["id"].as_i64().unwrap();
        let comments = format!("/files/{file_id}/comments");

        let (status, c1) = app
            .call(
                "POST",
                &comments,
                Some(&token),
                Some(json!({ "body": encode_base64(b"why?"), "startLine": 1, "endLine": 2 })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{c1}");
        let c1_id = c1["id"].as_i64().unwrap();

        let (status, body) = app
            .call(
                "POST",
                &comments,
                Some(&other_token),
                Some(json!({ "body": encode_base64(b"because"), "startLine": 1, "endLine": 2, "parentId": c1_id })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");

        let (status, body) = app
            .call(
                "POST",
                &comments,
                Some(&token),
                Some(json!({ "body": encode_base64(b"x"), "startLine": 0, "endLine": 1, "parentId": 9999 })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "bad_parent");

        let (status, body) = app
            .call(
                "PUT",
                &format!("{comments}/{c1_id}"),
                Some(&other_token),
                Some(json!({ "body": encode_base64(b"hijack") })),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "wrong_permissions");

        let (status, body) = app
            .call("DELETE", &format!("{comments}/{c1_id}"), Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["body"], DELETED_COMMENT_BODY);

        let (status, body) = app.call("GET", &format!("/files/{file_id}"), None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["comments"][0]["body"], DELETED_COMMENT_BODY);
        assert_eq!(body["comments"][0]["replies"][0]["body"], encode_base64(b"because"));

        let (status, body) = app.call("GET", "/files/424242", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "no_file");
    }
}
