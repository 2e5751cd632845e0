//! Submission routes: listing, creation (JSON or zip), files, reviewers,
//! reviews and the editor decision.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use quire_shared::constants::MAX_FILE_SIZE;
use quire_shared::validation::decode_base64;
use quire_shared::{ApprovalStatus, GlobalUserId, SubmissionState};
use quire_store::{Category, CreateSubmission, FileRecord, NewFile, Submission, SubmissionView};
use serde::{Deserialize, Serialize};

use super::{blocking, ApiJson, AppState, AuthUser};
use crate::archive;
use crate::error::ApiError;

const DEFAULT_PAGE_SIZE: u32 = 50;
const MAX_PAGE_SIZE: u32 = 200;

#[derive(Deserialize)]
pub struct ListQuery {
    limit: Option<u32>,
    offset: Option<u32>,
    tag: Option<String>,
}

/// A file on the wire; `content` is base64.
#[derive(Deserialize)]
pub struct FileUpload {
    path: String,
    content: String,
}

impl FileUpload {
    fn decode(self) -> Result<NewFile, ApiError> {
        Ok(NewFile {
            path: self.path,
            bytes: decode_base64("content", &self.content)?,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionFields {
    name: String,
    #[serde(default)]
    license: Option<String>,
    #[serde(rename = "abstract", default)]
    abstract_text: String,
    #[serde(default, alias = "tags")]
    categories: Vec<String>,
    authors: Vec<GlobalUserId>,
    #[serde(default)]
    reviewers: Vec<GlobalUserId>,
}

impl SubmissionFields {
    fn with_files(self, files: Vec<NewFile>) -> CreateSubmission {
        CreateSubmission {
            name: self.name,
            license: self.license,
            abstract_text: self.abstract_text,
            categories: self.categories,
            authors: self.authors,
            reviewers: self.reviewers,
            files,
        }
    }
}

#[derive(Deserialize)]
pub struct CreateRequest {
    #[serde(flatten)]
    fields: SubmissionFields,
    #[serde(default)]
    files: Vec<FileUpload>,
}

#[derive(Deserialize)]
pub struct ZipRequest {
    #[serde(flatten)]
    fields: SubmissionFields,
    /// Base64 zip archive.
    archive: String,
}

#[derive(Serialize)]
pub struct CreatedResponse {
    id: i64,
}

#[derive(Deserialize)]
pub struct ReviewersRequest {
    reviewers: Vec<GlobalUserId>,
}

#[derive(Deserialize)]
pub struct ReviewRequest {
    approved: bool,
    /// Base64 review text.
    body: String,
}

#[derive(Serialize)]
pub struct StateResponse {
    state: SubmissionState,
}

#[derive(Deserialize)]
pub struct ApprovalRequest {
    #[serde(alias = "status")]
    approved: bool,
}

#[derive(Serialize)]
pub struct ApprovalResponse {
    approval: ApprovalStatus,
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Submission>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0);
    let tag = query.tag;
    let submissions = blocking(&state.repo, move |repo| {
        repo.list_submissions(tag.as_deref(), limit, offset)
    })
    .await?;
    Ok(Json(submissions))
}

pub async fn categories(State(state): State<AppState>) -> Result<Json<Vec<Category>>, ApiError> {
    Ok(Json(blocking(&state.repo, |repo| repo.list_categories()).await?))
}

pub async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<CreateRequest>,
) -> Result<Json<CreatedResponse>, ApiError> {
    let files = req
        .files
        .into_iter()
        .map(FileUpload::decode)
        .collect::<Result<Vec<_>, _>>()?;
    let new = req.fields.with_files(files);
    let id = blocking(&state.repo, move |repo| repo.create_submission(&user.id, new)).await?;
    Ok(Json(CreatedResponse { id }))
}

pub async fn create_from_zip(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<ZipRequest>,
) -> Result<Json<CreatedResponse>, ApiError> {
    let bytes = decode_base64("archive", &req.archive)?;
    let files = tokio::task::spawn_blocking(move || archive::unpack(&bytes, MAX_FILE_SIZE))
        .await
        .map_err(|e| ApiError::Internal(format!("Archive task failed: {e}")))??;
    let new = req.fields.with_files(files);
    let id = blocking(&state.repo, move |repo| repo.create_submission(&user.id, new)).await?;
    Ok(Json(CreatedResponse { id }))
}

pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<SubmissionView>, ApiError> {
    Ok(Json(blocking(&state.repo, move |repo| repo.get_submission(id)).await?))
}

pub async fn remove(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    blocking(&state.repo, move |repo| repo.delete_submission(&user.id, id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_file(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<FileUpload>,
) -> Result<Json<FileRecord>, ApiError> {
    let file = req.decode()?;
    Ok(Json(blocking(&state.repo, move |repo| repo.add_file(&user.id, id, file)).await?))
}

pub async fn assign_reviewers(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<ReviewersRequest>,
) -> Result<Json<StateResponse>, ApiError> {
    let submission_state = blocking(&state.repo, move |repo| {
        repo.assign_reviewers(&user.id, id, &req.reviewers)
    })
    .await?;
    Ok(Json(StateResponse {
        state: submission_state,
    }))
}

pub async fn append_review(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<ReviewRequest>,
) -> Result<Json<StateResponse>, ApiError> {
    let submission_state = blocking(&state.repo, move |repo| {
        repo.append_review(&user.id, id, req.approved, &req.body)
    })
    .await?;
    Ok(Json(StateResponse {
        state: submission_state,
    }))
}

pub async fn set_approval(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<ApprovalRequest>,
) -> Result<Json<ApprovalResponse>, ApiError> {
    let approval = blocking(&state.repo, move |repo| {
        repo.set_approval(&user.id, id, req.approved)
    })
    .await?;
    Ok(Json(ApprovalResponse { approval }))
}

#[cfg(test)]
mod tests {
    use super::super::tests::{test_app, TestApp};
    use crate::archive::tests::build_zip;
    use axum::http::StatusCode;
    use quire_shared::validation::encode_base64;
    use serde_json::{json, Value};

    async fn create_demo(app: &TestApp, token: &str, author: &str, reviewers: &[&str]) -> i64 {
        let (status, body) = app
            .call(
                "POST",
                "/submissions",
                Some(token),
                Some(json!({
                    "name": "demo",
                    "license": "MIT",
                    "abstract": "A tiny program",
                    "categories": ["c"],
                    "authors": [author],
                    "reviewers": reviewers,
                    "files": [{ "path": "main.c", "content": encode_base64(b"int main(){}") }],
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["id"].as_i64().unwrap()
    }

    fn review(approved: bool) -> Value {
        json!({ "approved": approved, "body": encode_base64(b"looks fine") })
    }

    #[tokio::test]
    async fn test_review_and_approval_flow() {
        let app = test_app();
        let (author, author_token) = app.signup("a@example.org", &["publisher"]).await;
        let (r1, r1_token) = app.signup("r1@example.org", &["reviewer"]).await;
        let (r2, r2_token) = app.signup("r2@example.org", &["reviewer"]).await;
        let (_, editor_token) = app.signup("e@example.org", &["editor"]).await;

        let id = create_demo(&app, &author_token, &author, &[&r1]).await;
        let uri = format!("/submissions/{id}");

        let (status, body) = app
            .call("POST", &format!("{uri}/reviewers"), Some(&author_token), Some(json!({ "reviewers": [r2] })))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["state"], "REVIEW_PENDING");

        let (status, _) = app
            .call("POST", &format!("{uri}/reviews"), Some(&r1_token), Some(review(true)))
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = app
            .call("POST", &format!("{uri}/approval"), Some(&editor_token), Some(json!({ "approved": true })))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "missing_reviews");

        let (status, body) = app
            .call("POST", &format!("{uri}/reviews"), Some(&author_token), Some(review(true)))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "not_reviewer");

        let (status, body) = app
            .call("POST", &format!("{uri}/reviews"), Some(&r2_token), Some(review(true)))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "REVIEW_COMPLETE");

        let (status, body) = app
            .call("POST", &format!("{uri}/reviews"), Some(&r2_token), Some(review(false)))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "duplicate_review");

        let (status, body) = app
            .call("POST", &format!("{uri}/approval"), Some(&author_token), Some(json!({ "approved": true })))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "wrong_permissions");

        let (status, body) = app
            .call("POST", &format!("{uri}/approval"), Some(&editor_token), Some(json!({ "status": true })))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["approval"], "approved");

        let (status, body) = app.call("GET", &uri, None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "APPROVED");
        assert_eq!(body["abstract"], "A tiny program");
        assert_eq!(body["reviews"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_create_validation() {
        let app = test_app();
        let (author, token) = app.signup("a@example.org", &["publisher"]).await;

        let (status, body) = app
            .call(
                "POST",
                "/submissions",
                Some(&token),
                Some(json!({ "name": "demo", "authors": [] })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "validation_error");

        let (status, body) = app
            .call(
                "POST",
                "/submissions",
                Some(&token),
                Some(json!({
                    "name": "demo",
                    "authors": [author],
                    "files": [{ "path": "main.c", "content": "!!not base64!!" }],
                })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "validation_error");

        let (status, _) = app
            .call("POST", "/submissions", None, Some(json!({ "name": "demo", "authors": [author] })))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_duplicate_file_and_listing() {
        let app = test_app();
        let (author, token) = app.signup("a@example.org", &["publisher"]).await;
        let id = create_demo(&app, &token, &author, &[]).await;

        let (status, body) = app
            .call(
                "POST",
                &format!("/submissions/{id}/files"),
                Some(&token),
                Some(json!({ "path": "main.c", "content": encode_base64(b"other") })),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "duplicate_file");

        let (status, body) = app.call("GET", "/submissions?tag=c&limit=10", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (status, body) = app.call("GET", "/categories", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["tag"], "c");

        let (status, _) = app.call("DELETE", &format!("/submissions/{id}"), Some(&token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, body) = app.call("GET", &format!("/submissions/{id}"), None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "no_submission");
    }

    #[tokio::test]
    async fn test_zip_upload() {
        let app = test_app();
        let (author, token) = app.signup("a@example.org", &["publisher"]).await;
        let zip = build_zip(&[("src/", b""), ("src/main.c", b"int main(){}"), ("README", b"hi")]);

        let (status, body) = app
            .call(
                "POST",
                "/submissions/zip",
                Some(&token),
                Some(json!({
                    "name": "zipped",
                    "authors": [author],
                    "archive": encode_base64(&zip),
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        let id = body["id"].as_i64().unwrap();

        let (_, body) = app.call("GET", &format!("/submissions/{id}"), None, None).await;
        let mut paths: Vec<&str> = body["files"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["path"].as_str().unwrap())
            .collect();
        paths.sort_unstable();
        assert_eq!(paths, vec!["README", "src/main.c"]);

        let (status, body) = app
            .call(
                "POST",
                "/submissions/zip",
                Some(&token),
                Some(json!({
                    "name": "broken",
                    "authors": [author],
                    "archive": encode_base64(b"not a zip"),
                })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "validation_error");
    }
}
