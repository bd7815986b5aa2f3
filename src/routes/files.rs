use crate::gateway::StoredFile;
use crate::middleware::auth::{ApiCaller, AuthUser};
use crate::models::{AppState, FileListResponse, ListParams, UploadResponse};
use crate::platforms::UploadPayload;
use crate::types::{AppError, AppResult};
use axum::extract::{ConnectInfo, Multipart, Path, Query, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use std::net::SocketAddr;
use tracing::info;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/files/upload", post(upload))
        .route("/api/files/api-upload", post(api_upload))
        .route("/api/files", get(list_files))
        .route("/api/files/{id}", delete(delete_file))
        .route("/file/{id}", get(get_file))
        .with_state(state)
}

/// Pull the platform field and the file out of a multipart body.
async fn read_upload(mut multipart: Multipart) -> AppResult<(String, UploadPayload)> {
    let mut platform: Option<String> = None;
    let mut payload: Option<UploadPayload> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidRequest(format!("malformed multipart body: {}", e)))?
    {
        match field.name() {
            Some("platform") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::InvalidRequest(format!("malformed platform field: {}", e)))?;
                platform = Some(value);
            }
            Some("file") => {
                let file_name = field.file_name().unwrap_or("file").to_string();
                let content_type = field
                    .content_type()
                    .map(str::to_string)
                    .unwrap_or_else(|| {
                        mime_guess::from_path(&file_name)
                            .first_or_octet_stream()
                            .to_string()
                    });
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::InvalidRequest(format!("failed to read file: {}", e)))?;
                payload = Some(UploadPayload {
                    bytes,
                    file_name,
                    content_type,
                });
            }
            _ => {}
        }
    }

    let platform = platform.ok_or_else(|| AppError::InvalidRequest("platform is required".to_string()))?;
    let payload = payload.ok_or_else(|| AppError::InvalidRequest("no file uploaded".to_string()))?;
    Ok((platform, payload))
}

fn request_base(headers: &HeaderMap, state: &AppState) -> String {
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("http");
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}:{}", state.config.server.host, state.config.server.port));
    format!("{}://{}", scheme, host)
}

fn upload_response(stored: StoredFile, access_url: String) -> UploadResponse {
    UploadResponse {
        success: true,
        file_id: stored.id,
        platform: stored.platform.to_string(),
        file_name: stored.file_name,
        file_size: stored.size_bytes,
        content_type: stored.content_type,
        access_url,
    }
}

/// Interactive upload; the access URL is absolute so it can be pasted as-is.
async fn upload(
    State(state): State<AppState>,
    user: AuthUser,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    multipart: Multipart,
) -> AppResult<Json<UploadResponse>> {
    let (platform, payload) = read_upload(multipart).await?;
    let stored = state
        .gateway
        .store(&platform, payload, Some(addr.ip().to_string()), user.id)
        .await?;

    let access_url = format!(
        "{}/file/{}",
        request_base(&headers, &state),
        urlencoding::encode(&stored.id)
    );
    Ok(Json(upload_response(stored, access_url)))
}

/// Programmatic upload; same pipeline under the system owner identity, with a
/// relative access URL.
async fn api_upload(
    State(state): State<AppState>,
    caller: ApiCaller,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    multipart: Multipart,
) -> AppResult<Json<UploadResponse>> {
    let (platform, payload) = read_upload(multipart).await?;
    let stored = state
        .gateway
        .store(&platform, payload, Some(addr.ip().to_string()), caller.owner_id)
        .await?;

    let access_url = format!("/file/{}", urlencoding::encode(&stored.id));
    Ok(Json(upload_response(stored, access_url)))
}

async fn list_files(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(params): Query<ListParams>,
) -> AppResult<Json<FileListResponse>> {
    let (files, total, limit, offset) = state.gateway.list(params.limit, params.offset).await?;
    Ok(Json(FileListResponse {
        files,
        total,
        limit,
        offset,
    }))
}

/// RFC 5987 disposition: ASCII fallback plus a UTF-8 encoded full name.
fn content_disposition(file_name: &str) -> String {
    let ascii: String = file_name
        .chars()
        .map(|c| if c.is_ascii() && c != '"' && c != '\\' { c } else { '?' })
        .collect();
    format!(
        "inline; filename=\"{}\"; filename*=UTF-8''{}",
        ascii,
        urlencoding::encode(file_name)
    )
}

/// Public fetch path; no authentication, matching share-link semantics.
async fn get_file(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Response> {
    let fetched = state.gateway.fetch(&id).await?;

    info!(file_id = %id, size_bytes = fetched.bytes.len(), "serving file");

    Ok((
        [
            (header::CONTENT_TYPE, fetched.content_type.clone()),
            (
                header::CONTENT_DISPOSITION,
                content_disposition(&fetched.file_name),
            ),
        ],
        fetched.bytes,
    )
        .into_response())
}

async fn delete_file(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    state.gateway.delete(&id).await?;
    Ok(Json(serde_json::json!({"message": "File deleted successfully"})))
}
