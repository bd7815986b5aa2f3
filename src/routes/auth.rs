use crate::db::Users;
use crate::middleware::auth::{hash_password, issue_token, verify_password, AuthUser};
use crate::models::{AppState, ChangePasswordRequest, LoginRequest, LoginResponse, UserInfo};
use crate::types::{AppError, AppResult};
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::info;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/change-password", post(change_password))
        .route("/api/auth/me", get(me))
        .with_state(state)
}

async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    if request.username.is_empty() || request.password.is_empty() {
        return Err(AppError::InvalidRequest(
            "username and password are required".to_string(),
        ));
    }

    let users = Users::new(state.pool.clone());
    let user = users
        .by_username(&request.username)
        .await?
        .ok_or_else(|| AppError::Auth("invalid username or password".to_string()))?;

    if !verify_password(&request.password, &user.password) {
        return Err(AppError::Auth("invalid username or password".to_string()));
    }

    let token = issue_token(
        user.id,
        &user.username,
        &state.config.auth.secret,
        state.config.auth.token_ttl_secs,
    )?;

    info!(user = %user.username, "login succeeded");

    Ok(Json(LoginResponse {
        token,
        user: UserInfo {
            id: user.id,
            username: user.username,
        },
    }))
}

async fn change_password(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(request): Json<ChangePasswordRequest>,
) -> AppResult<Json<serde_json::Value>> {
    if request.old_password.is_empty() || request.new_password.is_empty() {
        return Err(AppError::InvalidRequest(
            "old password and new password are required".to_string(),
        ));
    }
    if request.new_password.len() < 6 {
        return Err(AppError::InvalidRequest(
            "new password must be at least 6 characters".to_string(),
        ));
    }

    let users = Users::new(state.pool.clone());
    let user = users
        .by_username(&auth.username)
        .await?
        .ok_or_else(|| AppError::NotFound("user".to_string()))?;

    if !verify_password(&request.old_password, &user.password) {
        return Err(AppError::Auth("invalid old password".to_string()));
    }

    let hash = hash_password(&request.new_password)?;
    users.update_password(user.id, &hash).await?;

    info!(user = %user.username, "password changed");
    Ok(Json(serde_json::json!({"message": "Password changed successfully"})))
}

async fn me(auth: AuthUser) -> Json<UserInfo> {
    Json(UserInfo {
        id: auth.id,
        username: auth.username,
    })
}
