use axum::{extract::Extension, response::Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::{self, TokenScope, TokenUse};
use crate::database::manager::DatabaseManager;
use crate::database::models::{Admin, UserRole};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};

const ADMIN_COLUMNS: &str =
    "id, email, password_hash, first_name, last_name, refresh_token_hash, created_at, updated_at";

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// POST /central/auth/login - authenticate a central admin against the
/// registry database and hand out an access/refresh pair
pub async fn login(Json(payload): Json<LoginRequest>) -> ApiResult<Value> {
    let pool = DatabaseManager::central_pool().await?;

    let admin = sqlx::query_as::<_, Admin>(&format!(
        "SELECT {} FROM admins WHERE email = $1",
        ADMIN_COLUMNS
    ))
    .bind(&payload.email)
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| ApiError::unauthorized("Invalid email or password"))?;

    if !auth::verify_password(&payload.password, &admin.password_hash)? {
        return Err(ApiError::unauthorized("Invalid email or password"));
    }

    let (tokens, refresh_hash) =
        auth::issue_token_pair(admin.id, &admin.email, TokenScope::Central, None, UserRole::Admin)?;

    sqlx::query("UPDATE admins SET refresh_token_hash = $2, updated_at = NOW() WHERE id = $1")
        .bind(admin.id)
        .bind(&refresh_hash)
        .execute(&pool)
        .await?;

    tracing::info!("Central admin {} logged in", admin.email);

    Ok(ApiResponse::success(json!({
        "tokens": tokens,
        "admin": admin,
    })))
}

/// POST /central/auth/refresh - rotate a central refresh token. The stored
/// hash must match, so a stolen-then-rotated token stops working.
pub async fn refresh(Json(payload): Json<RefreshRequest>) -> ApiResult<Value> {
    let claims = auth::validate_jwt(&payload.refresh_token)?;

    if claims.token_use != TokenUse::Refresh || claims.scope != TokenScope::Central {
        return Err(ApiError::unauthorized("Not a central refresh token"));
    }

    let pool = DatabaseManager::central_pool().await?;
    let admin = sqlx::query_as::<_, Admin>(&format!(
        "SELECT {} FROM admins WHERE id = $1",
        ADMIN_COLUMNS
    ))
    .bind(claims.sub)
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| ApiError::unauthorized("Account no longer exists"))?;

    let presented = auth::hash_refresh_token(&payload.refresh_token);
    if admin.refresh_token_hash.as_deref() != Some(presented.as_str()) {
        return Err(ApiError::unauthorized("Refresh token has been revoked"));
    }

    let (tokens, refresh_hash) =
        auth::issue_token_pair(admin.id, &admin.email, TokenScope::Central, None, UserRole::Admin)?;

    sqlx::query("UPDATE admins SET refresh_token_hash = $2, updated_at = NOW() WHERE id = $1")
        .bind(admin.id)
        .bind(&refresh_hash)
        .execute(&pool)
        .await?;

    Ok(ApiResponse::success(json!({ "tokens": tokens })))
}

/// DELETE /central/auth/session - revoke the current admin's refresh token
pub async fn logout(Extension(auth_user): Extension<AuthUser>) -> ApiResult<Value> {
    let pool = DatabaseManager::central_pool().await?;

    sqlx::query("UPDATE admins SET refresh_token_hash = NULL, updated_at = NOW() WHERE id = $1")
        .bind(auth_user.id)
        .execute(&pool)
        .await?;

    Ok(ApiResponse::success(json!({ "logged_out": true })))
}
