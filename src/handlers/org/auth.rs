use axum::extract::connect_info::ConnectInfo;
use axum::{extract::Extension, http::HeaderMap, response::Json};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;

use crate::auth::{self, TokenScope, TokenUse};
use crate::database::models::UserRole;
use crate::error::ApiError;
use crate::handlers::{validate_email, validate_password};
use crate::middleware::rate_limit::client_ip;
use crate::middleware::{ApiResponse, ApiResult, CurrentUser, OrgContext, OrgPool};
use crate::services::mailer;
use crate::services::user_service::NewPatient;
use crate::services::UserService;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// POST /:org/auth/register - patient self-registration. Creates the user
/// with a patient profile, records the client IP, and sends a welcome email.
pub async fn register(
    Extension(org): Extension<OrgContext>,
    Extension(OrgPool(pool)): Extension<OrgPool>,
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    Json(payload): Json<NewPatient>,
) -> ApiResult<Value> {
    validate_email(&payload.email)?;
    validate_password(&payload.password)?;

    let registration_ip = client_ip(&headers, connect_info.as_ref());
    let email = payload.email.clone();
    let first_name = payload.first_name.clone();

    let service = UserService::new(pool);
    let patient = service.create_patient(payload, registration_ip).await?;

    mailer::notify_registration(&email, &first_name, &org.slug);

    let (tokens, refresh_hash) = auth::issue_token_pair(
        patient.id,
        &patient.email,
        TokenScope::Org,
        Some(org.slug.clone()),
        UserRole::Patient,
    )?;

    service.set_refresh_hash(patient.id, Some(&refresh_hash)).await?;

    tracing::info!("Patient {} registered with organization '{}'", patient.email, org.slug);

    Ok(ApiResponse::created(json!({
        "patient": patient,
        "tokens": tokens,
    })))
}

/// POST /:org/auth/login - authenticate against the tenant's users table
pub async fn login(
    Extension(org): Extension<OrgContext>,
    Extension(OrgPool(pool)): Extension<OrgPool>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Value> {
    let service = UserService::new(pool);

    let user = service
        .find_by_email(&payload.email)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid email or password"))?;

    if !auth::verify_password(&payload.password, &user.password_hash)? {
        return Err(ApiError::unauthorized("Invalid email or password"));
    }

    let role = user
        .role()
        .ok_or_else(|| ApiError::forbidden("Account has no role in this organization"))?;

    let (tokens, refresh_hash) =
        auth::issue_token_pair(user.id, &user.email, TokenScope::Org, Some(org.slug.clone()), role)?;

    service.set_refresh_hash(user.id, Some(&refresh_hash)).await?;

    Ok(ApiResponse::success(json!({
        "user": {
            "id": user.id,
            "email": user.email,
            "first_name": user.first_name,
            "last_name": user.last_name,
            "role": role,
        },
        "tokens": tokens,
    })))
}

/// POST /:org/auth/refresh - rotate an org-scoped refresh token
pub async fn refresh(
    Extension(org): Extension<OrgContext>,
    Extension(OrgPool(pool)): Extension<OrgPool>,
    Json(payload): Json<RefreshRequest>,
) -> ApiResult<Value> {
    let claims = auth::validate_jwt(&payload.refresh_token)?;

    if claims.token_use != TokenUse::Refresh
        || claims.scope != TokenScope::Org
        || claims.org.as_deref() != Some(org.slug.as_str())
    {
        return Err(ApiError::unauthorized("Not a refresh token for this organization"));
    }

    let service = UserService::new(pool);
    let user = service
        .find_by_id(claims.sub)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Account no longer exists"))?;

    let presented = auth::hash_refresh_token(&payload.refresh_token);
    if user.refresh_token_hash.as_deref() != Some(presented.as_str()) {
        return Err(ApiError::unauthorized("Refresh token has been revoked"));
    }

    // Re-derive the role from the profile so a changed role takes effect here
    let role = user
        .role()
        .ok_or_else(|| ApiError::forbidden("Account has no role in this organization"))?;

    let (tokens, refresh_hash) =
        auth::issue_token_pair(user.id, &user.email, TokenScope::Org, Some(org.slug.clone()), role)?;

    service.set_refresh_hash(user.id, Some(&refresh_hash)).await?;

    Ok(ApiResponse::success(json!({ "tokens": tokens })))
}

/// DELETE /:org/auth/session - revoke the current user's refresh token
pub async fn logout(
    Extension(OrgPool(pool)): Extension<OrgPool>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<Value> {
    UserService::new(pool)
        .set_refresh_hash(current.user.id, None)
        .await?;

    Ok(ApiResponse::success(json!({ "logged_out": true })))
}

/// GET /:org/auth/whoami - current user plus their role profile
pub async fn whoami(
    Extension(OrgPool(pool)): Extension<OrgPool>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<Value> {
    let service = UserService::new(pool);

    let profile = match current.role {
        UserRole::Doctor => json!(service.get_doctor(current.user.id).await?),
        UserRole::Patient => json!(service.get_patient(current.user.id).await?),
        UserRole::Admin => Value::Null,
    };

    Ok(ApiResponse::success(json!({
        "id": current.user.id,
        "email": current.user.email,
        "first_name": current.user.first_name,
        "last_name": current.user.last_name,
        "role": current.role,
        "profile": profile,
    })))
}
