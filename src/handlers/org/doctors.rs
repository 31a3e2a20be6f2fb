use axum::{
    extract::{Extension, Path},
    response::Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::ApiError;
use crate::handlers::{validate_email, validate_password};
use crate::middleware::{ApiResponse, ApiResult, CurrentUser, OrgPool};
use crate::services::user_service::{NewDoctor, UpdateDoctor};
use crate::services::UserService;

/// GET /:org/doctors - any authenticated org user can browse doctors
pub async fn list(Extension(OrgPool(pool)): Extension<OrgPool>) -> ApiResult<Value> {
    let doctors = UserService::new(pool).list_doctors().await?;

    Ok(ApiResponse::success(json!({ "doctors": doctors })))
}

/// POST /:org/doctors - admin creates a doctor account with its profile
pub async fn create(
    Extension(OrgPool(pool)): Extension<OrgPool>,
    Extension(current): Extension<CurrentUser>,
    Json(payload): Json<NewDoctor>,
) -> ApiResult<Value> {
    current.ensure_admin()?;
    validate_email(&payload.email)?;
    validate_password(&payload.password)?;

    let doctor = UserService::new(pool).create_doctor(payload).await?;

    Ok(ApiResponse::created(json!({ "doctor": doctor })))
}

/// GET /:org/doctors/:id
pub async fn show(
    Extension(OrgPool(pool)): Extension<OrgPool>,
    Path((_org, id)): Path<(String, Uuid)>,
) -> ApiResult<Value> {
    let doctor = UserService::new(pool)
        .get_doctor(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Doctor not found"))?;

    Ok(ApiResponse::success(json!({ "doctor": doctor })))
}

/// PUT /:org/doctors/:id - admin updates name or profile fields
pub async fn update(
    Extension(OrgPool(pool)): Extension<OrgPool>,
    Extension(current): Extension<CurrentUser>,
    Path((_org, id)): Path<(String, Uuid)>,
    Json(payload): Json<UpdateDoctor>,
) -> ApiResult<Value> {
    current.ensure_admin()?;

    let doctor = UserService::new(pool).update_doctor(id, payload).await?;

    Ok(ApiResponse::success(json!({ "doctor": doctor })))
}

/// DELETE /:org/doctors/:id - admin removes a doctor; their appointments
/// keep their rows with the doctor reference nulled
pub async fn destroy(
    Extension(OrgPool(pool)): Extension<OrgPool>,
    Extension(current): Extension<CurrentUser>,
    Path((_org, id)): Path<(String, Uuid)>,
) -> ApiResult<Value> {
    current.ensure_admin()?;

    UserService::new(pool).delete_doctor(id).await?;

    Ok(ApiResponse::success(json!({ "deleted": true })))
}
