use axum::{
    extract::{Extension, Path},
    response::Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, CurrentUser, OrgPool};
use crate::services::user_service::UpdatePatient;
use crate::services::UserService;

/// GET /:org/patients - staff only; patients never see each other
pub async fn list(
    Extension(OrgPool(pool)): Extension<OrgPool>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<Value> {
    current.ensure_staff()?;

    let patients = UserService::new(pool).list_patients().await?;

    Ok(ApiResponse::success(json!({ "patients": patients })))
}

/// GET /:org/patients/:id - staff, or the patient reading their own record
pub async fn show(
    Extension(OrgPool(pool)): Extension<OrgPool>,
    Extension(current): Extension<CurrentUser>,
    Path((_org, id)): Path<(String, Uuid)>,
) -> ApiResult<Value> {
    if current.is_patient() && current.user.id != id {
        return Err(ApiError::forbidden("Patients can only access their own record"));
    }

    let patient = UserService::new(pool)
        .get_patient(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Patient not found"))?;

    Ok(ApiResponse::success(json!({ "patient": patient })))
}

/// PUT /:org/patients/:id - admin, or the patient updating their own record
pub async fn update(
    Extension(OrgPool(pool)): Extension<OrgPool>,
    Extension(current): Extension<CurrentUser>,
    Path((_org, id)): Path<(String, Uuid)>,
    Json(payload): Json<UpdatePatient>,
) -> ApiResult<Value> {
    if !current.is_admin() && current.user.id != id {
        return Err(ApiError::forbidden("Patients can only update their own record"));
    }

    let patient = UserService::new(pool).update_patient(id, payload).await?;

    Ok(ApiResponse::success(json!({ "patient": patient })))
}

/// DELETE /:org/patients/:id - admin only
pub async fn destroy(
    Extension(OrgPool(pool)): Extension<OrgPool>,
    Extension(current): Extension<CurrentUser>,
    Path((_org, id)): Path<(String, Uuid)>,
) -> ApiResult<Value> {
    current.ensure_admin()?;

    UserService::new(pool).delete_patient(id).await?;

    Ok(ApiResponse::success(json!({ "deleted": true })))
}
