use axum::{extract::Path, response::Json};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::ApiError;
use crate::handlers::{validate_email, validate_password};
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::OrgService;

#[derive(Debug, Deserialize)]
pub struct CreateOrganizationRequest {
    /// URL slug for the clinic; doubles as the tenant identifier
    pub name: String,
    /// Seeded organization admin account
    pub admin_email: String,
    pub admin_password: String,
}

/// GET /central/organizations - list registered clinics
pub async fn list() -> ApiResult<Value> {
    let service = OrgService::new().await?;
    let organizations = service.list_organizations().await?;

    Ok(ApiResponse::success(json!({ "organizations": organizations })))
}

/// POST /central/organizations - register a clinic, provision its database,
/// and seed its first admin account
pub async fn create(Json(payload): Json<CreateOrganizationRequest>) -> ApiResult<Value> {
    validate_email(&payload.admin_email)?;
    validate_password(&payload.admin_password)?;

    let service = OrgService::new().await?;
    let organization = service
        .create_organization(&payload.name, &payload.admin_email, &payload.admin_password)
        .await?;

    Ok(ApiResponse::created(json!({ "organization": organization })))
}

/// GET /central/organizations/:id
pub async fn show(Path(id): Path<Uuid>) -> ApiResult<Value> {
    let service = OrgService::new().await?;
    let organization = service
        .get_organization_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Organization not found"))?;

    Ok(ApiResponse::success(json!({ "organization": organization })))
}

/// DELETE /central/organizations/:id - drop the tenant database and its
/// restricted role, then retire the registry row
pub async fn destroy(Path(id): Path<Uuid>) -> ApiResult<Value> {
    let service = OrgService::new().await?;
    let organization = service.delete_organization(id).await?;

    Ok(ApiResponse::success(json!({
        "deleted": true,
        "organization": organization.name,
    })))
}
