use axum::{extract::Request, middleware::Next, response::Response};

use super::auth::AuthUser;
use super::resolve_org::{OrgContext, OrgPool};
use crate::auth::TokenScope;
use crate::database::manager::DatabaseManager;
use crate::database::models::{OrgUser, UserRole};
use crate::error::ApiError;
use crate::services::UserService;

/// Organization user loaded (with its profile join) for the current request
#[derive(Clone, Debug)]
pub struct CurrentUser {
    pub user: OrgUser,
    pub role: UserRole,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub fn is_doctor(&self) -> bool {
        self.role == UserRole::Doctor
    }

    pub fn is_patient(&self) -> bool {
        self.role == UserRole::Patient
    }

    pub fn ensure_admin(&self) -> Result<(), ApiError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ApiError::forbidden("Administrator access required"))
        }
    }

    /// Admin or doctor
    pub fn ensure_staff(&self) -> Result<(), ApiError> {
        if self.is_admin() || self.is_doctor() {
            Ok(())
        } else {
            Err(ApiError::forbidden("Staff access required"))
        }
    }
}

/// Middleware for org-scoped routes. Confirms the token was minted for the
/// resolved organization, loads the user row plus profile join from the
/// tenant database, and checks the stored role still matches the claims.
pub async fn load_org_user_middleware(
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?
        .clone();

    let org = request
        .extensions()
        .get::<OrgContext>()
        .ok_or_else(|| ApiError::internal_server_error("Organization context missing"))?
        .clone();

    let OrgPool(pool) = request
        .extensions()
        .get::<OrgPool>()
        .ok_or_else(|| ApiError::internal_server_error("Tenant pool missing"))?
        .clone();

    if auth_user.scope != TokenScope::Org || auth_user.org.as_deref() != Some(org.slug.as_str()) {
        tracing::warn!(
            "Token scope mismatch: token for {:?}, request for '{}'",
            auth_user.org,
            org.slug
        );
        return Err(ApiError::forbidden("Token is not valid for this organization"));
    }

    let user = UserService::new(pool)
        .find_by_id(auth_user.id)
        .await?
        .ok_or_else(|| ApiError::forbidden("User no longer exists in this organization"))?;

    let role = user
        .role()
        .ok_or_else(|| ApiError::forbidden("User has no role profile"))?;

    if role != auth_user.role {
        tracing::warn!(
            "Role mismatch for user {}: token says {}, profile says {}",
            user.id,
            auth_user.role,
            role
        );
        return Err(ApiError::forbidden("User role has changed, please log in again"));
    }

    request.extensions_mut().insert(CurrentUser { user, role });

    Ok(next.run(request).await)
}

/// Middleware for central routes: the token must be central-scoped and the
/// admin row must still exist in the registry database.
pub async fn require_central_admin_middleware(
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if auth_user.scope != TokenScope::Central {
        return Err(ApiError::forbidden("Central administrator access required"));
    }

    let pool = DatabaseManager::central_pool().await?;
    let exists: Option<(uuid::Uuid,)> = sqlx::query_as("SELECT id FROM admins WHERE id = $1")
        .bind(auth_user.id)
        .fetch_optional(&pool)
        .await?;

    if exists.is_none() {
        return Err(ApiError::forbidden("Administrator account no longer exists"));
    }

    Ok(next.run(request).await)
}
