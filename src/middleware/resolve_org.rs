use axum::{extract::Request, middleware::Next, response::Response};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::ApiError;
use crate::services::OrgService;

/// Tenant database pool for the resolved organization, injected per request
#[derive(Clone)]
pub struct OrgPool(pub PgPool);

/// Organization resolved from the URL, confirmed against the central registry
#[derive(Clone, Debug)]
pub struct OrgContext {
    pub id: Uuid,
    pub slug: String,
    pub database: String,
}

/// Tenant resolution middleware. Takes the first URL path segment as the
/// organization slug, confirms it exists in the central registry, and
/// attaches the tenant's pooled database handle to the request.
pub async fn resolve_org_middleware(
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let slug = first_path_segment(request.uri().path())
        .ok_or_else(|| ApiError::not_found("Organization not found"))?
        .to_string();

    let org_service = OrgService::new().await.map_err(|e| {
        tracing::error!("Central registry unavailable: {}", e);
        ApiError::service_unavailable("Registry temporarily unavailable")
    })?;

    let org = org_service
        .get_organization(&slug)
        .await
        .map_err(|e| {
            tracing::error!("Failed to look up organization '{}': {}", slug, e);
            ApiError::service_unavailable("Registry temporarily unavailable")
        })?
        .ok_or_else(|| ApiError::not_found(format!("Organization '{}' not found", slug)))?;

    let pool = OrgService::org_pool(&org).await.map_err(|e| {
        tracing::error!("Failed to get database pool for '{}': {}", slug, e);
        ApiError::from(e)
    })?;

    tracing::debug!("Resolved organization '{}' to database {}", slug, org.database);

    request.extensions_mut().insert(OrgContext {
        id: org.id,
        slug: org.name,
        database: org.database,
    });
    request.extensions_mut().insert(OrgPool(pool));

    Ok(next.run(request).await)
}

fn first_path_segment(path: &str) -> Option<&str> {
    path.strip_prefix('/')
        .unwrap_or(path)
        .split('/')
        .next()
        .filter(|segment| !segment.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_first_segment() {
        assert_eq!(first_path_segment("/riverside/appointments"), Some("riverside"));
        assert_eq!(first_path_segment("/riverside"), Some("riverside"));
        assert_eq!(first_path_segment("/"), None);
        assert_eq!(first_path_segment(""), None);
        assert_eq!(first_path_segment("//auth"), None);
    }
}
