use sha2::{Digest, Sha256};
use sqlx::PgPool;
use tracing::{error, info};
use uuid::Uuid;

use crate::auth::{self, AuthError};
use crate::database::manager::{DatabaseError, DatabaseManager};
use crate::database::models::Organization;
use crate::database::provisioner::{ProvisionError, Provisioner};
use crate::services::secret_store::{secret_store, DbCredentials, SecretError};

/// URL prefixes that can never be organization slugs
const RESERVED_SLUGS: &[&str] = &["central", "health", "api"];

#[derive(Debug, thiserror::Error)]
pub enum OrgError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Database manager error: {0}")]
    Manager(#[from] DatabaseError),
    #[error("Provisioning error: {0}")]
    Provision(#[from] ProvisionError),
    #[error("Secret store error: {0}")]
    Secret(#[from] SecretError),
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),
    #[error("Organization already exists: {0}")]
    AlreadyExists(String),
    #[error("Invalid organization name: {0}")]
    InvalidName(String),
    #[error("Organization not found: {0}")]
    NotFound(String),
}

/// Registry operations plus tenant provisioning orchestration
pub struct OrgService {
    central_pool: PgPool,
}

impl OrgService {
    pub async fn new() -> Result<Self, OrgError> {
        let central_pool = DatabaseManager::central_pool().await?;
        Ok(Self { central_pool })
    }

    /// Create an organization: registry row, physical database with a
    /// restricted role, and a seeded organization admin account.
    pub async fn create_organization(
        &self,
        name: &str,
        admin_email: &str,
        admin_password: &str,
    ) -> Result<Organization, OrgError> {
        Self::validate_org_name(name)?;

        if self.organization_exists(name).await? {
            return Err(OrgError::AlreadyExists(name.to_string()));
        }

        let database = Self::database_name_for(name);
        let creds = self.ensure_credentials(&database).await?;

        Provisioner::provision(&database, &creds).await?;

        // Registry row and admin seeding come after the physical database;
        // roll the database back if either fails so retries start clean.
        let org = match self.register_and_seed(name, &database, admin_email, admin_password).await {
            Ok(org) => org,
            Err(e) => {
                error!("Organization setup for '{}' failed after provisioning: {}", name, e);
                if let Err(cleanup) = Provisioner::destroy(&database, &creds.username).await {
                    error!("Rollback of tenant database {} failed: {}", database, cleanup);
                }
                let _ = secret_store().delete_database_credentials(&database).await;
                return Err(e);
            }
        };

        // Setup ran over the admin connection; drop that cached pool so org
        // traffic reconnects with the restricted role
        DatabaseManager::evict_pool(&database).await;

        info!("Created organization '{}' with database {}", name, database);
        Ok(org)
    }

    async fn register_and_seed(
        &self,
        name: &str,
        database: &str,
        admin_email: &str,
        admin_password: &str,
    ) -> Result<Organization, OrgError> {
        let org: Organization = sqlx::query_as(
            r#"
            INSERT INTO organizations (id, name, database)
            VALUES ($1, $2, $3)
            RETURNING id, name, database, created_at, updated_at, deleted_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(database)
        .fetch_one(&self.central_pool)
        .await?;

        let password_hash = auth::hash_password(admin_password)?;
        let tenant = DatabaseManager::tenant_admin_pool(database).await?;
        let mut tx = tenant.begin().await?;

        let profile_id = Uuid::new_v4();
        sqlx::query("INSERT INTO admin_profiles (id) VALUES ($1)")
            .bind(profile_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, first_name, last_name, admin_profile_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(admin_email)
        .bind(&password_hash)
        .bind("Organization")
        .bind("Admin")
        .bind(profile_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(org)
    }

    /// Destroy an organization: tenant database, restricted role, stored
    /// credentials, and (soft) registry row.
    pub async fn delete_organization(&self, id: Uuid) -> Result<Organization, OrgError> {
        let org = self
            .get_organization_by_id(id)
            .await?
            .ok_or_else(|| OrgError::NotFound(id.to_string()))?;

        let role = match secret_store().database_credentials(&org.database).await {
            Ok(creds) => creds.username,
            // Credentials may already be gone on a retried delete
            Err(SecretError::NotFound(_)) => format!("{}_app", org.database),
            Err(e) => return Err(e.into()),
        };

        Provisioner::destroy(&org.database, &role).await?;
        secret_store().delete_database_credentials(&org.database).await?;

        sqlx::query("UPDATE organizations SET deleted_at = NOW(), updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.central_pool)
            .await?;

        info!("Destroyed organization '{}' and database {}", org.name, org.database);
        Ok(org)
    }

    pub async fn get_organization(&self, name: &str) -> Result<Option<Organization>, OrgError> {
        let row = sqlx::query_as::<_, Organization>(
            r#"
            SELECT id, name, database, created_at, updated_at, deleted_at
            FROM organizations
            WHERE name = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(name)
        .fetch_optional(&self.central_pool)
        .await?;

        Ok(row)
    }

    pub async fn get_organization_by_id(&self, id: Uuid) -> Result<Option<Organization>, OrgError> {
        let row = sqlx::query_as::<_, Organization>(
            r#"
            SELECT id, name, database, created_at, updated_at, deleted_at
            FROM organizations
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .fetch_optional(&self.central_pool)
        .await?;

        Ok(row)
    }

    pub async fn list_organizations(&self) -> Result<Vec<Organization>, OrgError> {
        let rows = sqlx::query_as::<_, Organization>(
            r#"
            SELECT id, name, database, created_at, updated_at, deleted_at
            FROM organizations
            WHERE deleted_at IS NULL
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.central_pool)
        .await?;

        Ok(rows)
    }

    /// Connection pool for an organization's database, using its restricted
    /// credentials from the secret store
    pub async fn org_pool(org: &Organization) -> Result<PgPool, OrgError> {
        let creds = secret_store().database_credentials(&org.database).await?;
        let pool = DatabaseManager::tenant_pool(&org.database, &creds).await?;
        Ok(pool)
    }

    async fn organization_exists(&self, name: &str) -> Result<bool, OrgError> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM organizations WHERE name = $1 AND deleted_at IS NULL",
        )
        .bind(name)
        .fetch_one(&self.central_pool)
        .await?;

        Ok(count.0 > 0)
    }

    /// Look up or mint the tenant's restricted credentials. With the derived
    /// backend the lookup always succeeds; the in-memory backend gets a
    /// generated password on first use.
    async fn ensure_credentials(&self, database: &str) -> Result<DbCredentials, OrgError> {
        match secret_store().database_credentials(database).await {
            Ok(creds) => Ok(creds),
            Err(SecretError::NotFound(_)) => {
                let creds = DbCredentials {
                    username: format!("{}_app", database),
                    password: Uuid::new_v4().simple().to_string(),
                };
                secret_store().put_database_credentials(database, &creds).await?;
                Ok(creds)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Hash an organization name to a stable database name
    pub fn database_name_for(name: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(name.as_bytes());
        let hash = format!("{:x}", hasher.finalize());

        // First 16 hex chars keeps database names a reasonable length
        format!("clinic_{}", &hash[..16])
    }

    /// Organization names double as URL slugs, so the rules are strict
    pub fn validate_org_name(name: &str) -> Result<(), OrgError> {
        if name.len() < 2 {
            return Err(OrgError::InvalidName(
                "Organization name must be at least 2 characters".to_string(),
            ));
        }

        if name.len() > 64 {
            return Err(OrgError::InvalidName(
                "Organization name must be at most 64 characters".to_string(),
            ));
        }

        if !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
        {
            return Err(OrgError::InvalidName(
                "Organization name can only contain lowercase letters, numbers, hyphens, and underscores"
                    .to_string(),
            ));
        }

        if RESERVED_SLUGS.contains(&name) {
            return Err(OrgError::InvalidName(format!(
                "'{}' is a reserved path and cannot be used as an organization name",
                name
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_names_are_stable_and_valid() {
        let a = OrgService::database_name_for("riverside");
        let b = OrgService::database_name_for("riverside");
        let c = OrgService::database_name_for("hilltop");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("clinic_"));
        assert_eq!(a.len(), "clinic_".len() + 16);
        assert!(DatabaseManager::is_valid_db_name(&a));
    }

    #[test]
    fn org_name_rules() {
        assert!(OrgService::validate_org_name("riverside").is_ok());
        assert!(OrgService::validate_org_name("clinic-12_a").is_ok());
        assert!(OrgService::validate_org_name("x").is_err());
        assert!(OrgService::validate_org_name("Riverside").is_err());
        assert!(OrgService::validate_org_name("river side").is_err());
        assert!(OrgService::validate_org_name("central").is_err());
        assert!(OrgService::validate_org_name("health").is_err());
        assert!(OrgService::validate_org_name(&"a".repeat(65)).is_err());
    }
}
