use sqlx::migrate::Migrator;
use sqlx::PgPool;
use thiserror::Error;
use tracing::info;

use crate::database::manager::{DatabaseError, DatabaseManager};
use crate::services::secret_store::DbCredentials;

/// Schema migrations embedded at compile time
pub static CENTRAL_MIGRATOR: Migrator = sqlx::migrate!("migrations/central");
pub static TENANT_MIGRATOR: Migrator = sqlx::migrate!("migrations/tenant");

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("Database or role already exists for: {0}")]
    AlreadyExists(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Creates and destroys physical tenant databases plus their restricted
/// login roles, through the administrative connection.
pub struct Provisioner;

impl Provisioner {
    /// Provision a tenant database: restricted role, database, connect
    /// grants, schema migrations, and DML grants for the role.
    pub async fn provision(database: &str, creds: &DbCredentials) -> Result<(), ProvisionError> {
        Self::validate_names(database, &creds.username)?;

        let admin = DatabaseManager::admin_pool().await?;

        if Self::database_exists(&admin, database).await? || Self::role_exists(&admin, &creds.username).await? {
            return Err(ProvisionError::AlreadyExists(database.to_string()));
        }

        let role_ident = DatabaseManager::quote_identifier(&creds.username);
        let db_ident = DatabaseManager::quote_identifier(database);

        sqlx::query(&format!(
            "CREATE ROLE {} LOGIN PASSWORD {}",
            role_ident,
            quote_literal(&creds.password)
        ))
        .execute(&admin)
        .await?;

        sqlx::query(&format!("CREATE DATABASE {}", db_ident))
            .execute(&admin)
            .await?;

        // Only the tenant role (and the admin) may connect
        sqlx::query(&format!("REVOKE CONNECT ON DATABASE {} FROM PUBLIC", db_ident))
            .execute(&admin)
            .await?;
        sqlx::query(&format!("GRANT CONNECT ON DATABASE {} TO {}", db_ident, role_ident))
            .execute(&admin)
            .await?;

        // Schema setup runs over the admin connection, then DML rights are
        // handed to the restricted role
        let tenant = DatabaseManager::tenant_admin_pool(database).await?;
        TENANT_MIGRATOR.run(&tenant).await?;

        sqlx::query(&format!("GRANT USAGE ON SCHEMA public TO {}", role_ident))
            .execute(&tenant)
            .await?;
        sqlx::query(&format!(
            "GRANT SELECT, INSERT, UPDATE, DELETE ON ALL TABLES IN SCHEMA public TO {}",
            role_ident
        ))
        .execute(&tenant)
        .await?;

        info!("Provisioned tenant database {} for role {}", database, creds.username);
        Ok(())
    }

    /// Tear down a tenant database and its role. Active backends are
    /// terminated first so DROP DATABASE does not block.
    pub async fn destroy(database: &str, role: &str) -> Result<(), ProvisionError> {
        Self::validate_names(database, role)?;

        // Drop cached handles before the database goes away
        DatabaseManager::evict_pool(database).await;

        let admin = DatabaseManager::admin_pool().await?;

        sqlx::query(
            "SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
             WHERE datname = $1 AND pid <> pg_backend_pid()",
        )
        .bind(database)
        .execute(&admin)
        .await?;

        sqlx::query(&format!(
            "DROP DATABASE IF EXISTS {}",
            DatabaseManager::quote_identifier(database)
        ))
        .execute(&admin)
        .await?;

        sqlx::query(&format!(
            "DROP ROLE IF EXISTS {}",
            DatabaseManager::quote_identifier(role)
        ))
        .execute(&admin)
        .await?;

        info!("Destroyed tenant database {} and role {}", database, role);
        Ok(())
    }

    /// Apply central registry migrations (used by `clinica init`)
    pub async fn migrate_central(pool: &PgPool) -> Result<(), ProvisionError> {
        CENTRAL_MIGRATOR.run(pool).await?;
        Ok(())
    }

    async fn database_exists(admin: &PgPool, database: &str) -> Result<bool, ProvisionError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pg_database WHERE datname = $1")
            .bind(database)
            .fetch_one(admin)
            .await?;
        Ok(count.0 > 0)
    }

    async fn role_exists(admin: &PgPool, role: &str) -> Result<bool, ProvisionError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pg_roles WHERE rolname = $1")
            .bind(role)
            .fetch_one(admin)
            .await?;
        Ok(count.0 > 0)
    }

    fn validate_names(database: &str, role: &str) -> Result<(), ProvisionError> {
        if !DatabaseManager::is_valid_db_name(database)
            || database == DatabaseManager::CENTRAL_DB_NAME
            || database == "postgres"
        {
            return Err(DatabaseError::InvalidDatabaseName(database.to_string()).into());
        }
        if role.is_empty()
            || !role
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(DatabaseError::InvalidDatabaseName(role.to_string()).into());
        }
        Ok(())
    }
}

/// Quote a string literal for DDL that cannot take bind parameters
fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_quoting_escapes_single_quotes() {
        assert_eq!(quote_literal("plain"), "'plain'");
        assert_eq!(quote_literal("o'brien"), "'o''brien'");
    }

    #[test]
    fn rejects_reserved_and_malformed_names() {
        assert!(Provisioner::validate_names("clinic_abc123", "clinic_abc123_app").is_ok());
        // never provision over the registry or the maintenance database
        assert!(Provisioner::validate_names("clinica_main", "x_app").is_err());
        assert!(Provisioner::validate_names("postgres", "x_app").is_err());
        assert!(Provisioner::validate_names("clinic_abc123", "bad-role").is_err());
        assert!(Provisioner::validate_names("clinic_abc123", "").is_err());
    }
}
