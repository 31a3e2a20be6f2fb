use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

use crate::config::{self, Environment};

/// Credentials for one tenant database's restricted role
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbCredentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("No credentials stored for database: {0}")]
    NotFound(String),

    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),
}

/// Adapter over the secrets backend holding per-tenant database credentials.
/// Swappable so dev and tests can run without an external secrets service.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn database_credentials(&self, database: &str) -> Result<DbCredentials, SecretError>;

    async fn put_database_credentials(
        &self,
        database: &str,
        creds: &DbCredentials,
    ) -> Result<(), SecretError>;

    async fn delete_database_credentials(&self, database: &str) -> Result<(), SecretError>;
}

/// Production store: derives each tenant password deterministically from a
/// master secret (SECRETS_MASTER_KEY), so nothing needs to be written back.
pub struct EnvSecretStore;

impl EnvSecretStore {
    fn master_key(&self) -> Result<String, SecretError> {
        if let Ok(key) = std::env::var("SECRETS_MASTER_KEY") {
            return Ok(key);
        }
        // Development runs without an external secrets service
        if matches!(config::config().environment, Environment::Development) {
            return Ok("development-only-master-key".to_string());
        }
        Err(SecretError::ConfigMissing("SECRETS_MASTER_KEY"))
    }

    fn derive_password(&self, database: &str) -> Result<String, SecretError> {
        let key = self.master_key()?;
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        hasher.update(b":");
        hasher.update(database.as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        Ok(digest[..32].to_string())
    }
}

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn database_credentials(&self, database: &str) -> Result<DbCredentials, SecretError> {
        Ok(DbCredentials {
            username: format!("{}_app", database),
            password: self.derive_password(database)?,
        })
    }

    async fn put_database_credentials(
        &self,
        _database: &str,
        _creds: &DbCredentials,
    ) -> Result<(), SecretError> {
        // Derivation is deterministic; there is nothing to persist
        Ok(())
    }

    async fn delete_database_credentials(&self, _database: &str) -> Result<(), SecretError> {
        Ok(())
    }
}

/// In-memory store for tests and local experiments
#[derive(Default)]
pub struct MemorySecretStore {
    entries: RwLock<HashMap<String, DbCredentials>>,
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn database_credentials(&self, database: &str) -> Result<DbCredentials, SecretError> {
        self.entries
            .read()
            .expect("secret store lock poisoned")
            .get(database)
            .cloned()
            .ok_or_else(|| SecretError::NotFound(database.to_string()))
    }

    async fn put_database_credentials(
        &self,
        database: &str,
        creds: &DbCredentials,
    ) -> Result<(), SecretError> {
        self.entries
            .write()
            .expect("secret store lock poisoned")
            .insert(database.to_string(), creds.clone());
        Ok(())
    }

    async fn delete_database_credentials(&self, database: &str) -> Result<(), SecretError> {
        self.entries
            .write()
            .expect("secret store lock poisoned")
            .remove(database);
        Ok(())
    }
}

/// Process-wide secret store, selected by SECRETS_BACKEND ("memory" for the
/// in-memory store, anything else for the derived-key store)
pub fn secret_store() -> &'static dyn SecretStore {
    use std::sync::OnceLock;
    static STORE: OnceLock<Box<dyn SecretStore>> = OnceLock::new();
    STORE
        .get_or_init(|| match std::env::var("SECRETS_BACKEND").as_deref() {
            Ok("memory") => Box::new(MemorySecretStore::default()) as Box<dyn SecretStore>,
            _ => Box::new(EnvSecretStore),
        })
        .as_ref()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn env_store_is_deterministic_per_database() {
        let store = EnvSecretStore;
        let a1 = store.database_credentials("clinic_aaaa").await.unwrap();
        let a2 = store.database_credentials("clinic_aaaa").await.unwrap();
        let b = store.database_credentials("clinic_bbbb").await.unwrap();

        assert_eq!(a1.password, a2.password);
        assert_ne!(a1.password, b.password);
        assert_eq!(a1.username, "clinic_aaaa_app");
        assert_eq!(a1.password.len(), 32);
    }

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = MemorySecretStore::default();
        let creds = DbCredentials {
            username: "clinic_test_app".to_string(),
            password: "pw".to_string(),
        };

        assert!(store.database_credentials("clinic_test").await.is_err());

        store.put_database_credentials("clinic_test", &creds).await.unwrap();
        let loaded = store.database_credentials("clinic_test").await.unwrap();
        assert_eq!(loaded.username, creds.username);

        store.delete_database_credentials("clinic_test").await.unwrap();
        assert!(store.database_credentials("clinic_test").await.is_err());
    }
}
