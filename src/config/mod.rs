use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub security: SecurityConfig,
    pub smtp: SmtpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
    /// Cached tenant pools older than this are closed and rebuilt on next use
    pub pool_ttl_secs: u64,
    pub connect_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub enable_rate_limiting: bool,
    pub rate_limit_requests: u32,
    pub rate_limit_window_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
    pub refresh_expiry_days: u64,
    pub cors_origins: Vec<String>,
}

/// SMTP settings for the notification mailer. Sending is disabled when
/// `host` or `from` is unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: Option<String>,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: Option<String>,
    pub starttls: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Database overrides
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECT_TIMEOUT_SECS") {
            self.database.connect_timeout_secs = v.parse().unwrap_or(self.database.connect_timeout_secs);
        }
        if let Ok(v) = env::var("DATABASE_POOL_TTL_SECS") {
            self.database.pool_ttl_secs = v.parse().unwrap_or(self.database.pool_ttl_secs);
        }
        if let Ok(v) = env::var("DATABASE_CONNECT_RETRIES") {
            self.database.connect_retries = v.parse().unwrap_or(self.database.connect_retries);
        }

        // API overrides
        if let Ok(v) = env::var("API_ENABLE_RATE_LIMITING") {
            self.api.enable_rate_limiting = v.parse().unwrap_or(self.api.enable_rate_limiting);
        }
        if let Ok(v) = env::var("API_RATE_LIMIT_REQUESTS") {
            self.api.rate_limit_requests = v.parse().unwrap_or(self.api.rate_limit_requests);
        }
        if let Ok(v) = env::var("API_RATE_LIMIT_WINDOW_SECS") {
            self.api.rate_limit_window_secs = v.parse().unwrap_or(self.api.rate_limit_window_secs);
        }

        // Security overrides
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }
        if let Ok(v) = env::var("SECURITY_REFRESH_EXPIRY_DAYS") {
            self.security.refresh_expiry_days = v.parse().unwrap_or(self.security.refresh_expiry_days);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }

        // SMTP overrides
        if let Ok(v) = env::var("SMTP_HOST") {
            self.smtp.host = Some(v);
        }
        if let Ok(v) = env::var("SMTP_PORT") {
            self.smtp.port = v.parse().unwrap_or(self.smtp.port);
        }
        if let Ok(v) = env::var("SMTP_USERNAME") {
            self.smtp.username = Some(v);
        }
        if let Ok(v) = env::var("SMTP_PASSWORD") {
            self.smtp.password = Some(v);
        }
        if let Ok(v) = env::var("SMTP_FROM") {
            self.smtp.from = Some(v);
        }
        if let Ok(v) = env::var("SMTP_STARTTLS") {
            self.smtp.starttls = v.parse().unwrap_or(self.smtp.starttls);
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            database: DatabaseConfig {
                max_connections: 10,
                connect_timeout_secs: 30,
                pool_ttl_secs: 300,
                connect_retries: 3,
            },
            api: ApiConfig {
                enable_rate_limiting: false,
                rate_limit_requests: 1000,
                rate_limit_window_secs: 60,
            },
            security: SecurityConfig {
                jwt_secret: "development-only-secret-change-me".to_string(),
                jwt_expiry_hours: 24 * 7, // 1 week
                refresh_expiry_days: 30,
                cors_origins: vec![
                    "http://localhost:3000".to_string(),
                    "http://localhost:5173".to_string(),
                ],
            },
            smtp: SmtpConfig {
                host: None,
                port: 587,
                username: None,
                password: None,
                from: None,
                starttls: true,
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            database: DatabaseConfig {
                max_connections: 20,
                connect_timeout_secs: 10,
                pool_ttl_secs: 300,
                connect_retries: 3,
            },
            api: ApiConfig {
                enable_rate_limiting: true,
                rate_limit_requests: 100,
                rate_limit_window_secs: 60,
            },
            security: SecurityConfig {
                jwt_secret: String::new(), // must come from JWT_SECRET
                jwt_expiry_hours: 24,
                refresh_expiry_days: 14,
                cors_origins: vec!["https://staging.example.com".to_string()],
            },
            smtp: SmtpConfig {
                host: None,
                port: 587,
                username: None,
                password: None,
                from: None,
                starttls: true,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            database: DatabaseConfig {
                max_connections: 50,
                connect_timeout_secs: 5,
                pool_ttl_secs: 600,
                connect_retries: 5,
            },
            api: ApiConfig {
                enable_rate_limiting: true,
                rate_limit_requests: 60,
                rate_limit_window_secs: 60,
            },
            security: SecurityConfig {
                jwt_secret: String::new(), // must come from JWT_SECRET
                jwt_expiry_hours: 4,
                refresh_expiry_days: 7,
                cors_origins: vec!["https://app.example.com".to_string()],
            },
            smtp: SmtpConfig {
                host: None,
                port: 587,
                username: None,
                password: None,
                from: None,
                starttls: true,
            },
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_development_config() {
        let config = AppConfig::development();
        assert!(!config.api.enable_rate_limiting);
        assert_eq!(config.database.pool_ttl_secs, 300);
        assert!(!config.security.jwt_secret.is_empty());
    }

    #[test]
    fn test_default_production_config() {
        let config = AppConfig::production();
        assert!(config.api.enable_rate_limiting);
        assert_eq!(config.security.jwt_expiry_hours, 4);
        // production never ships a baked-in secret
        assert!(config.security.jwt_secret.is_empty());
    }

    #[test]
    fn test_smtp_disabled_by_default() {
        let config = AppConfig::development();
        assert!(config.smtp.host.is_none());
        assert!(config.smtp.from.is_none());
    }
}
