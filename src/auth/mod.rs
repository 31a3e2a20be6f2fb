use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config;
use crate::database::models::user::UserRole;

/// Which registry a token was minted against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenScope {
    /// Central registry (cross-tenant admins)
    Central,
    /// A single organization's database
    Org,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenUse {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub scope: TokenScope,
    /// Organization slug, present only for org-scoped tokens
    pub org: Option<String>,
    pub role: UserRole,
    pub token_use: TokenUse,
    /// Unique per token so rotated refresh tokens hash differently
    pub jti: Uuid,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn access(sub: Uuid, email: String, scope: TokenScope, org: Option<String>, role: UserRole) -> Self {
        let now = Utc::now();
        let expiry_hours = config::config().security.jwt_expiry_hours;
        Self {
            sub,
            email,
            scope,
            org,
            role,
            token_use: TokenUse::Access,
            jti: Uuid::new_v4(),
            exp: (now + Duration::hours(expiry_hours as i64)).timestamp(),
            iat: now.timestamp(),
        }
    }

    pub fn refresh(sub: Uuid, email: String, scope: TokenScope, org: Option<String>, role: UserRole) -> Self {
        let now = Utc::now();
        let expiry_days = config::config().security.refresh_expiry_days;
        Self {
            sub,
            email,
            scope,
            org,
            role,
            token_use: TokenUse::Refresh,
            jti: Uuid::new_v4(),
            exp: (now + Duration::days(expiry_days as i64)).timestamp(),
            iat: now.timestamp(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid token: {0}")]
    InvalidToken(String),
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("JWT secret not configured")]
    MissingSecret,
    #[error("Password hash error: {0}")]
    Hash(String),
}

/// Access + refresh token pair returned by login and refresh endpoints
#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

/// Issue a fresh access/refresh pair. Returns the pair plus the SHA-256 hash
/// of the refresh token, which the caller persists on the user row.
pub fn issue_token_pair(
    sub: Uuid,
    email: &str,
    scope: TokenScope,
    org: Option<String>,
    role: UserRole,
) -> Result<(TokenPair, String), AuthError> {
    let access = Claims::access(sub, email.to_string(), scope, org.clone(), role);
    let refresh = Claims::refresh(sub, email.to_string(), scope, org, role);

    let expires_in = access.exp - access.iat;
    let access_token = generate_jwt(&access)?;
    let refresh_token = generate_jwt(&refresh)?;
    let refresh_hash = hash_refresh_token(&refresh_token);

    Ok((
        TokenPair {
            access_token,
            refresh_token,
            expires_in,
        },
        refresh_hash,
    ))
}

pub fn generate_jwt(claims: &Claims) -> Result<String, AuthError> {
    let secret = jwt_secret()?;
    let encoding_key = EncodingKey::from_secret(secret.as_bytes());

    encode(&Header::default(), claims, &encoding_key)
        .map_err(|e| AuthError::InvalidToken(e.to_string()))
}

pub fn validate_jwt(token: &str) -> Result<Claims, AuthError> {
    let secret = jwt_secret()?;
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    let validation = Validation::default();

    let token_data = decode::<Claims>(token, &decoding_key, &validation)
        .map_err(|e| AuthError::InvalidToken(format!("Invalid JWT token: {}", e)))?;

    Ok(token_data.claims)
}

fn jwt_secret() -> Result<&'static str, AuthError> {
    let secret = &config::config().security.jwt_secret;
    if secret.is_empty() {
        return Err(AuthError::MissingSecret);
    }
    Ok(secret)
}

/// SHA-256 hex digest of a refresh token, for at-rest storage and comparison
pub fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|e| AuthError::Hash(e.to_string()))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_token_roundtrip() {
        let sub = Uuid::new_v4();
        let claims = Claims::access(
            sub,
            "doc@example.com".to_string(),
            TokenScope::Org,
            Some("riverside".to_string()),
            UserRole::Doctor,
        );
        let token = generate_jwt(&claims).unwrap();
        let decoded = validate_jwt(&token).unwrap();

        assert_eq!(decoded.sub, sub);
        assert_eq!(decoded.scope, TokenScope::Org);
        assert_eq!(decoded.org.as_deref(), Some("riverside"));
        assert_eq!(decoded.role, UserRole::Doctor);
        assert_eq!(decoded.token_use, TokenUse::Access);
    }

    #[test]
    fn expired_token_is_rejected() {
        let mut claims = Claims::access(
            Uuid::new_v4(),
            "old@example.com".to_string(),
            TokenScope::Central,
            None,
            UserRole::Admin,
        );
        claims.exp = (Utc::now() - Duration::hours(2)).timestamp();

        let token = generate_jwt(&claims).unwrap();
        assert!(validate_jwt(&token).is_err());
    }

    #[test]
    fn tampered_token_is_rejected() {
        let claims = Claims::access(
            Uuid::new_v4(),
            "a@example.com".to_string(),
            TokenScope::Central,
            None,
            UserRole::Admin,
        );
        let mut token = generate_jwt(&claims).unwrap();
        token.push('x');
        assert!(validate_jwt(&token).is_err());
    }

    #[test]
    fn refresh_tokens_rotate_to_distinct_hashes() {
        let sub = Uuid::new_v4();
        let (pair_a, hash_a) =
            issue_token_pair(sub, "p@example.com", TokenScope::Org, Some("acme".into()), UserRole::Patient)
                .unwrap();
        let (pair_b, hash_b) =
            issue_token_pair(sub, "p@example.com", TokenScope::Org, Some("acme".into()), UserRole::Patient)
                .unwrap();

        // jti differs between issues, so tokens and stored hashes differ
        assert_ne!(pair_a.refresh_token, pair_b.refresh_token);
        assert_ne!(hash_a, hash_b);
        assert_eq!(hash_a, hash_refresh_token(&pair_a.refresh_token));
    }

    #[test]
    fn password_hash_and_verify() {
        let hash = hash_password("correct horse battery staple").unwrap();
        assert!(verify_password("correct horse battery staple", &hash).unwrap());
        assert!(!verify_password("wrong password", &hash).unwrap());
    }
}
