pub mod login;
pub mod users;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::SecurityConfig;
use crate::database::models::User;

pub use login::{create_user, login, LoginResponse, NewUser, MIN_PASSWORD_LEN};
pub use users::{change_password, delete_user, list_users, set_active, Actor, PasswordChange};

pub const TOKEN_ISSUER: &str = "protocol-registry";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub username: String,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
    pub iss: String,
}

impl Claims {
    pub fn new(user: &User, expiry_hours: u64) -> Self {
        let now = Utc::now();
        let exp = (now + Duration::hours(expiry_hours as i64)).timestamp();

        Self {
            sub: user.id,
            username: user.username.clone(),
            role: user.role.clone(),
            exp,
            iat: now.timestamp(),
            iss: TOKEN_ISSUER.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("JWT secret not configured")]
    MissingSecret,

    #[error("JWT generation error: {0}")]
    TokenGeneration(String),

    #[error("user '{0}' already exists")]
    UserExists(String),

    #[error("invalid user: {0}")]
    InvalidUser(String),

    #[error("user {0} not found")]
    UserNotFound(i64),

    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("background task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub fn generate_jwt(security: &SecurityConfig, claims: &Claims) -> Result<String, AuthError> {
    if security.jwt_secret.is_empty() {
        return Err(AuthError::MissingSecret);
    }

    let encoding_key = EncodingKey::from_secret(security.jwt_secret.as_bytes());
    encode(&Header::default(), claims, &encoding_key).map_err(|e| AuthError::TokenGeneration(e.to_string()))
}

/// Verify signature, expiry and issuer
pub fn validate_jwt(security: &SecurityConfig, token: &str) -> Result<Claims, AuthError> {
    if security.jwt_secret.is_empty() {
        return Err(AuthError::MissingSecret);
    }

    let decoding_key = DecodingKey::from_secret(security.jwt_secret.as_bytes());
    let mut validation = Validation::default();
    validation.set_issuer(&[TOKEN_ISSUER]);

    decode::<Claims>(token, &decoding_key, &validation)
        .map(|data| data.claims)
        .map_err(|e| AuthError::InvalidToken(e.to_string()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn security() -> SecurityConfig {
        SecurityConfig {
            enable_cors: true,
            cors_origins: vec![],
            jwt_secret: "test-secret".to_string(),
            jwt_expiry_hours: 1,
        }
    }

    pub(crate) fn user(role: &str) -> User {
        User {
            id: 7,
            username: "mrossi".to_string(),
            password_hash: String::new(),
            first_name: "Mario".to_string(),
            last_name: "Rossi".to_string(),
            email: None,
            role: role.to_string(),
            active: true,
            must_change_password: false,
            last_login_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn round_trips_claims() {
        let security = security();
        let token = generate_jwt(&security, &Claims::new(&user("admin"), 1)).unwrap();
        let claims = validate_jwt(&security, &token).unwrap();
        assert_eq!(claims.sub, 7);
        assert_eq!(claims.username, "mrossi");
        assert_eq!(claims.role, "admin");
        assert_eq!(claims.iss, TOKEN_ISSUER);
    }

    #[test]
    fn rejects_tokens_signed_with_another_secret() {
        let token = generate_jwt(&security(), &Claims::new(&user("operator"), 1)).unwrap();
        let mut other = security();
        other.jwt_secret = "other".to_string();
        assert!(matches!(validate_jwt(&other, &token), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn rejects_expired_tokens() {
        let mut claims = Claims::new(&user("operator"), 1);
        claims.exp = Utc::now().timestamp() - 3600;
        let token = generate_jwt(&security(), &claims).unwrap();
        assert!(matches!(validate_jwt(&security(), &token), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn empty_secret_is_refused() {
        let mut security = security();
        security.jwt_secret.clear();
        assert!(matches!(
            generate_jwt(&security, &Claims::new(&user("admin"), 1)),
            Err(AuthError::MissingSecret)
        ));
    }
}
