use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::PgPool;
use tracing::{info, warn};

use super::{generate_jwt, AuthError, Claims};
use crate::config::SecurityConfig;
use crate::database::models::User;
use crate::types::Role;

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_in: u64,
    /// Set for users provisioned by an administrator until they pick their own password
    pub must_change_password: bool,
    pub user: User,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub email: Option<String>,
    pub role: Role,
}

pub(super) async fn audit(pool: &PgPool, user_id: Option<i64>, username: &str, action: &str, details: Value, ip: Option<&str>) {
    let result = sqlx::query(
        "INSERT INTO audit_log (user_id, username, action, details, ip_address) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(user_id)
    .bind(username)
    .bind(action)
    .bind(details)
    .bind(ip)
    .execute(pool)
    .await;

    if let Err(e) = result {
        warn!(error = %e, action, username, "Could not write audit log");
    }
}

pub(super) async fn verify_password(password: String, hash: String) -> Result<bool, AuthError> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AuthError::Task(e.to_string()))?
        .map_err(AuthError::from)
}

/// Reject passwords too short to keep
pub(super) fn check_password_strength(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::InvalidUser(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

pub(super) async fn hash_password(password: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, bcrypt::DEFAULT_COST))
        .await
        .map_err(|e| AuthError::Task(e.to_string()))?
        .map_err(AuthError::from)
}

/// Check credentials of an active user and issue a token.
///
/// Unknown users and wrong passwords produce the same error; the audit log
/// records which one it was.
pub async fn login(
    pool: &PgPool,
    security: &SecurityConfig,
    username: &str,
    password: &str,
    ip: Option<&str>,
) -> Result<LoginResponse, AuthError> {
    let username = username.trim().to_lowercase();
    if username.is_empty() || password.is_empty() {
        return Err(AuthError::InvalidCredentials);
    }

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE username = $1 AND active = TRUE")
        .bind(&username)
        .fetch_optional(pool)
        .await?;

    let Some(user) = user else {
        audit(pool, None, &username, "LOGIN_FAILED", json!({ "reason": "user_not_found" }), ip).await;
        warn!(%username, "Login failed: unknown or inactive user");
        return Err(AuthError::InvalidCredentials);
    };

    if !verify_password(password.to_string(), user.password_hash.clone()).await? {
        audit(pool, Some(user.id), &username, "LOGIN_FAILED", json!({ "reason": "wrong_password" }), ip).await;
        warn!(%username, "Login failed: wrong password");
        return Err(AuthError::InvalidCredentials);
    }

    let token = generate_jwt(security, &Claims::new(&user, security.jwt_expiry_hours))?;

    let user: User = sqlx::query_as("UPDATE users SET last_login_at = NOW() WHERE id = $1 RETURNING *")
        .bind(user.id)
        .fetch_one(pool)
        .await?;
    audit(pool, Some(user.id), &username, "LOGIN_SUCCESS", json!({ "role": user.role }), ip).await;
    info!(%username, role = %user.role, "Login succeeded");

    Ok(LoginResponse {
        token,
        expires_in: security.jwt_expiry_hours * 3600,
        must_change_password: user.must_change_password,
        user,
    })
}

/// Provision a user with a bcrypt password hash
pub async fn create_user(pool: &PgPool, new_user: NewUser) -> Result<User, AuthError> {
    let username = new_user.username.trim().to_lowercase();
    if username.is_empty() {
        return Err(AuthError::InvalidUser("username is required".to_string()));
    }
    check_password_strength(&new_user.password)?;
    let hash = hash_password(new_user.password).await?;

    let created: Option<User> = sqlx::query_as(
        "INSERT INTO users (username, password_hash, first_name, last_name, email, role, must_change_password)
         VALUES ($1, $2, $3, $4, $5, $6, TRUE)
         ON CONFLICT (username) DO NOTHING
         RETURNING *",
    )
    .bind(&username)
    .bind(&hash)
    .bind(new_user.first_name.trim())
    .bind(new_user.last_name.trim())
    .bind(new_user.email.as_deref().map(str::trim).filter(|e| !e.is_empty()))
    .bind(new_user.role.as_str())
    .fetch_optional(pool)
    .await?;

    let user = created.ok_or_else(|| AuthError::UserExists(username.clone()))?;
    info!(%username, role = %user.role, "User created");
    Ok(user)
}
