// User administration - password changes, listing, activation, removal
//
// Removed users are anonymized rather than deleted so audit_log rows keep a
// valid user_id.

use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use tracing::info;

use super::login::{audit, check_password_strength, hash_password, verify_password};
use super::AuthError;
use crate::database::models::User;

#[derive(Debug, Clone, Deserialize)]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
}

/// Who is acting on another account
#[derive(Debug, Clone, Copy)]
pub struct Actor<'a> {
    pub user_id: i64,
    pub username: &'a str,
}

/// Replace the password of an active user and clear `must_change_password`
pub async fn change_password(
    pool: &PgPool,
    user_id: i64,
    change: PasswordChange,
    ip: Option<&str>,
) -> Result<(), AuthError> {
    let user: User = sqlx::query_as("SELECT * FROM users WHERE id = $1 AND active = TRUE")
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AuthError::UserNotFound(user_id))?;

    if !verify_password(change.current_password, user.password_hash.clone()).await? {
        audit(pool, Some(user.id), &user.username, "CHANGE_PASSWORD_FAILED", json!({ "reason": "wrong_password" }), ip).await;
        return Err(AuthError::InvalidCredentials);
    }
    check_password_strength(&change.new_password)?;
    let hash = hash_password(change.new_password).await?;

    sqlx::query("UPDATE users SET password_hash = $1, must_change_password = FALSE WHERE id = $2")
        .bind(&hash)
        .bind(user.id)
        .execute(pool)
        .await?;
    audit(pool, Some(user.id), &user.username, "CHANGE_PASSWORD", json!({}), ip).await;
    info!(username = %user.username, "Password changed");
    Ok(())
}

pub async fn list_users(pool: &PgPool) -> Result<Vec<User>, AuthError> {
    Ok(sqlx::query_as("SELECT * FROM users ORDER BY active DESC, username")
        .fetch_all(pool)
        .await?)
}

/// Enable or disable an account. Administrators cannot disable themselves.
pub async fn set_active(pool: &PgPool, actor: Actor<'_>, user_id: i64, active: bool) -> Result<User, AuthError> {
    if actor.user_id == user_id {
        return Err(AuthError::InvalidUser("cannot change the state of your own account".to_string()));
    }

    let user: User = sqlx::query_as("UPDATE users SET active = $1 WHERE id = $2 RETURNING *")
        .bind(active)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AuthError::UserNotFound(user_id))?;

    let action = if active { "USER_ENABLED" } else { "USER_DISABLED" };
    audit(pool, Some(user.id), &user.username, action, json!({ "by": actor.username }), None).await;
    info!(username = %user.username, active, by = actor.username, "User state changed");
    Ok(user)
}

/// Anonymize and disable an account
pub async fn delete_user(pool: &PgPool, actor: Actor<'_>, user_id: i64) -> Result<(), AuthError> {
    if actor.user_id == user_id {
        return Err(AuthError::InvalidUser("cannot delete your own account".to_string()));
    }

    let mut tx = pool.begin().await?;
    let username: String = sqlx::query_scalar("SELECT username FROM users WHERE id = $1 FOR UPDATE")
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AuthError::UserNotFound(user_id))?;

    let placeholder = anonymized_username(user_id);
    sqlx::query(
        "UPDATE users
         SET username = $1, email = NULL, first_name = 'deleted', last_name = 'deleted',
             active = FALSE, password_hash = 'DELETED', must_change_password = FALSE
         WHERE id = $2",
    )
    .bind(&placeholder)
    .bind(user_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query("INSERT INTO audit_log (user_id, username, action, details) VALUES ($1, $2, 'USER_DELETED', $3)")
        .bind(user_id)
        .bind(&username)
        .bind(json!({ "by": actor.username, "anonymized": true }))
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!(%username, by = actor.username, "User deleted");
    Ok(())
}

/// `deleted_{id}_{unix time}`
fn anonymized_username(user_id: i64) -> String {
    format!("deleted_{}_{}", user_id, Utc::now().timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymized_names_carry_the_id() {
        let name = anonymized_username(42);
        assert!(name.starts_with("deleted_42_"));
        assert_ne!(anonymized_username(42), anonymized_username(43));
    }

    #[test]
    fn password_change_deserializes() {
        let change: PasswordChange =
            serde_json::from_str(r#"{"current_password": "old-secret", "new_password": "new-secret"}"#).unwrap();
        assert_eq!(change.current_password, "old-secret");
        assert_eq!(change.new_password, "new-secret");
    }
}
