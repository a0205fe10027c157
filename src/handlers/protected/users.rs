// handlers/protected/users.rs - own password and user administration

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::{self, Actor, PasswordChange};
use crate::database::models::User;
use crate::middleware::{client_ip, ApiResponse, ApiResult, AuthUser};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ActiveState {
    pub active: bool,
}

fn actor(user: &AuthUser) -> Actor<'_> {
    Actor {
        user_id: user.user_id,
        username: &user.username,
    }
}

/// POST /auth/change-password - for the authenticated user
pub async fn change_password_post(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    Json(change): Json<PasswordChange>,
) -> ApiResult<Value> {
    let ip = client_ip(&headers);
    auth::change_password(&state.pool, user.user_id, change, ip.as_deref()).await?;
    Ok(ApiResponse::success(json!({ "message": "Password changed" })))
}

/// GET /api/users - administrators only
pub async fn users_list(State(state): State<AppState>, Extension(user): Extension<AuthUser>) -> ApiResult<Vec<User>> {
    user.require_admin()?;
    Ok(ApiResponse::success(auth::list_users(&state.pool).await?))
}

/// PATCH /api/users/:id/active - administrators only
pub async fn user_set_active(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(body): Json<ActiveState>,
) -> ApiResult<User> {
    user.require_admin()?;
    let updated = auth::set_active(&state.pool, actor(&user), id, body.active).await?;
    Ok(ApiResponse::success(updated))
}

/// DELETE /api/users/:id - administrators only; the account is anonymized
pub async fn user_delete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> ApiResult<Value> {
    user.require_admin()?;
    auth::delete_user(&state.pool, actor(&user), id).await?;
    Ok(ApiResponse::success(json!({ "id": id, "deleted": true })))
}
