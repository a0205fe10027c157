// handlers/public/auth.rs - POST /auth/login

use axum::{extract::State, http::HeaderMap, Json};
use serde::Deserialize;

use crate::auth::{self, LoginResponse};
use crate::middleware::{client_ip, ApiResponse, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Exchange username and password for a JWT
pub async fn login_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> ApiResult<LoginResponse> {
    let ip = client_ip(&headers);
    let response = auth::login(&state.pool, &state.security, &body.username, &body.password, ip.as_deref()).await?;
    Ok(ApiResponse::success(response))
}
