use axum::extract::{Query, State};
use chrono::{Datelike, Local};
use serde::Deserialize;

use crate::database::models::Counter;
use crate::middleware::{ApiResponse, ApiResult};
use crate::registry::{query, Dashboard};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CountersQuery {
    pub year: Option<i32>,
}

/// GET /api/counters?year
pub async fn counters_get(
    State(state): State<AppState>,
    Query(params): Query<CountersQuery>,
) -> ApiResult<Vec<Counter>> {
    Ok(ApiResponse::success(query::counters(&state.pool, params.year).await?))
}

/// GET /api/dashboard - figures for the current year
pub async fn dashboard_get(State(state): State<AppState>) -> ApiResult<Dashboard> {
    let year = Local::now().year();
    Ok(ApiResponse::success(query::dashboard(&state.pool, year).await?))
}
