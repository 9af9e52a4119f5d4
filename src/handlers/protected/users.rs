use axum::{
    extract::{rejection::QueryRejection, Query, State},
    response::Json,
};
use serde::{Deserialize, Serialize};

use crate::access::{AccessError, Credential};
use crate::database::models::{from_rows, UserProfile};
use crate::database::{Filter, Table};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub users: Vec<UserProfile>,
}

/// GET /api/users/search?query= - Name search over user profiles
///
/// Matches `display_name` or `handle` case-insensitively. A missing or blank
/// query is rejected before any store call.
pub async fn search(
    State(state): State<AppState>,
    query: Result<Query<SearchQuery>, QueryRejection>,
    credential: Result<Credential, AccessError>,
) -> ApiResult<Json<SearchResponse>> {
    let Query(query) = query?;
    let needle = query
        .query
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::bad_request("Query is required"))?;

    let executor = state.gate.session(&credential?)?;

    let filter = Filter::new()
        .search(["display_name", "handle"], needle)
        .order_by("display_name")
        .limit(state.config.api.search_limit);
    let rows = state
        .store
        .select(&executor, Table::Users, filter)
        .await
        .map_err(|e| ApiError::from_store("Error searching users", e))?;

    let users = from_rows(rows).map_err(|e| ApiError::upstream("Error searching users", e))?;
    Ok(Json(SearchResponse { users }))
}
