use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Serialize;

use crate::access::{parse_resource_id, parse_workspace_id, AccessError, Credential};
use crate::database::models::{from_rows, WorkspaceUser};
use crate::database::{Filter, Table};
use crate::error::{ApiError, ApiResult};
use crate::features::ENABLE_INVENTORY;
use crate::services::{scoped_count, CountQuery};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct UsersResponse {
    pub users: Vec<WorkspaceUser>,
}

/// GET /api/v1/workspaces/:ws_id/user-groups/:group_id/count
pub async fn group_count(
    State(state): State<AppState>,
    Path((ws_id, group_id)): Path<(String, String)>,
    credential: Result<Credential, AccessError>,
) -> ApiResult<Json<i64>> {
    let workspace_id = parse_workspace_id(&ws_id)?;
    let group_id = parse_resource_id("group", &group_id)?;

    let executor = state.gate.authorize(&credential?, workspace_id).await?;
    let query = CountQuery::new(Table::WorkspaceUserGroupMembers, workspace_id).within("group_id", group_id);
    let count = scoped_count(state.store.as_ref(), state.flags.as_ref(), &executor, &query)
        .await
        .map_err(|e| ApiError::from_store("Error fetching user group count", e))?;

    Ok(Json(count))
}

/// GET /api/v1/workspaces/:ws_id/users
pub async fn users_list(
    State(state): State<AppState>,
    Path(ws_id): Path<String>,
    credential: Result<Credential, AccessError>,
) -> ApiResult<Json<UsersResponse>> {
    let workspace_id = parse_workspace_id(&ws_id)?;

    let executor = state.gate.authorize(&credential?, workspace_id).await?;
    let rows = state
        .store
        .select(&executor, Table::WorkspaceUsers, Filter::workspace(workspace_id).order_by("created_at"))
        .await
        .map_err(|e| ApiError::from_store("Error fetching workspace users", e))?;

    let users = from_rows(rows).map_err(|e| ApiError::upstream("Error fetching workspace users", e))?;
    Ok(Json(UsersResponse { users }))
}

/// GET /api/v1/workspaces/:ws_id/inventory/units/count
///
/// Always 0 while `ENABLE_INVENTORY` is off for the workspace.
pub async fn inventory_units_count(
    State(state): State<AppState>,
    Path(ws_id): Path<String>,
    credential: Result<Credential, AccessError>,
) -> ApiResult<Json<i64>> {
    let workspace_id = parse_workspace_id(&ws_id)?;

    let executor = state.gate.authorize(&credential?, workspace_id).await?;
    let query = CountQuery::new(Table::InventoryUnits, workspace_id).gated_by(&[ENABLE_INVENTORY]);
    let count = scoped_count(state.store.as_ref(), state.flags.as_ref(), &executor, &query)
        .await
        .map_err(|e| ApiError::from_store("Error fetching inventory count", e))?;

    Ok(Json(count))
}
