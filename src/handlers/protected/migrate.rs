use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::access::{parse_resource_id, parse_workspace_id, AccessError, Credential};
use crate::database::{Filter, Row, Table};
use crate::error::{ApiError, ApiResult};
use crate::services::sync_collection;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UsersPayload {
    pub users: Vec<Row>,
}

#[derive(Debug, Deserialize)]
pub struct IndicatorsPayload {
    /// Group the indicators belong to
    pub id: String,
    #[serde(default)]
    pub indicators: Vec<Row>,
}

/// POST /api/workspaces/:ws_id/migrate/users - Make the workspace's users
/// exactly the supplied list
pub async fn users_post(
    State(state): State<AppState>,
    Path(ws_id): Path<String>,
    credential: Result<Credential, AccessError>,
    payload: Result<Json<UsersPayload>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let workspace_id = parse_workspace_id(&ws_id)?;
    let Json(payload) = payload?;

    let executor = state.gate.authorize(&credential?, workspace_id).await?;
    sync_collection(state.store.as_ref(), &executor, Table::WorkspaceUsers, workspace_id, payload.users).await?;

    Ok(Json(json!({})))
}

/// PUT /api/workspaces/:ws_id/users/groups/indicators/migrate - Upsert the
/// indicator values of one group
pub async fn indicators_put(
    State(state): State<AppState>,
    Path(ws_id): Path<String>,
    credential: Result<Credential, AccessError>,
    payload: Result<Json<IndicatorsPayload>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let workspace_id = parse_workspace_id(&ws_id)?;
    let Json(payload) = payload?;
    let group_id = parse_resource_id("group", &payload.id)?;

    let rows = payload
        .indicators
        .into_iter()
        .map(|mut indicator| {
            indicator.remove("id");
            indicator.insert("group_id".to_string(), Value::String(group_id.to_string()));
            indicator.insert(Table::WORKSPACE_COLUMN.to_string(), Value::String(workspace_id.to_string()));
            Table::UserGroupIndicators.normalize_row(&indicator)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let executor = state.gate.authorize(&credential?, workspace_id).await?;

    // Indicators may only hang off a group of this workspace
    let groups = state
        .store
        .count(&executor, Table::WorkspaceUserGroups, Filter::workspace(workspace_id).eq("id", group_id.to_string()))
        .await
        .map_err(|e| ApiError::from_store("Error migrating user group indicators", e))?;
    if groups == 0 {
        return Err(ApiError::not_found("User group not found"));
    }

    let upserted = state
        .store
        .upsert(&executor, Table::UserGroupIndicators, rows)
        .await
        .map_err(|e| ApiError::from_store("Error migrating user group indicators", e))?;
    tracing::info!("Upserted {} indicators for group {} in workspace {}", upserted, group_id, workspace_id);

    Ok(Json(json!({ "message": "success" })))
}
