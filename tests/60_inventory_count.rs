mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::json;
use uuid::Uuid;
use workspace_gate::database::Table;
use workspace_gate::features::ENABLE_INVENTORY;

async fn seed_units(server: &common::TestServer, ws_id: Uuid, n: usize) -> Result<()> {
    let rows = (0..n)
        .map(|i| json!({ "id": Uuid::new_v4().to_string(), "ws_id": ws_id.to_string(), "name": format!("unit {}", i) }))
        .collect();
    server.seed(Table::InventoryUnits, rows).await
}

async fn set_flag(server: &common::TestServer, ws_id: Uuid, on: bool) -> Result<()> {
    server
        .seed(Table::WorkspaceSecrets, vec![json!({ "ws_id": ws_id.to_string(), "name": ENABLE_INVENTORY, "value": on.to_string() })])
        .await
}

#[tokio::test]
async fn disabled_flag_returns_zero_without_counting() -> Result<()> {
    let server = common::TestServer::start().await?;
    let ws = server.workspace().await?;
    seed_units(&server, ws.ws_id, 3).await?;
    set_flag(&server, ws.ws_id, false).await?;

    let res = server
        .client
        .get(server.url(&format!("/api/v1/workspaces/{}/inventory/units/count", ws.ws_id)))
        .header("API_KEY", &ws.api_key)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.json::<i64>().await?, 0);
    assert!(server.store.calls().await.iter().all(|c| c.table != Table::InventoryUnits));
    Ok(())
}

#[tokio::test]
async fn enabled_flag_counts_units() -> Result<()> {
    let server = common::TestServer::start().await?;
    let ws = server.workspace().await?;
    let other = server.workspace().await?;
    seed_units(&server, ws.ws_id, 3).await?;
    seed_units(&server, other.ws_id, 5).await?;
    set_flag(&server, ws.ws_id, true).await?;

    let res = server
        .client
        .get(server.url(&format!("/api/v1/workspaces/{}/inventory/units/count", ws.ws_id)))
        .bearer_auth(&ws.token)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.json::<i64>().await?, 3);
    Ok(())
}

#[tokio::test]
async fn flag_in_another_workspace_does_not_apply() -> Result<()> {
    let server = common::TestServer::start().await?;
    let ws = server.workspace().await?;
    let other = server.workspace().await?;
    seed_units(&server, ws.ws_id, 2).await?;
    set_flag(&server, other.ws_id, true).await?;

    let count = server
        .client
        .get(server.url(&format!("/api/v1/workspaces/{}/inventory/units/count", ws.ws_id)))
        .header("API_KEY", &ws.api_key)
        .send()
        .await?
        .json::<i64>()
        .await?;
    assert_eq!(count, 0);
    Ok(())
}
