use uuid::Uuid;

use crate::database::{Executor, Filter, Store, StoreResult, Table};
use crate::features::FeatureFlags;

/// "How many rows of `table` exist in this workspace (and sub-scope)"
#[derive(Debug, Clone)]
pub struct CountQuery {
    pub table: Table,
    pub workspace_id: Uuid,
    /// Extra equality, e.g. `("group_id", id)`
    pub sub_scope: Option<(&'static str, Uuid)>,
    /// Flags that must all be on, otherwise the count is 0 and no query runs
    pub required_flags: &'static [&'static str],
}

impl CountQuery {
    pub fn new(table: Table, workspace_id: Uuid) -> Self {
        Self { table, workspace_id, sub_scope: None, required_flags: &[] }
    }

    pub fn within(mut self, column: &'static str, id: Uuid) -> Self {
        self.sub_scope = Some((column, id));
        self
    }

    pub fn gated_by(mut self, flags: &'static [&'static str]) -> Self {
        self.required_flags = flags;
        self
    }
}

pub async fn scoped_count(
    store: &dyn Store,
    flags: &dyn FeatureFlags,
    executor: &Executor,
    query: &CountQuery,
) -> StoreResult<i64> {
    if !query.required_flags.is_empty() && !flags.has_features(query.workspace_id, query.required_flags).await? {
        tracing::debug!("{} count skipped for workspace {}: feature disabled", query.table, query.workspace_id);
        return Ok(0);
    }

    let mut filter = Filter::workspace(query.workspace_id);
    if let Some((column, id)) = query.sub_scope {
        filter = filter.eq(column, id.to_string());
    }
    let count = store.count(executor, query.table, filter).await?;
    Ok(count.max(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{MemoryStore, Row};
    use crate::features::{SecretFlags, ENABLE_INVENTORY};
    use serde_json::json;
    use std::sync::Arc;

    fn row(v: serde_json::Value) -> Row {
        v.as_object().cloned().unwrap()
    }

    async fn inventory(ws: Uuid, enabled: bool) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store
            .seed(
                Table::WorkspaceSecrets,
                vec![row(json!({ "ws_id": ws.to_string(), "name": ENABLE_INVENTORY, "value": enabled.to_string() }))],
            )
            .await
            .unwrap();
        let units = (0..3)
            .map(|i| row(json!({ "id": Uuid::new_v4().to_string(), "ws_id": ws.to_string(), "name": format!("unit {i}") })))
            .collect();
        store.seed(Table::InventoryUnits, units).await.unwrap();
        store
    }

    #[tokio::test]
    async fn counts_when_flag_is_on() {
        let ws = Uuid::new_v4();
        let store = inventory(ws, true).await;
        let flags = SecretFlags::new(store.clone());
        let query = CountQuery::new(Table::InventoryUnits, ws).gated_by(&[ENABLE_INVENTORY]);
        assert_eq!(scoped_count(store.as_ref(), &flags, &Executor::service(ws), &query).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn disabled_flag_short_circuits_without_counting() {
        let ws = Uuid::new_v4();
        let store = inventory(ws, false).await;
        let flags = SecretFlags::new(store.clone());
        let query = CountQuery::new(Table::InventoryUnits, ws).gated_by(&[ENABLE_INVENTORY]);

        assert_eq!(scoped_count(store.as_ref(), &flags, &Executor::service(ws), &query).await.unwrap(), 0);
        assert!(store.calls().await.iter().all(|c| c.table != Table::InventoryUnits));
    }

    #[tokio::test]
    async fn sub_scope_narrows_the_count() {
        let ws = Uuid::new_v4();
        let (g1, g2) = (Uuid::new_v4(), Uuid::new_v4());
        let store = Arc::new(MemoryStore::new());
        let members = [g1, g1, g2]
            .iter()
            .map(|g| row(json!({ "ws_id": ws.to_string(), "group_id": g.to_string(), "user_id": Uuid::new_v4().to_string() })))
            .collect();
        store.seed(Table::WorkspaceUserGroupMembers, members).await.unwrap();
        let flags = SecretFlags::new(store.clone());

        let query = CountQuery::new(Table::WorkspaceUserGroupMembers, ws).within("group_id", g1);
        assert_eq!(scoped_count(store.as_ref(), &flags, &Executor::service(ws), &query).await.unwrap(), 2);
    }
}
