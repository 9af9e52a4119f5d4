use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::database::{Executor, Filter, Store, StoreResult, Table};

pub const ENABLE_INVENTORY: &str = "ENABLE_INVENTORY";

/// Per-workspace feature switches
#[async_trait]
pub trait FeatureFlags: Send + Sync {
    /// True only when every named flag is on for the workspace
    async fn has_features(&self, workspace_id: Uuid, flags: &[&str]) -> StoreResult<bool>;
}

/// Flags stored as `workspace_secrets` rows whose value is "true"
pub struct SecretFlags {
    store: Arc<dyn Store>,
}

impl SecretFlags {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl FeatureFlags for SecretFlags {
    async fn has_features(&self, workspace_id: Uuid, flags: &[&str]) -> StoreResult<bool> {
        let wanted: BTreeSet<&str> = flags.iter().copied().collect();
        if wanted.is_empty() {
            return Ok(true);
        }

        let filter = Filter::workspace(workspace_id)
            .is_in("name", wanted.iter().copied())
            .eq("value", "true");
        let enabled = self
            .store
            .count(&Executor::service(workspace_id), Table::WorkspaceSecrets, filter)
            .await?;
        Ok(enabled as usize == wanted.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;
    use serde_json::json;

    async fn flags_with(ws: Uuid, secrets: &[(&str, &str)]) -> SecretFlags {
        let store = Arc::new(MemoryStore::new());
        let rows = secrets
            .iter()
            .map(|(name, value)| json!({ "ws_id": ws.to_string(), "name": name, "value": value }).as_object().cloned().unwrap())
            .collect();
        store.seed(Table::WorkspaceSecrets, rows).await.unwrap();
        SecretFlags::new(store)
    }

    #[tokio::test]
    async fn flag_must_be_literally_true() {
        let ws = Uuid::new_v4();
        let flags = flags_with(ws, &[(ENABLE_INVENTORY, "false")]).await;
        assert!(!flags.has_features(ws, &[ENABLE_INVENTORY]).await.unwrap());

        let flags = flags_with(ws, &[(ENABLE_INVENTORY, "true")]).await;
        assert!(flags.has_features(ws, &[ENABLE_INVENTORY]).await.unwrap());
    }

    #[tokio::test]
    async fn every_flag_is_required() {
        let ws = Uuid::new_v4();
        let flags = flags_with(ws, &[(ENABLE_INVENTORY, "true")]).await;
        assert!(!flags.has_features(ws, &[ENABLE_INVENTORY, "ENABLE_REPORTS"]).await.unwrap());
        assert!(flags.has_features(ws, &[ENABLE_INVENTORY, ENABLE_INVENTORY]).await.unwrap());
        assert!(flags.has_features(ws, &[]).await.unwrap());
    }

    #[tokio::test]
    async fn flags_do_not_leak_across_workspaces() {
        let ws = Uuid::new_v4();
        let flags = flags_with(ws, &[(ENABLE_INVENTORY, "true")]).await;
        assert!(!flags.has_features(Uuid::new_v4(), &[ENABLE_INVENTORY]).await.unwrap());
    }
}
