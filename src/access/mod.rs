//! Access gate: picks exactly one credential path for a workspace-scoped
//! request and turns it into the `Executor` every store call runs under.
//!
//! API keys are checked against `workspace_api_keys` on every request.
//! Sessions are passed through; the store's membership policy decides what
//! a session may see.

pub mod credential;

use std::sync::Arc;

use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::database::{Executor, Filter, Store, StoreError, Table};

pub use credential::{Credential, Identity};

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("Invalid workspace ID")]
    InvalidWorkspaceId,

    #[error("Invalid {0} ID")]
    InvalidResourceId(&'static str),

    #[error("Invalid API key")]
    Unauthorized,

    #[error("{0}")]
    Unauthenticated(String),

    #[error(transparent)]
    Upstream(#[from] StoreError),
}

#[derive(Clone)]
pub struct AccessGate {
    store: Arc<dyn Store>,
}

impl AccessGate {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Resolve the credential into an executor bound to `workspace_id`
    pub async fn authorize(&self, credential: &Credential, workspace_id: Uuid) -> Result<Executor, AccessError> {
        match credential {
            Credential::ApiKey(value) => {
                let executor = Executor::service(workspace_id);
                let filter = Filter::workspace(workspace_id).eq("value_hash", hash_api_key(value));
                let matches = self.store.count(&executor, Table::WorkspaceApiKeys, filter).await?;
                if matches == 0 {
                    tracing::warn!("Rejected API key for workspace {}", workspace_id);
                    return Err(AccessError::Unauthorized);
                }
                Ok(executor)
            }
            Credential::Session(identity) => Ok(Executor::session(identity.user_id)),
        }
    }

    /// Routes with no workspace in the path only accept a session
    pub fn session(&self, credential: &Credential) -> Result<Executor, AccessError> {
        match credential {
            Credential::Session(identity) => Ok(Executor::session(identity.user_id)),
            Credential::ApiKey(_) => Err(AccessError::Unauthenticated(
                "This route requires a user session".to_string(),
            )),
        }
    }
}

pub fn parse_workspace_id(raw: &str) -> Result<Uuid, AccessError> {
    Uuid::parse_str(raw.trim()).map_err(|_| AccessError::InvalidWorkspaceId)
}

pub fn parse_resource_id(kind: &'static str, raw: &str) -> Result<Uuid, AccessError> {
    Uuid::parse_str(raw.trim()).map_err(|_| AccessError::InvalidResourceId(kind))
}

/// Hex SHA-256 of an API key, the form keys are stored in
pub fn hash_api_key(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Fresh random key value. Shown once, only the hash is persisted.
pub fn generate_api_key() -> String {
    format!("wsk_{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}
