#![allow(dead_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::{json, Value};
use uuid::Uuid;

use workspace_gate::access::hash_api_key;
use workspace_gate::auth::{generate_jwt, Claims};
use workspace_gate::config::AppConfig;
use workspace_gate::database::{MemoryStore, Row, Store, Table};
use workspace_gate::server;
use workspace_gate::state::AppState;

/// Router served in-process on a free port, backed by a fresh in-memory store
pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    pub store: Arc<MemoryStore>,
    pub config: AppConfig,
    pub client: reqwest::Client,
}

impl TestServer {
    pub async fn start() -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let config = AppConfig::development();
        let store = Arc::new(MemoryStore::new());
        let state = AppState::new(store.clone() as Arc<dyn Store>, config.clone());

        // Bound before spawning, so requests can be sent immediately
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .context("failed to bind test listener")?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, server::app(state)).await;
        });

        Ok(Self { port, base_url, store, config, client: reqwest::Client::new() })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn session_token(&self, user_id: Uuid) -> Result<String> {
        let claims = Claims::new(user_id, None, 1);
        Ok(generate_jwt(&claims, &self.config.security.jwt_secret)?)
    }

    /// Workspace with one member and one API key
    pub async fn workspace(&self) -> Result<Workspace> {
        let ws_id = Uuid::new_v4();
        let member_id = Uuid::new_v4();
        let api_key = format!("wsk_test_{}", Uuid::new_v4().simple());

        self.store
            .seed(Table::WorkspaceMembers, vec![row(json!({ "ws_id": ws_id.to_string(), "user_id": member_id.to_string() }))])
            .await?;
        self.store
            .seed(
                Table::WorkspaceApiKeys,
                vec![row(json!({
                    "id": Uuid::new_v4().to_string(),
                    "ws_id": ws_id.to_string(),
                    "name": "integration",
                    "value_hash": hash_api_key(&api_key),
                }))],
            )
            .await?;

        let token = self.session_token(member_id)?;
        Ok(Workspace { ws_id, member_id, api_key, token })
    }

    pub async fn seed(&self, table: Table, rows: Vec<Value>) -> Result<()> {
        self.store.seed(table, rows.into_iter().map(row).collect()).await?;
        Ok(())
    }
}

pub struct Workspace {
    pub ws_id: Uuid,
    pub member_id: Uuid,
    pub api_key: String,
    pub token: String,
}

pub fn row(v: Value) -> Row {
    match v {
        Value::Object(map) => map,
        other => panic!("fixture row must be an object, got {}", other),
    }
}

/// Assert the standard error body and return its message
pub async fn error_message(res: reqwest::Response) -> Result<String> {
    let body = res.json::<Value>().await?;
    assert_eq!(body["error"], json!(true), "not an error body: {}", body);
    assert!(body["code"].is_string(), "missing code: {}", body);
    Ok(body["message"].as_str().unwrap_or_default().to_string())
}
