use clap::Subcommand;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::access::{generate_api_key, hash_api_key, parse_workspace_id};
use crate::cli::utils::{connect_store, output_rows, output_success};
use crate::cli::OutputFormat;
use crate::config::config;
use crate::database::{Executor, Filter, Store, Table};

#[derive(Subcommand)]
pub enum ApiKeyCommands {
    #[command(about = "Create a key for a workspace and print it once")]
    Create {
        #[arg(long, help = "Workspace ID")]
        workspace: String,
        #[arg(long, help = "Key name")]
        name: String,
    },

    #[command(about = "List key names for a workspace")]
    List {
        #[arg(long, help = "Workspace ID")]
        workspace: String,
    },

    #[command(about = "Revoke every key with the given name")]
    Revoke {
        #[arg(long, help = "Workspace ID")]
        workspace: String,
        #[arg(long, help = "Key name")]
        name: String,
    },
}

/// Row persisted for a new key. Only the hash of `value` is stored.
pub fn key_row(workspace_id: Uuid, name: &str, value: &str) -> Map<String, Value> {
    let mut row = Map::new();
    row.insert("id".to_string(), json!(Uuid::new_v4().to_string()));
    row.insert(Table::WORKSPACE_COLUMN.to_string(), json!(workspace_id.to_string()));
    row.insert("name".to_string(), json!(name));
    row.insert("value_hash".to_string(), json!(hash_api_key(value)));
    row
}

pub async fn handle(cmd: ApiKeyCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let store = connect_store(config()).await?;

    match cmd {
        ApiKeyCommands::Create { workspace, name } => {
            let workspace_id = parse_workspace_id(&workspace)?;
            let value = generate_api_key();
            store
                .upsert(&Executor::service(workspace_id), Table::WorkspaceApiKeys, vec![key_row(workspace_id, &name, &value)])
                .await?;

            if let OutputFormat::Text = output_format {
                println!("{}", value);
                eprintln!("Store this key now; it cannot be shown again.");
                return Ok(());
            }
            let mut data = Map::new();
            data.insert("key".to_string(), json!(value));
            data.insert("name".to_string(), json!(name));
            output_success(&output_format, "API key created", Some(data))
        }
        ApiKeyCommands::List { workspace } => {
            let workspace_id = parse_workspace_id(&workspace)?;
            let rows = store
                .select(
                    &Executor::service(workspace_id),
                    Table::WorkspaceApiKeys,
                    Filter::workspace(workspace_id).order_by("created_at"),
                )
                .await?;
            let rows = rows
                .into_iter()
                .map(|mut row| {
                    row.remove("value_hash");
                    row
                })
                .collect();
            output_rows(&output_format, "api_keys", rows, "No API keys")
        }
        ApiKeyCommands::Revoke { workspace, name } => {
            let workspace_id = parse_workspace_id(&workspace)?;
            let deleted = store
                .delete(&Executor::service(workspace_id), Table::WorkspaceApiKeys, Filter::workspace(workspace_id).eq("name", name.as_str()))
                .await?;
            output_success(&output_format, &format!("Revoked {} key(s) named {}", deleted, name), None)
        }
    }
}
