use serde_json::{json, Map, Value};

use crate::cli::OutputFormat;
use crate::config::AppConfig;
use crate::database::{DatabaseManager, PgStore};

/// Output a success message in the appropriate format
pub fn output_success(output_format: &OutputFormat, message: &str, data: Option<Map<String, Value>>) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = Map::new();
            response.insert("success".to_string(), json!(true));
            response.insert("message".to_string(), json!(message));
            if let Some(data) = data {
                response.extend(data);
            }
            println!("{}", serde_json::to_string_pretty(&Value::Object(response))?);
        }
        OutputFormat::Text => {
            println!("✓ {}", message);
        }
    }
    Ok(())
}

/// Output a list of rows, one per line in text mode
pub fn output_rows(output_format: &OutputFormat, collection_name: &str, rows: Vec<Map<String, Value>>, empty_message: &str) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&json!({ collection_name: rows }))?);
        }
        OutputFormat::Text if rows.is_empty() => println!("{}", empty_message),
        OutputFormat::Text => {
            for row in rows {
                let line = row
                    .iter()
                    .map(|(k, v)| match v {
                        Value::String(s) => format!("{}={}", k, s),
                        other => format!("{}={}", k, other),
                    })
                    .collect::<Vec<_>>()
                    .join("  ");
                println!("{}", line);
            }
        }
    }
    Ok(())
}

/// Connect to the configured database for one-shot commands
pub async fn connect_store(config: &AppConfig) -> anyhow::Result<PgStore> {
    let pool = DatabaseManager::connect(&config.database).await?;
    Ok(PgStore::new(pool, &config.database, config.sync.transactional))
}
