use serde_json::{json, Map};

use crate::access::parse_resource_id;
use crate::auth::{generate_jwt, Claims};
use crate::cli::utils::output_success;
use crate::cli::OutputFormat;
use crate::config::config;

pub fn handle(user: &str, email: Option<String>, output_format: OutputFormat) -> anyhow::Result<()> {
    let security = &config().security;
    if security.jwt_secret.is_empty() {
        anyhow::bail!("JWT_SECRET is not set");
    }

    let user_id = parse_resource_id("user", user)?;
    let claims = Claims::new(user_id, email, security.jwt_expiry_hours);
    let token = generate_jwt(&claims, &security.jwt_secret)?;

    match output_format {
        OutputFormat::Text => {
            println!("{}", token);
            Ok(())
        }
        OutputFormat::Json => {
            let mut data = Map::new();
            data.insert("token".to_string(), json!(token));
            data.insert("expires_at".to_string(), json!(claims.exp));
            output_success(&output_format, "Token issued", Some(data))
        }
    }
}
