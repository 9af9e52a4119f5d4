pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "wsgate")]
#[command(about = "wsgate - operator CLI for the workspace gate API")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in human-readable text format")]
    pub text: bool,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the HTTP server")]
    Serve {
        #[arg(long, help = "Use the in-memory store instead of Postgres")]
        memory: bool,
        #[arg(long, help = "Port to listen on (defaults to WSGATE_PORT or PORT)")]
        port: Option<u16>,
    },

    #[command(about = "Apply database migrations")]
    Migrate,

    #[command(about = "Workspace API key management")]
    ApiKey {
        #[command(subcommand)]
        cmd: commands::api_key::ApiKeyCommands,
    },

    #[command(about = "Issue a session token for local testing")]
    Token {
        #[arg(long, help = "User ID the token is issued for")]
        user: String,
        #[arg(long, help = "Email claim")]
        email: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    match cli.command {
        Commands::Serve { memory, port } => commands::serve::handle(memory, port).await,
        Commands::Migrate => commands::migrate::handle(output_format).await,
        Commands::ApiKey { cmd } => commands::api_key::handle(cmd, output_format).await,
        Commands::Token { user, email } => commands::token::handle(&user, email, output_format),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_api_key_create() {
        let cli = Cli::try_parse_from([
            "wsgate",
            "--json",
            "api-key",
            "create",
            "--workspace",
            "7c9e6679-7425-40de-944b-e07fc1f90ae7",
            "--name",
            "ci",
        ])
        .unwrap();
        assert!(matches!(OutputFormat::from_cli(&cli), OutputFormat::Json));
        assert!(matches!(cli.command, Commands::ApiKey { .. }));
    }

    #[test]
    fn serve_defaults_to_postgres() {
        let cli = Cli::try_parse_from(["wsgate", "serve"]).unwrap();
        assert!(matches!(cli.command, Commands::Serve { memory: false, port: None }));
    }
}
