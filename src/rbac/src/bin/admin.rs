//! # RBAC Admin
//!
//! Maintenance commands against the PostgreSQL hierarchy store.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `DATABASE_URL` - PostgreSQL connection string (required)
//! - `RBAC_DEFAULT_ROLES` - comma separated default roles
//! - `RUST_LOG` - Log level (default: info)

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cretoai_rbac::{DatabaseConfig, PostgresStorage, RbacConfig, RbacManager};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "rbac-admin")]
#[command(about = "Maintain the RBAC hierarchy store")]
#[command(version)]
struct Cli {
    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Maximum pool connections
    #[arg(long, env = "RBAC_DB_MAX_CONNECTIONS", default_value_t = 5)]
    max_connections: u32,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply pending schema migrations
    Migrate,

    /// Print every item, its parents and every rule as JSON
    Dump {
        /// Pretty-print the output
        #[arg(long)]
        pretty: bool,
    },

    /// Print the effective permissions of a user as JSON
    Permissions {
        /// Username to resolve
        username: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},cretoai_rbac={}", log_level, log_level).into()),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mut database = DatabaseConfig::new(cli.database_url);
    database.max_connections = cli.max_connections;
    database.min_connections = database.min_connections.min(cli.max_connections);

    let storage = PostgresStorage::new(&database)
        .await
        .context("Failed to open the hierarchy store")?;

    match cli.command {
        Command::Migrate => {
            storage.run_migrations().await.context("Migration failed")?;
            info!("Schema is up to date");
        }
        Command::Dump { pretty } => {
            let manager = RbacManager::new(Arc::new(storage), &RbacConfig::default());
            let snapshot = manager.load().await?;
            let json = if pretty {
                serde_json::to_string_pretty(&snapshot)?
            } else {
                serde_json::to_string(&snapshot)?
            };
            println!("{}", json);
        }
        Command::Permissions { username } => {
            let config = RbacConfig::from_env()?;
            let manager = RbacManager::new(Arc::new(storage), &config);
            let permissions = manager.aggregator().permissions_for_user(&username).await?;
            println!("{}", serde_json::to_string_pretty(&permissions)?);
        }
    }

    Ok(())
}
