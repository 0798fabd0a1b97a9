//! Muchio CLI - database migrations and operational tools.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! muchio migrate
//!
//! # Settle stock for orders whose lines are still pending
//! muchio reconcile-inventory --limit 500
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `reconcile-inventory` - Apply pending stock adjustments

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "muchio")]
#[command(author, version, about = "Muchio order backend tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Apply stock adjustments left pending by interrupted checkouts
    ReconcileInventory {
        /// Maximum number of orders to process
        #[arg(short, long, default_value_t = 100)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::ReconcileInventory { limit } => commands::reconcile::run(limit).await?,
    }
    Ok(())
}
