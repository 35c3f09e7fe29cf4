//! # parkdata CLI
//!
//! Fetches theme-park data from the upstream middleware and prints
//! normalized JSON on stdout. Logs go to stderr, filtered by `RUST_LOG`
//! (default `parkdata=info`).
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `parkdata sync` | Make sure the offline package snapshot is current |
//! | `parkdata attractions` | Attractions with live status and schedule |
//! | `parkdata shows` | Shows with schedule |
//! | `parkdata restaurants` | Restaurants with menu and schedule |
//! | `parkdata calendar` | Opening intervals grouped by day |
//! | `parkdata live` | One raw live-status poll |
//! | `parkdata destination` | Destination and park descriptors |
//!
//! ## Examples
//!
//! ```bash
//! parkdata attractions
//! parkdata --config ./config/parkdata.toml calendar
//! RUST_LOG=parkdata=debug parkdata live
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use parkdata::config::{self, Config};
use parkdata::park::ParkRegistry;

#[derive(Parser)]
#[command(
    name = "parkdata",
    about = "Theme-park data ingestion and normalization",
    version
)]
struct Cli {
    /// Path to a TOML configuration file. Built-in defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Park to query. Defaults to the configured park.
    #[arg(long, global = true)]
    park: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download and extract the latest offline package if it changed.
    Sync,
    /// List attractions joined with live wait times.
    Attractions,
    /// List shows.
    Shows,
    /// List restaurants.
    Restaurants,
    /// Show opening intervals grouped by calendar day.
    Calendar,
    /// Poll live status once and print records, schedules and messages.
    Live,
    /// Print the destination and its park entities.
    Destination,
}

#[derive(Serialize)]
struct DestinationOutput<T: Serialize, U: Serialize> {
    destination: T,
    parks: U,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("parkdata=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{out}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let cfg = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => Config::default(),
    };

    let registry = ParkRegistry::from_config(&cfg)?;
    let park_id = cli.park.as_deref().unwrap_or(&cfg.park.id);
    let park = registry
        .find(park_id)
        .with_context(|| format!("Unknown park: {park_id}"))?;

    match cli.command {
        Commands::Sync => print_json(&park.sync().await?)?,
        Commands::Attractions => print_json(&park.attractions().await?)?,
        Commands::Shows => print_json(&park.shows().await?)?,
        Commands::Restaurants => print_json(&park.restaurants().await?)?,
        Commands::Calendar => print_json(&park.opening_times().await?)?,
        Commands::Live => print_json(&park.live_status().await?)?,
        Commands::Destination => print_json(&DestinationOutput {
            destination: park.destination_entity(),
            parks: park.park_entities(),
        })?,
    }

    Ok(())
}
