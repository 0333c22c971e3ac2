mod config;
mod scan;
mod service;

use std::path::PathBuf;

use clap::Parser;
use supabase::SupabaseClient;
use tracing::info;

use config::{load_config, DEFAULT_CONFIG_FILE};
use scan::Scanner;

#[derive(Debug, Parser)]
#[command(
    name = "cultural-scanner",
    about = "Scans a music library and maintains its genre intelligence"
)]
struct CliArgs {
    /// Directory to scan. Falls back to scan_path from the config file.
    path: Option<PathBuf>,

    /// Stop after this many audio files.
    #[arg(long)]
    limit: Option<usize>,

    /// Run a single scan and exit. This is the default action.
    #[arg(long)]
    scan: bool,

    /// Keep scanning on an interval until interrupted.
    #[arg(long)]
    service: bool,

    /// Print the latest session and table counts as JSON.
    #[arg(long)]
    status: bool,

    /// Path to the JSON config file.
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = CliArgs::parse();
    if args.scan && args.service {
        return Err("pass either --scan or --service, not both".into());
    }

    let config = load_config(&args.config)?;
    let db = SupabaseClient::new(&config.supabase)?;
    let scanner = Scanner::new(db);

    if args.status {
        let report = scanner.status().await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let root = args
        .path
        .clone()
        .or_else(|| config.scan_path.clone())
        .ok_or("no scan path given; pass one or set scan_path in the config")?;
    let limit = args.limit.or(config.scan_limit);

    if args.service {
        service::run_service(&scanner, &config, &root).await;
        return Ok(());
    }

    let outcome = scanner.scan_directory(&root, limit).await?;
    info!(
        "Scan session {} complete: {} discovered, {} analyzed, {} classified, {} duplicates, {} errors in {}s",
        outcome.session_id,
        outcome.files_discovered,
        outcome.files_analyzed,
        outcome.files_classified,
        outcome.duplicates_found,
        outcome.errors,
        outcome.elapsed_seconds
    );
    Ok(())
}
