//! popsongs-etl - popular songs batch loader
//!
//! Runs the pipeline once: fetch each configured artist's top tracks in each
//! configured market, flatten to `(song, country)` rows, validate, and append
//! to `<schema>.popular_songs`. Exits non-zero on any failure.
//!
//! Secrets come from the environment (`SPOTIFY_CLIENT_ID`,
//! `SPOTIFY_CLIENT_SECRET`, `REDSHIFT_URL`, `REDSHIFT_SCHEMA`,
//! `REDSHIFT_USER`, `REDSHIFT_PASSWORD`); everything else from an optional
//! TOML file.

use anyhow::{Context, Result};
use clap::Parser;
use popsongs_common::config::{ClientCredentials, TomlConfig, WarehouseSettings};
use popsongs_etl::catalog::SpotifyClient;
use popsongs_etl::load::PostgresSink;
use popsongs_etl::pipeline;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Level used until the config file has been read
const BOOTSTRAP_LEVEL: &str = "info";

/// Command-line arguments for popsongs-etl
#[derive(Parser, Debug)]
#[command(name = "popsongs-etl")]
#[command(about = "Load artists' top tracks per market into popular_songs")]
#[command(version)]
struct Args {
    /// Path to a TOML config file (overrides POPSONGS_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Extract and transform only; print rows as JSON lines instead of loading
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Subscriber goes up before the config is read so config loading is
    // logged; the configured level is swapped in afterwards
    let env_filter = EnvFilter::try_from_default_env().ok();
    let rust_log_set = env_filter.is_some();
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter.unwrap_or_else(|| EnvFilter::new(BOOTSTRAP_LEVEL)))
        .with_filter_reloading();
    let filter_handle = builder.reload_handle();
    builder.init();

    info!(
        "Starting popsongs-etl v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let config = match TomlConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Some(level) = configured_filter(rust_log_set, &config.logging.level) {
        if let Err(e) = filter_handle.reload(level) {
            warn!("Could not apply logging.level '{}': {}", config.logging.level, e);
        }
    }

    match run_once(&args, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Run failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Filter for the configured level, unless `RUST_LOG` already chose one
fn configured_filter(rust_log_set: bool, level: &str) -> Option<EnvFilter> {
    if rust_log_set {
        None
    } else {
        Some(EnvFilter::new(level))
    }
}

async fn run_once(args: &Args, config: &TomlConfig) -> Result<()> {
    let credentials = ClientCredentials::from_env().context("Catalog credentials")?;
    let catalog = SpotifyClient::new(&config.catalog, config.retry.clone())?;

    if args.dry_run {
        let prepared = pipeline::prepare(&config.pipeline, &credentials, &catalog).await?;

        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        for row in &prepared.rows {
            serde_json::to_writer(&mut out, row)?;
            out.write_all(b"\n")?;
        }
        out.flush()?;

        info!(rows = prepared.rows.len(), "Dry run complete, nothing loaded");
        return Ok(());
    }

    let warehouse = WarehouseSettings::from_env().context("Warehouse settings")?;
    let table = warehouse.destination_table()?;
    let sink = PostgresSink::new(&warehouse)?;

    let summary = pipeline::run(&config.pipeline, &credentials, &catalog, &sink, &table).await?;
    info!(
        rows = summary.rows,
        loaded_at = %summary.loaded_at,
        "Data loaded into {}",
        table
    );

    Ok(())
}
