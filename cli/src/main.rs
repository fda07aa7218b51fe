//! labitbu CLI — run and manage the labitbu indexer.
//!
//! Usage:
//! ```bash
//! labitbu run                # continuous block polling + extraction
//! labitbu populate           # resolve sats, then assign inscriptions
//! labitbu validate           # re-check assigned inscriptions
//! labitbu export [PATH]      # dump records + stats as JSON
//! labitbu reset              # wipe records and the block cursor
//! labitbu info
//! ```
//!
//! Configuration comes from the environment: `LABITBU_DB`,
//! `LABITBU_BITCOIND_RPC`, `LABITBU_BITCOIND_AUTH`, `LABITBU_ORD_API`,
//! `LABITBU_ESPLORA_API`, `LABITBU_START_HEIGHT`. Unset variables fall back
//! to the defaults in [`Config`].

use std::env;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use labitbu_bitcoin::{
    assign_inscriptions, populate_sats, validate_assigned, HttpChainClient, Poller,
};
use labitbu_core::config::Config;
use labitbu_core::store::RecordStore;
use labitbu_storage::SqliteStore;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "run" => cmd_run().await,
        "populate" => cmd_populate().await,
        "validate" => cmd_validate().await,
        "export" => cmd_export(args.get(2).map(String::as_str)).await,
        "reset" => cmd_reset().await,
        "info" => {
            cmd_info();
            Ok(())
        }
        "version" | "--version" | "-V" => {
            println!("labitbu {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    };

    if let Err(err) = result {
        eprintln!("Error: {err:#}");
        process::exit(1);
    }
}

fn print_usage() {
    println!("labitbu {}", env!("CARGO_PKG_VERSION"));
    println!("Bitcoin indexer for labitbu witness embeddings\n");
    println!("USAGE:");
    println!("    labitbu <COMMAND>\n");
    println!("COMMANDS:");
    println!("    run       Poll blocks continuously and extract embeddings");
    println!("    populate  Resolve sats and assign inscriptions to records");
    println!("    validate  Re-check assigned inscriptions; repair or clear failures");
    println!("    export    Write records and stats as JSON (default: docs/db_export.json)");
    println!("    reset     Delete all records and the block cursor");
    println!("    info      Show effective configuration");
    println!("    version   Print version");
    println!("    help      Print this help");
}

/// Build the effective config from environment overrides.
fn config_from_env() -> Result<Config> {
    let mut config = Config::default();
    if let Ok(db) = env::var("LABITBU_DB") {
        config.db_path = db;
    }
    if let Ok(url) = env::var("LABITBU_BITCOIND_RPC") {
        config.bitcoind_rpc_url = url;
    }
    if let Ok(auth) = env::var("LABITBU_BITCOIND_AUTH") {
        config.bitcoind_rpc_auth = Some(auth);
    }
    if let Ok(url) = env::var("LABITBU_ORD_API") {
        config.ord_api_url = url;
    }
    if let Ok(url) = env::var("LABITBU_ESPLORA_API") {
        config.esplora_api_url = url;
    }
    if let Ok(height) = env::var("LABITBU_START_HEIGHT") {
        config.start_height = height
            .parse()
            .context("LABITBU_START_HEIGHT must be a block height")?;
    }
    Ok(config)
}

async fn open_store(config: &Config) -> Result<SqliteStore> {
    SqliteStore::open(&config.db_path)
        .await
        .with_context(|| format!("opening database at {}", config.db_path))
}

/// Propagate Ctrl-C / SIGTERM as a watch-channel flag so the poller can
/// finish the block in flight before stopping.
fn spawn_shutdown_listener() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(s) => s,
                    Err(err) => {
                        warn!(%err, "SIGTERM handler unavailable");
                        let _ = ctrl_c.await;
                        let _ = tx.send(true);
                        return;
                    }
                };
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }
        info!("shutdown requested");
        let _ = tx.send(true);
    });
    rx
}

async fn cmd_run() -> Result<()> {
    let config = config_from_env()?;
    let store = Arc::new(open_store(&config).await?);
    let client = HttpChainClient::new(config.clone())?;

    let shutdown = spawn_shutdown_listener();
    let mut poller = Poller::new(client, Arc::clone(&store), config);
    poller.run(shutdown).await?;

    store.checkpoint().await?;
    store.close().await;
    info!("indexer stopped");
    Ok(())
}

async fn cmd_populate() -> Result<()> {
    let config = config_from_env()?;
    let store = open_store(&config).await?;
    let client = HttpChainClient::new(config.clone())?;

    let resolved = populate_sats(&client, &store, config.max_trace_depth).await?;
    println!("Resolved sats for {resolved} record(s)");

    let assigned = assign_inscriptions(&client, &store).await?;
    println!("Assigned inscriptions to {assigned} record(s)");

    store.close().await;
    Ok(())
}

async fn cmd_validate() -> Result<()> {
    let config = config_from_env()?;
    let store = open_store(&config).await?;
    let client = HttpChainClient::new(config.clone())?;

    let report = validate_assigned(&client, &store).await?;
    println!("Checked {} assigned record(s)", report.total);
    println!("  valid:    {}", report.valid);
    println!("  invalid:  {}", report.invalid);
    println!("  replaced: {}", report.replaced);
    println!("  cleared:  {}", report.cleared);
    if !report.reasons.is_empty() {
        println!("  failure reasons:");
        for (reason, count) in &report.reasons {
            println!("    {reason}: {count}");
        }
    }

    store.close().await;
    Ok(())
}

async fn cmd_export(path: Option<&str>) -> Result<()> {
    let config = config_from_env()?;
    let store = open_store(&config).await?;

    let records = store.find_all().await?;
    let stats = store.stats().await?;
    let export = serde_json::json!({
        "exported_at": Utc::now().to_rfc3339(),
        "stats": {
            "total": stats.total,
            "with_sat": stats.with_sat,
            "with_inscription": stats.with_inscription,
            "unique_checksums": stats.unique_checksums,
        },
        "labitbus": records,
    });

    let path = path.unwrap_or("docs/db_export.json");
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    std::fs::write(path, serde_json::to_string_pretty(&export)?)
        .with_context(|| format!("writing {path}"))?;
    println!("Exported {} record(s) to {path}", stats.total);

    store.close().await;
    Ok(())
}

async fn cmd_reset() -> Result<()> {
    let config = config_from_env()?;
    let store = open_store(&config).await?;
    store.reset().await?;
    store.close().await;
    println!("Database reset: records and cursor cleared");
    Ok(())
}

fn cmd_info() {
    let config = config_from_env().unwrap_or_default();
    println!("labitbu v{}", env!("CARGO_PKG_VERSION"));
    println!("  Database:        {}", config.db_path);
    println!("  bitcoind RPC:    {}", config.bitcoind_rpc_url);
    println!("  ord API:         {}", config.ord_api_url);
    println!("  esplora API:     {}", config.esplora_api_url);
    println!("  Start height:    {}", config.start_height);
    println!("  Poll interval:   {}ms", config.poll_interval_ms);
    println!("  Error retry:     {}ms", config.error_retry_delay_ms);
    println!("  Max trace depth: {}", config.max_trace_depth);
}
