use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use blueprint_cli::functions::scan_addons::{run_scan, ScanAction};
use blueprint_cli::functions::sync_index::{run_sync, summary_body};
use blueprint_cli::{server, AppState, Command, Config, HttpBackends};
use blueprint_core::config::{load_functions_config, FunctionEnv, ScanOverrides, SYNC_DOCUMENT_ENV};
use blueprint_core::health::{check_search_health, format_health_report};
use blueprint_core::sync::SyncMode;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    // Setup logging (stderr to keep stdout clean for reports)
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set default subscriber")?;

    // Parse command line arguments
    let config = Config::parse();

    let functions = load_functions_config(config.config.as_deref())
        .context("Failed to load functions configuration")?;
    let state = Arc::new(AppState::new(
        FunctionEnv::from_process(),
        functions,
        Arc::new(HttpBackends),
    ));

    // Execute command
    match config.command {
        Command::Serve { bind, port } => {
            server::serve(state, SocketAddr::new(bind, port))
                .await
                .context("HTTP server failed")?;
        }
        Command::Sync {
            force_full,
            delete_all,
        } => {
            sync(&state, SyncMode::from_flags(force_full, delete_all)).await?;
        }
        Command::Scan {
            quick,
            health,
            offset,
            max_iterations,
            batch_size,
            search_query,
        } => {
            let action = match (quick, health, offset) {
                (_, true, _) => ScanAction::Health,
                (true, _, _) => ScanAction::Quick,
                (_, _, Some(offset)) => ScanAction::Incremental(offset),
                _ => ScanAction::Full,
            };
            let overrides = ScanOverrides {
                max_iterations,
                batch_size,
                search_query,
                ..ScanOverrides::default()
            };
            scan(&state, action, &overrides).await?;
        }
        Command::SearchHealth { text } => {
            search_health(&state, text).await?;
        }
    }

    Ok(())
}

/// Run one sync pass and print the summary as JSON
async fn sync(state: &AppState, mode: SyncMode) -> anyhow::Result<()> {
    let api_key = state
        .appwrite_key(None)
        .context("No Appwrite API key configured")?;
    let summary = run_sync(state, &api_key, mode)
        .await
        .context("Index sync failed")?;

    println!("{}", serde_json::to_string_pretty(&summary_body(&summary))?);
    if summary.failed_count() > 0 {
        anyhow::bail!("{} index(es) failed to sync", summary.failed_count());
    }
    Ok(())
}

/// Run a scan or scan health check and print its report
async fn scan(
    state: &AppState,
    action: ScanAction,
    overrides: &ScanOverrides,
) -> anyhow::Result<()> {
    info!(?action, "Starting addon scan");
    let report = run_scan(state, action, overrides)
        .await
        .context("Addon scan failed")?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Print search engine health as JSON or text
async fn search_health(state: &AppState, text: bool) -> anyhow::Result<()> {
    state.env.require(SYNC_DOCUMENT_ENV)?;
    let search = state
        .backends
        .search(&state.env)
        .context("Failed to create search client")?;
    let report = check_search_health(search.as_ref(), &state.config.index_names()).await;

    if text {
        println!("{}", format_health_report(&report));
    } else {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}
