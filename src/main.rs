//! Gram Data - district summaries from the employment guarantee scheme open data
//!
//! Runs one "get district summary" request and prints the outcome as JSON, or
//! refreshes stored state data from upstream.

use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use gramdata::cli::{refresh_interval, Cli, Command, Config};
use gramdata::data::{months, UpstreamClient};
use gramdata::handler::DistrictService;
use gramdata::refresh::{self, RefreshConfig, RefreshHandle, RefreshMessage};

/// Sends logs to stderr so stdout carries only the JSON payload
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gramdata=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            error!(error = %err, "gramdata failed");
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, Box<dyn Error>> {
    let config = Config::from_cli(&cli);
    if config.api_key.is_none() {
        warn!("GOV_API_KEY is not set; upstream will likely reject requests");
    }

    let source = UpstreamClient::new(config.api_key.clone().unwrap_or_default())?
        .with_base_url(config.base_url.clone());
    let store = config.summary_store()?;

    match &cli.command {
        Command::Summary { fiscal_order, .. } => {
            let cache = config.cache_store()?;
            let service = DistrictService::new(source, cache, store);

            let request = cli.command.district_request().unwrap_or_default();
            let mut outcome = service.get_district_summary(&request).await;
            if *fiscal_order {
                if let Some(data) = outcome.data_mut() {
                    months::sort_fiscal(data);
                }
            }

            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(if outcome.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Refresh {
            watch: false,
            ..
        } => {
            let defaults = RefreshConfig::default();
            let summary =
                refresh::refresh_states(&source, &store, &defaults.states, defaults.concurrency)
                    .await;
            info!(
                updated = summary.updated.len(),
                skipped = summary.skipped.len(),
                failed = summary.failed.len(),
                "refresh finished"
            );
            Ok(if summary.failed.is_empty() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Refresh {
            watch: true,
            interval_secs,
        } => {
            let config = RefreshConfig {
                interval: refresh_interval(*interval_secs)?,
                ..RefreshConfig::default()
            };
            let mut handle = RefreshHandle::spawn(config, Arc::new(source), Arc::new(store));

            loop {
                tokio::select! {
                    message = handle.receiver.recv() => match message {
                        Some(RefreshMessage::RefreshStarted) => info!("refresh pass started"),
                        Some(RefreshMessage::StateUpdated { state, rows }) => {
                            info!(state = %state, rows, "state refreshed")
                        }
                        Some(RefreshMessage::RefreshError { state, error }) => {
                            warn!(state = %state, error = %error, "state refresh failed")
                        }
                        Some(RefreshMessage::RefreshCompleted(summary)) => info!(
                            updated = summary.updated.len(),
                            failed = summary.failed.len(),
                            "refresh pass completed"
                        ),
                        None => break,
                    },
                    _ = tokio::signal::ctrl_c() => {
                        info!("shutting down refresh");
                        break;
                    }
                }
            }
            handle.shutdown().await;
            Ok(ExitCode::SUCCESS)
        }
    }
}
