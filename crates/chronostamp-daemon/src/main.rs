//! chronostamp-daemon - ChronoStamp claim service
//!
//! Wires configuration, the signer service, the ledger, and the claim
//! orchestrator together and serves the HTTP API. The signer's
//! key/address consistency is checked once at startup so a deployment
//! with the wrong key fails before issuing a single authorization.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chronostamp_core::chain::ReceiptChecker;
use chronostamp_core::claim::ClaimOrchestrator;
use chronostamp_core::config::ServiceConfig;
use chronostamp_core::ledger::ClaimLedger;
use chronostamp_core::signer::SignerService;
use clap::Parser;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// chronostamp daemon - proof-of-attendance claim service
#[derive(Parser, Debug)]
#[command(name = "chronostamp-daemon")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the service configuration file
    #[arg(short, long, default_value = "chronostamp.toml")]
    config: PathBuf,

    /// Override the ledger database path
    #[arg(long)]
    ledger_db: Option<PathBuf>,

    /// Override the HTTP listen address
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = ServiceConfig::from_file(&args.config)
        .with_context(|| format!("failed to load config from {}", args.config.display()))?;
    if let Some(path) = args.ledger_db {
        config.ledger_db = path;
    }
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }

    let signer = SignerService::new(config.signer_config()?).context("failed to load signer key")?;
    signer
        .validate_config()
        .context("signer key does not match the configured address")?;
    info!(address = %signer.address(), environment = ?config.environment, "signer ready");

    let ledger = ClaimLedger::open(&config.ledger_db)
        .with_context(|| format!("failed to open ledger at {}", config.ledger_db.display()))?;

    let receipt_checker = config.chain_rpc_url.as_ref().map(|url| {
        ReceiptChecker::new(url.clone(), config.receipt_timeout_ms.map(Duration::from_millis))
    });
    if receipt_checker.is_none() {
        info!("no chain rpc configured; receipt verification disabled");
    }

    let orchestrator = Arc::new(ClaimOrchestrator::new(ledger, signer, receipt_checker));
    let router = chronostamp_daemon::http::router(orchestrator);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    info!(addr = %config.listen_addr, "claim service listening");

    axum::serve(listener, router)
        .await
        .context("http server exited")?;

    Ok(())
}
