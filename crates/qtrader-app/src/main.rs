//! qtrader - live strategy signal stream with synthetic fallback.

use anyhow::Result;
use clap::Parser;
use qtrader_app::{AppConfig, Session};
use qtrader_dashboard::DashboardState;
use tracing::{error, info};

/// Consume the live tick stream and publish consensus and rolling statistics.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via QTRADER_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Backend base URL, or `local` (can also be set via QTRADER_BACKEND_URL env var)
    #[arg(long)]
    backend_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Must run before any TLS connection
    qtrader_ws::init_crypto();

    let args = Args::parse();

    qtrader_telemetry::init_logging()?;

    info!("Starting qtrader v{}", env!("CARGO_PKG_VERSION"));

    let mut config = AppConfig::load(args.config)?;
    config.apply_backend_override(args.backend_url);
    info!(
        backend_url = ?config.transport.backend_url,
        dashboard = config.dashboard.enabled,
        "Configuration loaded"
    );

    let state = DashboardState::new();
    let mut session = Session::new(&config, state.clone())?;
    let shutdown = session.shutdown_handle();

    if config.dashboard.enabled {
        let dashboard_config = config.dashboard.clone();
        let token = shutdown.token();
        tokio::spawn(async move {
            if let Err(e) = qtrader_dashboard::run_server(state, dashboard_config, token).await {
                error!(error = %e, "Dashboard server failed");
            }
        });
    }

    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, shutting down");
                ctrl_c.shutdown();
            }
            Err(e) => error!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });

    session.run().await?;

    info!("qtrader stopped");
    Ok(())
}
