mod bootstrap;
mod config;
mod error;
mod oracle;
mod orders;
mod reconcile;
mod settlement;
mod source;
mod store;

use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::error::AppResult;

// Initialize logging and tracing
fn init_tracing() {
    let filter = std::env::var("RUST_LOG")
        .or_else(|_| std::env::var("LOGLEVEL").map(|level| level.to_lowercase()))
        .unwrap_or_else(|_| "info".into());

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(filter))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn run() -> AppResult<()> {
    let config = Config::from_env()?;
    config.validate()?;

    info!(
        "⚙️  Period {}ms, source {:?}, settlement {:?}, max concurrency {}",
        config.procedure_period_ms, config.order_source, config.settlement_mode, config.max_concurrency
    );

    let scheduler = bootstrap::initialize_drone(&config).await?;

    // Listen for termination as soon as the drone is up; the loop checks it between cycles
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(());
    });

    let cycles = scheduler
        .run_until(async {
            let _ = shutdown_rx.await;
        })
        .await?;

    info!("✓ Drone stopped after {} cycles", cycles);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("⚠️  Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("⚠️  Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("🛑 Ctrl-C received, finishing current cycle"),
        _ = terminate => info!("🛑 SIGTERM received, finishing current cycle"),
    }
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    init_tracing();

    info!("Starting drone service...");

    let result = run().await;
    info!("Shutdown...");

    if let Err(e) = result {
        error!("❌ Drone stopped on error: {}", e);
        std::process::exit(1);
    }
}
