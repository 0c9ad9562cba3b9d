use std::sync::Arc;

use anyhow::{bail, Context};
use dotenv::dotenv;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use appointment_cell::services::notifications::{BroadcastNotifier, EventReceiver};
use appointment_cell::services::store::SupabaseAppointmentStore;
use maintenance_cell::{MaintenanceConfig, MaintenanceScheduler};
use shared_config::AppConfig;
use shared_utils::clock::ClinicClock;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting clinic maintenance scheduler");

    let config = AppConfig::from_env();
    if !config.is_configured() {
        bail!("SUPABASE_URL and SUPABASE_SERVICE_KEY must be set");
    }

    let clock = Arc::new(ClinicClock::from_config(&config));
    let store = Arc::new(SupabaseAppointmentStore::new(&config));
    let notifier = Arc::new(BroadcastNotifier::new());
    tokio::spawn(log_events(notifier.subscribe()));

    let scheduler = Arc::new(MaintenanceScheduler::standard(
        store,
        notifier,
        clock,
        &MaintenanceConfig::from_app_config(&config),
    ));

    let running = Arc::clone(&scheduler);
    let handle = tokio::spawn(async move { running.start().await });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    scheduler.shutdown().await;
    handle.await.context("scheduler task panicked")??;

    info!("Clinic maintenance scheduler stopped");
    Ok(())
}

/// Downstream delivery lives outside this process; record what would be sent.
async fn log_events(mut events: EventReceiver) {
    loop {
        match events.recv().await {
            Ok(payload) => info!(target: "scheduling_events", "{}", payload),
            Err(RecvError::Lagged(skipped)) => warn!("Event log lagged, {} events skipped", skipped),
            Err(RecvError::Closed) => break,
        }
    }
}
