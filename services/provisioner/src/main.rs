//! Spotfleet provisioner
//!
//! Runs the spot provisioner against the in-memory simulated cloud. The
//! simulated provider fulfils listed requests and finishes shutdowns once
//! per tick, so the reconciliation loop can be observed end to end.
//!
//! ## Architecture
//!
//! - **Provisioner actor**: owns the engine and serializes all access
//! - **Tick worker**: asks for a reconciliation pass every interval and
//!   launches any shortfall against the target size
//! - **Simulated provider**: stands in for the remote side

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::TimeDelta;
use tokio::sync::watch;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use spotfleet_provisioner::actors::DEFAULT_MAILBOX_SIZE;
use spotfleet_provisioner::cloud::SimulatedCloud;
use spotfleet_provisioner::{Config, ProvisionerActor, SpotProvisioner, TickConfig, TickWorker};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str())),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting spotfleet provisioner");
    info!(
        resource_pool = %config.spot.pool.resource_pool,
        instance_type = %config.spot.launch.instance_type,
        tick_interval_secs = config.tick_interval_secs,
        target_instances = ?config.target_instances,
        "Configuration loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let interval = Duration::from_secs(config.tick_interval_secs.max(1));

    // Create the cloud (simulated for now)
    let cloud = Arc::new(
        SimulatedCloud::new()
            .with_clock_skew(TimeDelta::seconds(config.simulation.clock_skew_secs))
            .with_listing_lag(config.simulation.listing_lag),
    );

    let provider_handle = tokio::spawn({
        let cloud = Arc::clone(&cloud);
        let mut shutdown_rx = shutdown_rx.clone();
        async move {
            let mut timer = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        let fulfilled = cloud.fulfill_all();
                        cloud.finish_shutdowns();
                        if !fulfilled.is_empty() {
                            debug!(instances = ?fulfilled, "[SIM] Provider tick");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        }
    });

    let engine = SpotProvisioner::new(cloud.clone(), cloud, config.spot.clone());
    let (provisioner, actor_ref) = ProvisionerActor::new(engine).start(DEFAULT_MAILBOX_SIZE);

    let worker = TickWorker::new(
        provisioner.clone(),
        TickConfig {
            interval,
            target_instances: config.target_instances,
        },
    );
    let worker_handle = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        async move { worker.run(shutdown_rx).await }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        _ = worker_handle => {
            info!("Tick worker exited");
        }
    }

    let _ = shutdown_tx.send(true);

    if let Ok(snapshot) = provisioner.snapshot().await {
        info!(
            tracked = snapshot.tracked_ids.len(),
            approximate_clock_skew_secs = snapshot.approximate_clock_skew_secs,
            launch_time_offset_secs = snapshot.launch_time_offset_secs,
            passes = snapshot.passes,
            "Final provisioner state"
        );
    }

    actor_ref.stop();
    actor_ref.join().await;
    let _ = provider_handle.await;

    info!("Provisioner shutdown complete");
    Ok(())
}
