//! Periodic reconciliation driver.
//!
//! The tick worker asks the provisioner actor for a reconciliation pass on a
//! fixed interval. With a target size configured it also launches the
//! shortfall, counting pending-request placeholders as capacity.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::actors::{ActorError, ProvisionerHandle};

/// Tick worker configuration.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Interval between reconciliation passes.
    pub interval: Duration,

    /// Desired number of handles. `None` only reconciles.
    pub target_instances: Option<usize>,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            target_instances: None,
        }
    }
}

/// Drives reconciliation passes until shutdown.
pub struct TickWorker {
    provisioner: ProvisionerHandle,
    config: TickConfig,
}

impl TickWorker {
    pub fn new(provisioner: ProvisionerHandle, config: TickConfig) -> Self {
        Self {
            provisioner,
            config,
        }
    }

    /// Run until the shutdown signal fires or the actor goes away.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            target_instances = ?self.config.target_instances,
            "Starting tick worker"
        );

        let mut consecutive_failures = 0u32;
        let mut interval_timer = tokio::time::interval(self.config.interval);

        loop {
            tokio::select! {
                _ = interval_timer.tick() => {
                    match self.tick().await {
                        Ok(()) => consecutive_failures = 0,
                        Err(e) => {
                            consecutive_failures += 1;
                            if consecutive_failures <= 3 {
                                warn!(error = %e, consecutive_failures, "Reconciliation pass failed");
                            } else {
                                error!(
                                    error = %e,
                                    consecutive_failures,
                                    "Reconciliation pass failed repeatedly"
                                );
                            }
                            if matches!(e, ActorError::ActorStopped) {
                                break;
                            }
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Tick worker shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// One pass, plus a launch for any shortfall.
    pub async fn tick(&self) -> Result<(), ActorError> {
        let handles = self.provisioner.list().await?;
        let pending = handles.iter().filter(|h| h.is_placeholder()).count();
        debug!(
            total = handles.len(),
            pending,
            "Reconciliation pass complete"
        );

        let Some(target) = self.config.target_instances else {
            return Ok(());
        };

        let shortfall = target.saturating_sub(handles.len());
        if shortfall > 0 {
            let count = i32::try_from(shortfall).unwrap_or(i32::MAX);
            info!(target, current = handles.len(), count, "Launching to reach target size");
            self.provisioner.launch(count).await?;
        }
        Ok(())
    }
}
