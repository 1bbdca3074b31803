//! Clock skew calibration and validity-window retries.
//!
//! The remote API rejects a `valid_from` that is not in the future by its
//! own clock. Two corrections are applied to every window:
//!
//! - a one-off skew measurement taken at startup with a throwaway request
//! - a lead that grows each time a window is still rejected

use chrono::{TimeDelta, Utc};
use spotfleet_reconcile::SpotRequest;
use tracing::{debug, info, warn};

use super::SpotProvisioner;
use crate::error::{ProvisionerError, ProvisionerResult};

impl SpotProvisioner {
    /// Measure the skew between the local and remote clocks.
    ///
    /// Creates one request with a window far in the future, compares its
    /// remote creation time with the local submission time, then cancels it.
    /// If the request cannot be created the skew stays as it was (zero on a
    /// fresh engine); the growing launch offset compensates on its own.
    pub async fn approximate_clock_skew(&mut self) -> TimeDelta {
        debug!("Launching spot request to approximate clock skew against the remote API");

        let local = Utc::now();
        let valid_from = match self
            .clock
            .valid_from_with_lead(local, self.settings.tuning.calibration_lead)
        {
            Ok(valid_from) => valid_from,
            Err(e) => {
                warn!(error = %e, "Cannot compute calibration window, assuming minimal clock skew");
                return self.clock.approximate_clock_skew();
            }
        };

        let input = self.launch_input(1, valid_from);
        let created = match self.spot_api.request_spot_instances(&input).await {
            Ok(created) => created,
            Err(e) => {
                info!(
                    error = %e,
                    "Error launching calibration spot request, assuming minimal clock skew"
                );
                return self.clock.approximate_clock_skew();
            }
        };

        let Some(remote) = created.first().map(|req| req.creation_time) else {
            warn!("Calibration call created no spot request, assuming minimal clock skew");
            return self.clock.approximate_clock_skew();
        };

        match self.clock.calibrate(local, remote) {
            Ok(skew) => info!(
                approximate_clock_skew_secs = skew.num_seconds(),
                local_time = %local,
                remote_time = %remote,
                "Remote API clock is approximately {}s ahead of the local clock",
                skew.num_seconds()
            ),
            Err(e) => warn!(error = %e, "Cannot record clock skew measurement"),
        }

        let ids: Vec<String> = created.iter().map(|req| req.id.clone()).collect();
        self.cancel_calibration_requests(&ids).await;

        self.clock.approximate_clock_skew()
    }

    /// Cancel the throwaway calibration request.
    ///
    /// A freshly created request may not be visible to cancellation yet, so
    /// "not found" is retried after a fixed delay. Any other error ends the
    /// cleanup; a stray request far in the future is harmless.
    async fn cancel_calibration_requests(&self, ids: &[String]) {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            debug!(spot_requests = ?ids, attempts, "Cleaning up calibration spot request");

            match self.spot_api.cancel_spot_requests(ids).await {
                Ok(()) => {
                    debug!(spot_requests = ?ids, attempts, "Cleaned up calibration spot request");
                    return;
                }
                Err(e) if e.is_spot_request_not_found() => {
                    debug!(
                        error = %e,
                        attempts,
                        "Calibration spot request not visible yet, retrying cancellation"
                    );
                    tokio::time::sleep(self.settings.tuning.cancel_retry_delay).await;
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        spot_requests = ?ids,
                        "Cannot cancel calibration spot request, leaving it in place"
                    );
                    return;
                }
            }
        }
    }

    /// Create `count` requests, growing the launch offset whenever the API
    /// rejects the validity window as not in the future.
    ///
    /// Gives up after `max_launch_attempts` attempts with the last error.
    /// Errors other than a rejected window are returned immediately. A
    /// successful dry run yields no requests.
    pub async fn create_requests_correcting_for_clock_skew(
        &mut self,
        count: u32,
    ) -> ProvisionerResult<Vec<SpotRequest>> {
        let max_attempts = self.settings.tuning.max_launch_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let valid_from = self.clock.valid_from(Utc::now())?;
            let input = self.launch_input(count, valid_from);

            let err = match self.spot_api.request_spot_instances(&input).await {
                Ok(created) => return Ok(created),
                Err(err) => err,
            };

            if err.is_dry_run() && input.dry_run {
                info!(count, "Dry run accepted spot request creation, nothing was created");
                return Ok(Vec::new());
            }

            if !err.is_invalid_time() {
                warn!(error = %err, attempt, "Error launching spot requests");
                return Err(ProvisionerError::Launch(err));
            }

            let offset = self.clock.grow();
            info!(
                error = %err,
                attempt,
                launch_time_offset_secs = offset.as_secs(),
                "Validity window rejected as not in the future, increasing launch offset"
            );

            if attempt >= max_attempts {
                return Err(ProvisionerError::Launch(err));
            }
        }
    }
}
