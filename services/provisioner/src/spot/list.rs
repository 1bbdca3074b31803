//! The per-tick reconciliation pass.

use spotfleet_reconcile::{assemble_instances, Instance, ReconcilePass, RequestSet};
use tracing::{debug, error};

use super::SpotProvisioner;
use crate::cloud::RequestSelector;
use crate::error::{ProvisionerError, ProvisionerResult};

impl SpotProvisioner {
    /// Reconcile the tracked requests with the remote view and return the
    /// resource handles the scheduler should count.
    ///
    /// Real instances come first, then one placeholder per request that has
    /// no instance yet. Instances that are terminated or shutting down are
    /// never returned.
    pub async fn list(&mut self) -> ProvisionerResult<Vec<Instance>> {
        let visible: RequestSet = self
            .spot_api
            .describe_spot_requests(&self.live_filter())
            .await
            .map_err(ProvisionerError::DescribeSpotRequests)?
            .into_iter()
            .collect();

        let mut pass = ReconcilePass::begin(&mut self.tracked, &visible);

        self.tag_instances(&visible.instance_ids()).await;

        let found = self.lookup_requests(pass.missing_ids()).await?;
        pass.absorb_lookup(&mut self.tracked, &found);

        for req in pass.needs_attention() {
            error!(
                spot_request_id = %req.id,
                spot_request_status_code = req.status_code_str(),
                spot_request_status_message = req.status_message_str(),
                spot_request_creation_time = %req.creation_time,
                "A spot request cannot be fulfilled and may require user intervention"
            );
        }

        let summary = pass.summary(&self.tracked);
        debug!(
            log_type = "list_spot.summary",
            total_num_requests_being_tracked = summary.tracked,
            num_visible_as_active_in_api = summary.visible_in_api,
            num_tracked_but_not_visible_in_api = summary.tracked_but_not_visible,
            num_no_longer_tracked_due_to_terminal_state = summary.no_longer_tracked,
            not_visible_ids = ?summary.not_visible_ids,
            "Updated the list of active spot requests being tracked"
        );

        self.terminate_canceled_but_running().await?;

        self.build_instance_list().await
    }

    /// Look up requests by id. Unknown ids are skipped by the API.
    async fn lookup_requests(&self, ids: Vec<String>) -> ProvisionerResult<RequestSet> {
        if ids.is_empty() {
            return Ok(RequestSet::new());
        }

        let found = self
            .spot_api
            .describe_spot_requests(&self.filter(RequestSelector::Ids(ids)))
            .await
            .map_err(ProvisionerError::DescribeSpotRequests)?;
        Ok(found.into_iter().collect())
    }

    /// Terminate instances whose request was cancelled after fulfilment.
    ///
    /// Termination failures are logged; the next pass finds the same
    /// requests again.
    async fn terminate_canceled_but_running(&self) -> ProvisionerResult<()> {
        let orphaned: RequestSet = self
            .spot_api
            .describe_spot_requests(&self.canceled_but_running_filter())
            .await
            .map_err(ProvisionerError::DescribeSpotRequests)?
            .into_iter()
            .collect();

        let instance_ids = orphaned.instance_ids();
        if instance_ids.is_empty() {
            return Ok(());
        }

        debug!(
            spot_requests = ?orphaned.ids(),
            instances = ?instance_ids,
            "Terminating instances associated with canceled spot requests"
        );
        if let Err(e) = self.instance_api.terminate_instances(&instance_ids).await {
            debug!(
                error = %e,
                instances = ?instance_ids,
                "Cannot terminate instances associated with canceled spot requests"
            );
        }
        Ok(())
    }

    async fn build_instance_list(&self) -> ProvisionerResult<Vec<Instance>> {
        let instance_ids = self.tracked.instance_ids();
        let described = if instance_ids.is_empty() {
            Vec::new()
        } else {
            self.instance_api
                .describe_instances(&instance_ids)
                .await
                .map_err(ProvisionerError::DescribeInstances)?
        };

        let assembled = assemble_instances(&self.tracked, &described);
        for inst in assembled.unknown_state() {
            error!(instance_id = %inst.id, "Unknown instance state");
        }

        debug!(
            log_type = "list_spot.return_combined_list",
            real = assembled.real.len(),
            placeholders = assembled.placeholders.len(),
            total = assembled.len(),
            "Returning list of instances"
        );

        Ok(assembled.into_combined())
    }
}
