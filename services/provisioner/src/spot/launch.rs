//! Creating and releasing spot capacity.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use spotfleet_reconcile::{partition_handles, SpotRequest};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::SpotProvisioner;
use crate::cloud::{
    BlockDeviceMapping, LaunchSpecification, NetworkInterfaceSpecification, SpotLaunchInput,
    TagSpecification, SPOT_REQUEST_RESOURCE_TYPE,
};
use crate::error::ProvisionerResult;

const ROOT_DEVICE_NAME: &str = "/dev/sda1";
const ROOT_VOLUME_TYPE: &str = "gp2";
const INTERRUPTION_BEHAVIOR: &str = "terminate";
const NETWORK_INTERFACE_DESCRIPTION: &str = "network interface created by spotfleet";

impl SpotProvisioner {
    /// Request `count` more instances.
    ///
    /// All requests are created by one call sharing one idempotency token and
    /// are tracked immediately, so a pass that runs before the API lists them
    /// still counts them. Nothing is tracked if the call fails, or in dry-run
    /// mode.
    pub async fn launch(&mut self, count: i32) -> ProvisionerResult<()> {
        let Ok(count) = u32::try_from(count) else {
            return Ok(());
        };
        if count == 0 {
            return Ok(());
        }

        info!(log_type = "launch_spot.start", count, "Launching spot requests");

        let created = match self.create_requests_correcting_for_clock_skew(count).await {
            Ok(created) => created,
            Err(e) => {
                error!(error = %e, count, "Cannot launch spot requests");
                return Err(e);
            }
        };

        for request in created {
            info!(
                log_type = "launch_spot.creating_request",
                spot_request_id = %request.id,
                state = %request.state,
                "Creating spot request"
            );
            self.tracked.add(SpotRequest {
                instance_id: None,
                ..request
            });
        }

        Ok(())
    }

    /// Release the given handles.
    ///
    /// Handles carrying the spot request prefix are cancelled, everything
    /// else is terminated as an instance. Both halves are best effort and
    /// independent of each other.
    pub async fn terminate(&mut self, handles: &[String]) {
        if handles.is_empty() {
            return;
        }

        let plan = partition_handles(handles);
        debug!(
            log_type = "terminate_spot.start",
            instances = ?plan.instances,
            spot_requests = ?plan.spot_requests,
            "Terminating {} instances and {} spot requests",
            plan.instances.len(),
            plan.spot_requests.len()
        );

        if !plan.instances.is_empty() {
            info!(
                instances = ?plan.instances,
                "Terminating instances associated with fulfilled spot requests"
            );
            if let Err(e) = self.instance_api.terminate_instances(&plan.instances).await {
                error!(error = %e, instances = ?plan.instances, "Cannot terminate instances");
            }
        }

        if plan.spot_requests.is_empty() {
            return;
        }

        match self.spot_api.cancel_spot_requests(&plan.spot_requests).await {
            Ok(()) => {
                for id in &plan.spot_requests {
                    self.tracked.delete(id);
                }
                debug!(
                    log_type = "terminate_spot.terminated_spot_requests",
                    spot_requests = ?plan.spot_requests,
                    "Cancelled {} spot requests",
                    plan.spot_requests.len()
                );
            }
            Err(e) => {
                error!(error = %e, spot_requests = ?plan.spot_requests, "Cannot cancel spot requests");
            }
        }
    }

    /// Tag every fulfilled instance in `instance_ids`.
    pub(super) async fn tag_instances(&self, instance_ids: &[String]) {
        if instance_ids.is_empty() {
            return;
        }

        let tags = self.resource_tags();
        if let Err(e) = self.instance_api.create_tags(instance_ids, &tags).await {
            warn!(
                error = %e,
                instances = ?instance_ids,
                "Unable to tag instances launched by spot requests"
            );
        }
    }

    /// Build the creation call for `count` requests.
    pub(super) fn launch_input(&self, count: u32, valid_from: DateTime<Utc>) -> SpotLaunchInput {
        let launch = &self.settings.launch;

        SpotLaunchInput {
            client_token: Uuid::new_v4().to_string(),
            dry_run: self.settings.tuning.dry_run,
            instance_count: count,
            instance_interruption_behavior: INTERRUPTION_BEHAVIOR.to_string(),
            launch_specification: LaunchSpecification {
                image_id: launch.image_id.clone(),
                instance_type: launch.instance_type.clone(),
                key_name: launch.ssh_key_name.clone(),
                user_data: STANDARD.encode(launch.user_data.as_bytes()),
                block_device_mappings: vec![BlockDeviceMapping {
                    device_name: ROOT_DEVICE_NAME.to_string(),
                    volume_size_gb: launch.root_volume_size,
                    volume_type: ROOT_VOLUME_TYPE.to_string(),
                    delete_on_termination: true,
                }],
                network_interfaces: vec![NetworkInterfaceSpecification {
                    device_index: 0,
                    associate_public_ip_address: launch.public_ip,
                    delete_on_termination: true,
                    description: NETWORK_INTERFACE_DESCRIPTION.to_string(),
                    subnet_id: launch.subnet_id.clone(),
                    security_group_ids: launch.security_group_id.iter().cloned().collect(),
                }],
                iam_instance_profile_arn: launch.iam_instance_profile_arn.clone(),
            },
            tag_specifications: vec![TagSpecification {
                resource_type: SPOT_REQUEST_RESOURCE_TYPE.to_string(),
                tags: self.resource_tags(),
            }],
            valid_from,
            spot_price: launch.spot_max_price.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cloud::SimulatedCloud;
    use crate::config::SpotSettings;

    #[test]
    fn test_launch_input_shape() {
        let cloud = Arc::new(SimulatedCloud::new());
        let mut settings = SpotSettings::default();
        settings.launch.user_data = "#!/bin/sh\necho hi\n".to_string();
        settings.launch.security_group_id = Some("sg-1".to_string());
        settings.launch.spot_max_price = Some("0.25".to_string());
        let engine = SpotProvisioner::new(cloud.clone(), cloud, settings);

        let valid_from = Utc::now();
        let input = engine.launch_input(3, valid_from);
        let again = engine.launch_input(3, valid_from);

        assert_eq!(input.instance_count, 3);
        assert_eq!(input.valid_from, valid_from);
        assert_ne!(input.client_token, again.client_token);
        assert_eq!(input.spot_price.as_deref(), Some("0.25"));
        assert_eq!(input.instance_interruption_behavior, "terminate");
        assert!(!input.dry_run);

        let spec = &input.launch_specification;
        assert_eq!(spec.user_data, STANDARD.encode("#!/bin/sh\necho hi\n"));
        assert_eq!(spec.block_device_mappings[0].device_name, "/dev/sda1");
        assert_eq!(spec.block_device_mappings[0].volume_type, "gp2");
        assert_eq!(spec.block_device_mappings[0].volume_size_gb, 200);
        assert_eq!(spec.network_interfaces[0].security_group_ids, vec!["sg-1".to_string()]);
        assert!(spec.network_interfaces[0].subnet_id.is_none());

        assert_eq!(input.tag_specifications.len(), 1);
        assert_eq!(
            input.tag_specifications[0].resource_type,
            "spot-instances-request"
        );
        assert_eq!(input.tag_specifications[0].tags.len(), 4);
    }
}
