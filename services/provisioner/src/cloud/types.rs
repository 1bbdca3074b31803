//! Request and filter types for the remote cloud APIs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spotfleet_reconcile::{RequestState, StatusCode};

/// Resource type for tags applied to spot requests at creation.
pub const SPOT_REQUEST_RESOURCE_TYPE: &str = "spot-instances-request";

/// A key/value tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Tags to apply to a resource created by a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSpecification {
    pub resource_type: String,
    pub tags: Vec<Tag>,
}

/// Root volume attached to each instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDeviceMapping {
    pub device_name: String,
    pub volume_size_gb: u32,
    pub volume_type: String,
    pub delete_on_termination: bool,
}

/// Primary network interface of each instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInterfaceSpecification {
    pub device_index: u32,
    pub associate_public_ip_address: bool,
    pub delete_on_termination: bool,
    pub description: String,
    pub subnet_id: Option<String>,
    pub security_group_ids: Vec<String>,
}

/// What to launch once a request is fulfilled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchSpecification {
    pub image_id: String,
    pub instance_type: String,
    pub key_name: String,
    /// Base64-encoded user data.
    pub user_data: String,
    pub block_device_mappings: Vec<BlockDeviceMapping>,
    pub network_interfaces: Vec<NetworkInterfaceSpecification>,
    pub iam_instance_profile_arn: Option<String>,
}

/// A batched spot request creation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpotLaunchInput {
    /// Idempotency token shared by every request of the call.
    pub client_token: String,
    pub dry_run: bool,
    pub instance_count: u32,
    pub instance_interruption_behavior: String,
    pub launch_specification: LaunchSpecification,
    pub tag_specifications: Vec<TagSpecification>,
    /// Earliest time the provider may fulfil the requests, by its clock.
    pub valid_from: DateTime<Utc>,
    /// Price ceiling. `None` means the on-demand price.
    pub spot_price: Option<String>,
}

/// Which spot requests a describe call should return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestSelector {
    /// Requests in any of these states.
    States(Vec<RequestState>),
    /// Requests carrying this status code.
    StatusCode(StatusCode),
    /// Requests with these ids. Unknown ids are skipped, not rejected.
    Ids(Vec<String>),
}

/// Filter for describing spot requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotRequestFilter {
    /// Every tag must be present with the given value.
    pub tags: Vec<Tag>,
    pub selector: RequestSelector,
}
