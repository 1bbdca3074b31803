//! Remote cloud API interfaces.
//!
//! The provisioner talks to two remote APIs:
//! - the spot request API (create, describe, cancel)
//! - the instance API (describe, tag, terminate), shared with on-demand
//!   provisioning
//!
//! Both are injected as trait objects. An in-memory implementation is
//! provided for tests and local runs.

mod error;
mod simulated;
mod types;

use async_trait::async_trait;
use spotfleet_reconcile::{ResourceDescription, SpotRequest};

pub use error::{
    CloudError, CloudResult, DRY_RUN_OPERATION, INSTANCE_NOT_FOUND, INVALID_TIME,
    SPOT_REQUEST_NOT_FOUND,
};
pub use simulated::{CallKind, SimulatedCloud};
pub use types::{
    BlockDeviceMapping, LaunchSpecification, NetworkInterfaceSpecification, RequestSelector,
    SpotLaunchInput, SpotRequestFilter, Tag, TagSpecification, SPOT_REQUEST_RESOURCE_TYPE,
};

/// Spot request API.
#[async_trait]
pub trait SpotRequestApi: Send + Sync {
    /// Create `input.instance_count` spot requests in one call.
    async fn request_spot_instances(&self, input: &SpotLaunchInput)
        -> CloudResult<Vec<SpotRequest>>;

    /// Describe the spot requests matching a filter.
    async fn describe_spot_requests(
        &self,
        filter: &SpotRequestFilter,
    ) -> CloudResult<Vec<SpotRequest>>;

    /// Cancel spot requests by id.
    async fn cancel_spot_requests(&self, ids: &[String]) -> CloudResult<()>;
}

/// Instance API.
#[async_trait]
pub trait InstanceApi: Send + Sync {
    /// Describe instances by id.
    async fn describe_instances(&self, ids: &[String]) -> CloudResult<Vec<ResourceDescription>>;

    /// Apply tags to instances.
    async fn create_tags(&self, resources: &[String], tags: &[Tag]) -> CloudResult<()>;

    /// Terminate instances by id.
    async fn terminate_instances(&self, ids: &[String]) -> CloudResult<()>;
}
