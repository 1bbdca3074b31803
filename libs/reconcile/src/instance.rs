//! Resource handles handed back to the capacity scheduler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::request::SpotRequest;
use crate::vocabulary::ResourceState;

/// Scheduler-facing lifecycle state of a resource handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    Starting,
    Running,
    Stopping,
    Stopped,
    Terminating,
    Terminated,
    /// Placeholder for a spot request that has no instance yet.
    SpotRequestPendingAws,
    Unknown,
}

impl InstanceState {
    /// Map a remote resource state onto the scheduler vocabulary.
    pub fn from_resource(state: &ResourceState) -> Self {
        match state {
            ResourceState::Pending => Self::Starting,
            ResourceState::Running => Self::Running,
            ResourceState::Stopping => Self::Stopping,
            ResourceState::Stopped => Self::Stopped,
            ResourceState::ShuttingDown => Self::Terminating,
            ResourceState::Terminated => Self::Terminated,
            ResourceState::Other(_) => Self::Unknown,
        }
    }
}

impl std::fmt::Display for InstanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Terminating => "terminating",
            Self::Terminated => "terminated",
            Self::SpotRequestPendingAws => "spot_request_pending_aws",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// A resource handle: either a real instance or a pending-request stand-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub launch_time: DateTime<Utc>,
    pub agent_name: String,
    pub state: InstanceState,
}

impl Instance {
    /// Stand-in for a request that has not launched an instance yet.
    ///
    /// The request id doubles as the handle id, which is how terminate
    /// recognises it later.
    pub fn placeholder(request: &SpotRequest) -> Self {
        Self {
            id: request.id.clone(),
            launch_time: request.creation_time,
            agent_name: request.id.clone(),
            state: InstanceState::SpotRequestPendingAws,
        }
    }

    /// Build a handle from a remote instance description.
    pub fn from_description(description: &ResourceDescription) -> Self {
        Self {
            id: description.instance_id.clone(),
            launch_time: description.launch_time,
            agent_name: description.instance_id.clone(),
            state: InstanceState::from_resource(&description.state),
        }
    }

    /// Returns true for pending-request stand-ins.
    pub fn is_placeholder(&self) -> bool {
        self.state == InstanceState::SpotRequestPendingAws
    }
}

/// Remote description of a compute instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescription {
    pub instance_id: String,
    pub state: ResourceState,
    pub launch_time: DateTime<Utc>,
}
