//! Remote state and status vocabularies.
//!
//! The provider documents these values but reserves the right to add new
//! ones, so every type here keeps unknown strings instead of rejecting them.

use crate::macros::define_vocabulary;

define_vocabulary! {
    /// Lifecycle state of a spot request as reported by the remote API.
    RequestState {
        /// Waiting to be fulfilled.
        Open => "open",
        /// Fulfilled, or in the process of being fulfilled.
        Active => "active",
        /// Terminal: the request or its instance went away.
        Closed => "closed",
        /// Terminal: cancelled by the owner.
        Cancelled => "cancelled" | "canceled",
        /// Terminal: rejected by the provider.
        Failed => "failed",
        /// Terminal: stopped by the provider.
        Disabled => "disabled",
    }
}

impl RequestState {
    /// Returns true for the non-terminal states (`open` and `active`).
    #[must_use]
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Open | Self::Active)
    }

    /// The states listed when querying for live requests.
    #[must_use]
    pub fn live() -> Vec<Self> {
        vec![Self::Open, Self::Active]
    }
}

define_vocabulary! {
    /// Status code attached to a spot request.
    StatusCode {
        PendingEvaluation => "pending-evaluation",
        PendingFulfillment => "pending-fulfillment",
        Fulfilled => "fulfilled",
        CapacityNotAvailable => "capacity-not-available",
        PriceTooLow => "price-too-low",
        BadParameters => "bad-parameters",
        ConstraintNotFulfillable => "constraint-not-fulfillable",
        LimitExceeded => "limit-exceeded",
        /// Compound terminal status: the request is cancelled but the
        /// instance it launched keeps running until terminated directly.
        RequestCanceledAndInstanceRunning => "request-canceled-and-instance-running",
        InstanceTerminatedByUser => "instance-terminated-by-user",
        CanceledBeforeFulfillment => "canceled-before-fulfillment",
    }
}

impl StatusCode {
    /// Problems reported on live requests that an operator should know about.
    #[must_use]
    pub fn needs_attention_while_live(&self) -> bool {
        matches!(self, Self::CapacityNotAvailable | Self::PriceTooLow)
    }

    /// Problems reported on requests found by id lookup that an operator
    /// should know about.
    #[must_use]
    pub fn needs_attention_when_resolved(&self) -> bool {
        matches!(
            self,
            Self::BadParameters | Self::ConstraintNotFulfillable | Self::LimitExceeded
        )
    }
}

define_vocabulary! {
    /// Lifecycle state of a compute instance as reported by the remote API.
    ResourceState {
        Pending => "pending",
        Running => "running",
        ShuttingDown => "shutting-down",
        Terminated => "terminated",
        Stopping => "stopping",
        Stopped => "stopped",
    }
}

impl ResourceState {
    /// Returns true when the instance is terminated or on its way there.
    #[must_use]
    pub fn is_gone(&self) -> bool {
        matches!(self, Self::ShuttingDown | Self::Terminated)
    }
}
