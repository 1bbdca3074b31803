//! Spot request provisioning engine.
//!
//! [`SpotProvisioner`] owns everything the engine believes about the remote
//! side: the tracked request set and the clock skew state. It does no
//! locking of its own. Callers serialize `launch`, `terminate` and `list`,
//! which the [`ProvisionerActor`](crate::actors::ProvisionerActor) does by
//! processing one message at a time.
//!
//! - `clock_skew`: skew calibration and validity-window retries
//! - `list`: the per-tick reconciliation pass
//! - `launch`: creating and terminating capacity

mod clock_skew;
mod launch;
mod list;

use std::sync::Arc;

use spotfleet_reconcile::{ClockSkew, RequestSet, RequestState, StatusCode};

use crate::cloud::{InstanceApi, RequestSelector, SpotRequestApi, SpotRequestFilter, Tag};
use crate::config::SpotSettings;

/// Tag carrying the resource pool name.
pub const RESOURCE_POOL_TAG: &str = "spotfleet-resource-pool";

/// Tag carrying the endpoint agents report to.
pub const MASTER_ADDRESS_TAG: &str = "spotfleet-master-address";

/// Tag carrying the display name of an instance.
pub const NAME_TAG: &str = "Name";

/// Spot provisioning engine for one resource pool.
pub struct SpotProvisioner {
    spot_api: Arc<dyn SpotRequestApi>,
    instance_api: Arc<dyn InstanceApi>,
    settings: SpotSettings,
    tracked: RequestSet,
    clock: ClockSkew,
}

impl SpotProvisioner {
    /// Create an engine with an empty tracked set and zero skew.
    pub fn new(
        spot_api: Arc<dyn SpotRequestApi>,
        instance_api: Arc<dyn InstanceApi>,
        settings: SpotSettings,
    ) -> Self {
        let clock = ClockSkew::new(settings.tuning.launch_time_offset);
        Self {
            spot_api,
            instance_api,
            settings,
            tracked: RequestSet::new(),
            clock,
        }
    }

    /// Requests the engine believes are outstanding.
    pub fn tracked(&self) -> &RequestSet {
        &self.tracked
    }

    /// Current clock skew state.
    pub fn clock(&self) -> ClockSkew {
        self.clock
    }

    /// Settings the engine was built with.
    pub fn settings(&self) -> &SpotSettings {
        &self.settings
    }

    /// Tags every listing is scoped by.
    fn ownership_tags(&self) -> Vec<Tag> {
        let pool = &self.settings.pool;
        vec![
            Tag::new(&pool.tag_key, &pool.tag_value),
            Tag::new(RESOURCE_POOL_TAG, &pool.resource_pool),
        ]
    }

    /// Tags applied to requests at creation and to instances once visible.
    fn resource_tags(&self) -> Vec<Tag> {
        let pool = &self.settings.pool;
        vec![
            Tag::new(NAME_TAG, &pool.instance_name),
            Tag::new(RESOURCE_POOL_TAG, &pool.resource_pool),
            Tag::new(&pool.tag_key, &pool.tag_value),
            Tag::new(MASTER_ADDRESS_TAG, &pool.master_url),
        ]
    }

    fn filter(&self, selector: RequestSelector) -> SpotRequestFilter {
        SpotRequestFilter {
            tags: self.ownership_tags(),
            selector,
        }
    }

    fn live_filter(&self) -> SpotRequestFilter {
        self.filter(RequestSelector::States(RequestState::live()))
    }

    fn canceled_but_running_filter(&self) -> SpotRequestFilter {
        self.filter(RequestSelector::StatusCode(
            StatusCode::RequestCanceledAndInstanceRunning,
        ))
    }
}

impl std::fmt::Debug for SpotProvisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpotProvisioner")
            .field("resource_pool", &self.settings.pool.resource_pool)
            .field("tracked", &self.tracked.len())
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}
