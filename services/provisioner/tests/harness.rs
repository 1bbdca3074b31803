//! Shared fixtures for the provisioner integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use spotfleet_provisioner::cloud::{SimulatedCloud, Tag};
use spotfleet_provisioner::spot::RESOURCE_POOL_TAG;
use spotfleet_provisioner::{SpotProvisioner, SpotSettings};
use spotfleet_reconcile::{Instance, RequestState, SpotRequest};

/// Engine settings with fast cleanup retries and no startup calibration.
pub fn settings() -> SpotSettings {
    let mut settings = SpotSettings::default();
    settings.tuning.cancel_retry_delay = Duration::from_millis(5);
    settings.tuning.calibrate_on_start = false;
    settings
}

/// Engine wired to both halves of a simulated cloud.
pub fn engine(cloud: &Arc<SimulatedCloud>) -> SpotProvisioner {
    SpotProvisioner::new(cloud.clone(), cloud.clone(), settings())
}

/// Tags the default settings scope listings by.
pub fn owner_tags() -> Vec<Tag> {
    vec![
        Tag::new("spotfleet-owner", "spotfleet"),
        Tag::new(RESOURCE_POOL_TAG, "default"),
    ]
}

/// A request created outside the engine, e.g. before a restart.
pub fn foreign_request(id: &str, state: RequestState) -> SpotRequest {
    SpotRequest::new(id, state, Utc::now())
}

pub fn handle_ids(handles: &[Instance]) -> Vec<String> {
    handles.iter().map(|h| h.id.clone()).collect()
}

pub fn placeholders(handles: &[Instance]) -> usize {
    handles.iter().filter(|h| h.is_placeholder()).count()
}
