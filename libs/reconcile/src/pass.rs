//! Bookkeeping for a single reconciliation pass.
//!
//! A pass interleaves remote calls with local decisions. The decisions live
//! here so they can be exercised without a remote API:
//!
//! 1. [`ReconcilePass::begin`] merges the requests the API lists as live into
//!    the tracked set, flags capacity/price problems, and computes the
//!    requests that are tracked but were not listed.
//! 2. The caller looks those ids up directly and hands the result to
//!    [`ReconcilePass::absorb_lookup`], which drops terminal requests from
//!    tracking and flags provisioning problems.
//! 3. [`assemble_instances`] turns the tracked set plus instance
//!    descriptions into the handle list returned to the scheduler.

use serde::Serialize;

use crate::instance::{Instance, InstanceState, ResourceDescription};
use crate::request::{RequestSet, SpotRequest};
use crate::vocabulary::StatusCode;

/// State carried between the steps of one pass.
#[derive(Debug, Clone)]
pub struct ReconcilePass {
    visible: usize,
    missing: RequestSet,
    needs_attention: RequestSet,
    no_longer_tracked: usize,
}

impl ReconcilePass {
    /// Merge the listed live requests into `tracked` and compute the gap.
    pub fn begin(tracked: &mut RequestSet, visible: &RequestSet) -> Self {
        // The API is trusted once it shows a request, which also recovers
        // tracking lost across a restart.
        tracked.extend(visible);

        let needs_attention = visible
            .iter()
            .filter(|req| {
                req.status_code
                    .as_ref()
                    .is_some_and(StatusCode::needs_attention_while_live)
            })
            .cloned()
            .collect();

        let mut missing = tracked.clone();
        missing.delete_intersection(visible);

        Self {
            visible: visible.len(),
            missing,
            needs_attention,
            no_longer_tracked: 0,
        }
    }

    /// Requests tracked but not listed as live.
    pub fn missing(&self) -> &RequestSet {
        &self.missing
    }

    /// Ids to look up directly.
    pub fn missing_ids(&self) -> Vec<String> {
        self.missing.ids()
    }

    /// Apply the result of looking up the missing ids.
    ///
    /// Requests absent from `found` stay tracked: they may simply not be
    /// visible yet.
    pub fn absorb_lookup(&mut self, tracked: &mut RequestSet, found: &RequestSet) {
        for req in found.iter() {
            self.missing.delete(&req.id);

            if req.state.is_live() {
                tracked.add(req.clone());
            } else {
                tracked.delete(&req.id);
                self.no_longer_tracked += 1;
            }

            if req
                .status_code
                .as_ref()
                .is_some_and(StatusCode::needs_attention_when_resolved)
            {
                self.needs_attention.add(req.clone());
            }
        }
    }

    /// Requests an operator should look at, oldest first.
    pub fn needs_attention(&self) -> Vec<&SpotRequest> {
        self.needs_attention.in_creation_order()
    }

    /// Figures for the canonical per-pass log record.
    pub fn summary(&self, tracked: &RequestSet) -> PassSummary {
        PassSummary {
            tracked: tracked.len(),
            visible_in_api: self.visible,
            tracked_but_not_visible: self.missing.len(),
            no_longer_tracked: self.no_longer_tracked,
            not_visible_ids: self.missing.ids(),
        }
    }
}

/// Counts describing one pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    pub tracked: usize,
    pub visible_in_api: usize,
    pub tracked_but_not_visible: usize,
    pub no_longer_tracked: usize,
    pub not_visible_ids: Vec<String>,
}

/// Handle list produced at the end of a pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssembledInstances {
    /// Live instances backing fulfilled requests.
    pub real: Vec<Instance>,

    /// Stand-ins for requests without an instance.
    pub placeholders: Vec<Instance>,
}

impl AssembledInstances {
    /// Instances whose remote state did not map onto a known state.
    pub fn unknown_state(&self) -> impl Iterator<Item = &Instance> {
        self.real
            .iter()
            .filter(|inst| inst.state == InstanceState::Unknown)
    }

    /// Total number of handles.
    pub fn len(&self) -> usize {
        self.real.len() + self.placeholders.len()
    }

    /// Returns true if there are no handles.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Real instances followed by placeholders.
    pub fn into_combined(self) -> Vec<Instance> {
        let mut combined = self.real;
        combined.extend(self.placeholders);
        combined
    }
}

/// Build the handle list from the tracked set and instance descriptions.
///
/// Instances that are terminated or shutting down are left out even when
/// their request still reads as fulfilled: the request state lags behind the
/// instance, and reporting a dead instance would stop the scheduler from
/// replacing it.
pub fn assemble_instances(
    tracked: &RequestSet,
    described: &[ResourceDescription],
) -> AssembledInstances {
    let real = described
        .iter()
        .filter(|desc| !desc.state.is_gone())
        .map(Instance::from_description)
        .collect();

    let placeholders = tracked
        .in_creation_order()
        .into_iter()
        .filter(|req| !req.is_fulfilled())
        .map(Instance::placeholder)
        .collect();

    AssembledInstances { real, placeholders }
}
