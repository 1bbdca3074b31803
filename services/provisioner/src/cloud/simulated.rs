//! In-memory cloud for testing and local runs.
//!
//! Models the parts of the remote behaviour the provisioner has to cope with:
//! - a remote clock that differs from the local one
//! - freshly created requests that stay unlisted for a number of calls
//! - cancelling a fulfilled request leaves its instance running
//! - scripted failures per call kind

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use spotfleet_reconcile::{
    RequestState, ResourceDescription, ResourceState, SpotRequest, StatusCode,
};
use tracing::{debug, info};

use super::error::{
    CloudError, CloudResult, DRY_RUN_OPERATION, INSTANCE_NOT_FOUND, INVALID_TIME,
    SPOT_REQUEST_NOT_FOUND,
};
use super::types::{
    RequestSelector, SpotLaunchInput, SpotRequestFilter, Tag, SPOT_REQUEST_RESOURCE_TYPE,
};
use super::{InstanceApi, SpotRequestApi};

/// Remote calls, for scripting failures and counting calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    RequestSpotInstances,
    DescribeSpotRequests,
    CancelSpotRequests,
    DescribeInstances,
    CreateTags,
    TerminateInstances,
}

#[derive(Debug)]
struct SimRequest {
    request: SpotRequest,
    tags: Vec<Tag>,
    /// Remaining spot API calls during which the request is not listed.
    hidden_for: u32,
}

#[derive(Debug)]
struct SimInstance {
    description: ResourceDescription,
    tags: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct State {
    requests: BTreeMap<String, SimRequest>,
    instances: BTreeMap<String, SimInstance>,
    tokens: HashMap<String, Vec<String>>,
    next_id: u64,
    failures: HashMap<CallKind, VecDeque<CloudError>>,
    calls: HashMap<CallKind, usize>,
    launches: Vec<SpotLaunchInput>,
}

/// Simulated spot request and instance APIs.
#[derive(Debug)]
pub struct SimulatedCloud {
    state: Mutex<State>,
    clock_skew: TimeDelta,
    listing_lag: u32,
    hide_from_lookups: bool,
}

impl Default for SimulatedCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedCloud {
    /// Create a cloud with synchronized clocks and no listing lag.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            clock_skew: TimeDelta::zero(),
            listing_lag: 0,
            hide_from_lookups: false,
        }
    }

    /// Remote clock minus local clock.
    #[must_use]
    pub fn with_clock_skew(mut self, skew: TimeDelta) -> Self {
        self.clock_skew = skew;
        self
    }

    /// Number of spot API calls a new request stays unlisted for.
    #[must_use]
    pub fn with_listing_lag(mut self, calls: u32) -> Self {
        self.listing_lag = calls;
        self
    }

    /// Also hide unlisted requests from id lookups and cancellation.
    #[must_use]
    pub fn hiding_from_lookups(mut self) -> Self {
        self.hide_from_lookups = true;
        self
    }

    /// Current time by the remote clock.
    pub fn remote_now(&self) -> DateTime<Utc> {
        Utc::now() + self.clock_skew
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin_call(state: &mut State, kind: CallKind) -> CloudResult<()> {
        *state.calls.entry(kind).or_default() += 1;
        match state.failures.get_mut(&kind).and_then(VecDeque::pop_front) {
            Some(err) => {
                debug!(?kind, error = %err, "[SIM] Injected failure");
                Err(err)
            }
            None => Ok(()),
        }
    }

    fn age_requests(state: &mut State) {
        for sim in state.requests.values_mut() {
            sim.hidden_for = sim.hidden_for.saturating_sub(1);
        }
    }

    fn is_addressable(&self, sim: &SimRequest) -> bool {
        sim.hidden_for == 0 || !self.hide_from_lookups
    }

    fn matches(&self, sim: &SimRequest, filter: &SpotRequestFilter) -> bool {
        if !filter.tags.iter().all(|tag| sim.tags.contains(tag)) {
            return false;
        }

        let listed = sim.hidden_for == 0;
        match &filter.selector {
            RequestSelector::States(states) => listed && states.contains(&sim.request.state),
            RequestSelector::StatusCode(code) => {
                listed && sim.request.status_code.as_ref() == Some(code)
            }
            RequestSelector::Ids(ids) => self.is_addressable(sim) && ids.contains(&sim.request.id),
        }
    }

    fn cancel_locked(&self, state: &mut State, ids: &[String]) -> CloudResult<()> {
        for id in ids {
            let known = state
                .requests
                .get(id)
                .is_some_and(|sim| self.is_addressable(sim));
            if !known {
                return Err(CloudError::api(
                    SPOT_REQUEST_NOT_FOUND,
                    format!("The spot instance request ID '{id}' does not exist"),
                ));
            }
        }

        for id in ids {
            let Some(sim) = state.requests.get_mut(id) else {
                continue;
            };
            if !sim.request.state.is_live() {
                continue;
            }
            sim.request.state = RequestState::Cancelled;
            if sim.request.is_fulfilled() {
                sim.request.status_code = Some(StatusCode::RequestCanceledAndInstanceRunning);
                sim.request.status_message = Some(
                    "Spot Instance request is canceled, but the instance remains running."
                        .to_string(),
                );
            } else {
                sim.request.status_code = Some(StatusCode::CanceledBeforeFulfillment);
                sim.request.status_message =
                    Some("Spot Instance request was canceled before fulfillment.".to_string());
            }
        }
        Ok(())
    }

    fn require_instances(state: &State, ids: &[String]) -> CloudResult<()> {
        match ids.iter().find(|id| !state.instances.contains_key(*id)) {
            Some(id) => Err(CloudError::api(
                INSTANCE_NOT_FOUND,
                format!("The instance ID '{id}' does not exist"),
            )),
            None => Ok(()),
        }
    }

    // -------------------------------------------------------------------------
    // Driving the simulation
    // -------------------------------------------------------------------------

    /// Queue an error for the next call of `kind`.
    pub fn fail_next(&self, kind: CallKind, err: CloudError) {
        self.state()
            .failures
            .entry(kind)
            .or_default()
            .push_back(err);
    }

    /// Fulfil a live request by launching a running instance for it.
    ///
    /// Returns the instance id, or `None` if the request is unknown, terminal
    /// or already fulfilled.
    pub fn fulfill(&self, request_id: &str) -> Option<String> {
        let now = self.remote_now();
        let mut guard = self.state();
        let state = &mut *guard;

        let sim = state.requests.get_mut(request_id)?;
        if !sim.request.state.is_live() || sim.request.is_fulfilled() {
            return None;
        }

        state.next_id += 1;
        let instance_id = format!("i-{:017x}", state.next_id);
        sim.request.state = RequestState::Active;
        sim.request.status_code = Some(StatusCode::Fulfilled);
        sim.request.status_message = Some("Your spot request is fulfilled.".to_string());
        sim.request.instance_id = Some(instance_id.clone());

        state.instances.insert(
            instance_id.clone(),
            SimInstance {
                description: ResourceDescription {
                    instance_id: instance_id.clone(),
                    state: ResourceState::Running,
                    launch_time: now,
                },
                tags: BTreeMap::new(),
            },
        );

        info!(request_id, instance_id = %instance_id, "[SIM] Fulfilled spot request");
        Some(instance_id)
    }

    /// Fulfil every live, unfulfilled and listed request.
    pub fn fulfill_all(&self) -> Vec<String> {
        let pending: Vec<String> = self
            .state()
            .requests
            .values()
            .filter(|sim| {
                sim.hidden_for == 0 && sim.request.state.is_live() && !sim.request.is_fulfilled()
            })
            .map(|sim| sim.request.id.clone())
            .collect();

        pending.iter().filter_map(|id| self.fulfill(id)).collect()
    }

    /// Overwrite the state and status of a request.
    pub fn set_request_status(
        &self,
        request_id: &str,
        state: RequestState,
        code: Option<StatusCode>,
        message: &str,
    ) {
        if let Some(sim) = self.state().requests.get_mut(request_id) {
            sim.request.state = state;
            sim.request.status_code = code;
            sim.request.status_message = Some(message.to_string());
        }
    }

    /// Overwrite the state of an instance without touching its request.
    pub fn set_instance_state(&self, instance_id: &str, state: ResourceState) {
        if let Some(sim) = self.state().instances.get_mut(instance_id) {
            sim.description.state = state;
        }
    }

    /// Move every shutting-down instance to terminated.
    pub fn finish_shutdowns(&self) {
        for sim in self.state().instances.values_mut() {
            if sim.description.state == ResourceState::ShuttingDown {
                sim.description.state = ResourceState::Terminated;
            }
        }
    }

    /// Seed a request created outside this process. It is listed
    /// immediately, and its instance (if any) is created as running.
    pub fn insert_request(&self, request: SpotRequest, tags: Vec<Tag>) {
        let mut guard = self.state();
        let state = &mut *guard;

        if let Some(instance_id) = request.fulfilled_instance() {
            state
                .instances
                .entry(instance_id.to_string())
                .or_insert_with(|| SimInstance {
                    description: ResourceDescription {
                        instance_id: instance_id.to_string(),
                        state: ResourceState::Running,
                        launch_time: request.creation_time,
                    },
                    tags: BTreeMap::new(),
                });
        }

        state.requests.insert(
            request.id.clone(),
            SimRequest {
                request,
                tags,
                hidden_for: 0,
            },
        );
    }

    /// Make every request listable.
    pub fn reveal_all(&self) {
        for sim in self.state().requests.values_mut() {
            sim.hidden_for = 0;
        }
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    /// Current remote view of a request.
    pub fn request(&self, request_id: &str) -> Option<SpotRequest> {
        self.state()
            .requests
            .get(request_id)
            .map(|sim| sim.request.clone())
    }

    /// Ids of all requests in a live state, listed or not.
    pub fn live_request_ids(&self) -> Vec<String> {
        self.state()
            .requests
            .values()
            .filter(|sim| sim.request.state.is_live())
            .map(|sim| sim.request.id.clone())
            .collect()
    }

    /// Current remote view of an instance.
    pub fn instance(&self, instance_id: &str) -> Option<ResourceDescription> {
        self.state()
            .instances
            .get(instance_id)
            .map(|sim| sim.description.clone())
    }

    /// Tags applied to an instance.
    pub fn instance_tags(&self, instance_id: &str) -> BTreeMap<String, String> {
        self.state()
            .instances
            .get(instance_id)
            .map(|sim| sim.tags.clone())
            .unwrap_or_default()
    }

    /// Number of calls made of a kind, including failed ones.
    pub fn calls(&self, kind: CallKind) -> usize {
        self.state().calls.get(&kind).copied().unwrap_or(0)
    }

    /// Every creation call received, including rejected ones.
    pub fn launches(&self) -> Vec<SpotLaunchInput> {
        self.state().launches.clone()
    }
}

#[async_trait]
impl SpotRequestApi for SimulatedCloud {
    async fn request_spot_instances(
        &self,
        input: &SpotLaunchInput,
    ) -> CloudResult<Vec<SpotRequest>> {
        let now = self.remote_now();
        let mut state = self.state();
        Self::begin_call(&mut state, CallKind::RequestSpotInstances)?;
        state.launches.push(input.clone());

        if input.dry_run {
            return Err(CloudError::api(
                DRY_RUN_OPERATION,
                "Request would have succeeded, but DryRun flag is set.",
            ));
        }

        if let Some(ids) = state.tokens.get(&input.client_token) {
            debug!(client_token = %input.client_token, "[SIM] Replayed idempotent request");
            return Ok(ids
                .iter()
                .filter_map(|id| state.requests.get(id))
                .map(|sim| sim.request.clone())
                .collect());
        }

        if input.valid_from <= now {
            return Err(CloudError::api(
                INVALID_TIME,
                format!(
                    "The validFrom time {} must be in the future (now {now})",
                    input.valid_from
                ),
            ));
        }

        let tags: Vec<Tag> = input
            .tag_specifications
            .iter()
            .filter(|spec| spec.resource_type == SPOT_REQUEST_RESOURCE_TYPE)
            .flat_map(|spec| spec.tags.iter().cloned())
            .collect();

        let mut created = Vec::new();
        for _ in 0..input.instance_count {
            state.next_id += 1;
            let id = format!("sir-{:08x}", state.next_id);
            let request = SpotRequest::new(id.clone(), RequestState::Open, now).with_status(
                StatusCode::PendingEvaluation,
                "Your Spot request has been submitted for review, and is pending evaluation.",
            );
            state.requests.insert(
                id,
                SimRequest {
                    request: request.clone(),
                    tags: tags.clone(),
                    hidden_for: self.listing_lag,
                },
            );
            created.push(request);
        }

        state.tokens.insert(
            input.client_token.clone(),
            created.iter().map(|req| req.id.clone()).collect(),
        );

        info!(count = created.len(), "[SIM] Created spot requests");
        Ok(created)
    }

    async fn describe_spot_requests(
        &self,
        filter: &SpotRequestFilter,
    ) -> CloudResult<Vec<SpotRequest>> {
        let mut state = self.state();
        Self::begin_call(&mut state, CallKind::DescribeSpotRequests)?;

        let found: Vec<SpotRequest> = state
            .requests
            .values()
            .filter(|sim| self.matches(sim, filter))
            .map(|sim| sim.request.clone())
            .collect();

        Self::age_requests(&mut state);
        Ok(found)
    }

    async fn cancel_spot_requests(&self, ids: &[String]) -> CloudResult<()> {
        let mut state = self.state();
        Self::begin_call(&mut state, CallKind::CancelSpotRequests)?;

        let result = self.cancel_locked(&mut state, ids);
        Self::age_requests(&mut state);
        result
    }
}

#[async_trait]
impl InstanceApi for SimulatedCloud {
    async fn describe_instances(&self, ids: &[String]) -> CloudResult<Vec<ResourceDescription>> {
        let mut state = self.state();
        Self::begin_call(&mut state, CallKind::DescribeInstances)?;

        Ok(ids
            .iter()
            .filter_map(|id| state.instances.get(id))
            .map(|sim| sim.description.clone())
            .collect())
    }

    async fn create_tags(&self, resources: &[String], tags: &[Tag]) -> CloudResult<()> {
        let mut state = self.state();
        Self::begin_call(&mut state, CallKind::CreateTags)?;
        Self::require_instances(&state, resources)?;

        for id in resources {
            if let Some(sim) = state.instances.get_mut(id) {
                for tag in tags {
                    sim.tags.insert(tag.key.clone(), tag.value.clone());
                }
            }
        }
        Ok(())
    }

    async fn terminate_instances(&self, ids: &[String]) -> CloudResult<()> {
        let mut guard = self.state();
        let state = &mut *guard;
        Self::begin_call(state, CallKind::TerminateInstances)?;
        Self::require_instances(state, ids)?;

        for id in ids {
            if let Some(sim) = state.instances.get_mut(id) {
                if !sim.description.state.is_gone() {
                    sim.description.state = ResourceState::ShuttingDown;
                }
            }

            for sim in state.requests.values_mut() {
                if sim.request.fulfilled_instance() != Some(id.as_str()) {
                    continue;
                }
                if sim.request.state.is_live() {
                    sim.request.state = RequestState::Closed;
                }
                sim.request.status_code = Some(StatusCode::InstanceTerminatedByUser);
                sim.request.status_message =
                    Some("Spot Instance terminated due to user-initiated termination.".to_string());
            }
        }

        info!(count = ids.len(), "[SIM] Terminated instances");
        Ok(())
    }
}
