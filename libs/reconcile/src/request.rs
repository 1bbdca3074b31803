//! Spot requests and the set used to track them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::vocabulary::{RequestState, StatusCode};

/// One outstanding or historical spot request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpotRequest {
    /// Identifier assigned by the remote API.
    pub id: String,

    /// Remote request state.
    pub state: RequestState,

    /// Remote status code. Absent until the provider evaluates the request.
    pub status_code: Option<StatusCode>,

    /// Human-readable companion to `status_code`.
    pub status_message: Option<String>,

    /// Instance launched for this request, once fulfilled.
    pub instance_id: Option<String>,

    /// Creation time according to the remote clock.
    pub creation_time: DateTime<Utc>,
}

impl SpotRequest {
    /// Create an unfulfilled request with no status.
    pub fn new(id: impl Into<String>, state: RequestState, creation_time: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            state,
            status_code: None,
            status_message: None,
            instance_id: None,
            creation_time,
        }
    }

    /// Attach a status code and message.
    #[must_use]
    pub fn with_status(mut self, code: StatusCode, message: impl Into<String>) -> Self {
        self.status_code = Some(code);
        self.status_message = Some(message.into());
        self
    }

    /// Attach the launched instance.
    #[must_use]
    pub fn with_instance(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = Some(instance_id.into());
        self
    }

    /// A request is fulfilled once it names a non-empty instance id.
    ///
    /// Fulfilment says nothing about whether that instance is still alive.
    pub fn is_fulfilled(&self) -> bool {
        self.fulfilled_instance().is_some()
    }

    /// The launched instance id, ignoring empty strings.
    pub fn fulfilled_instance(&self) -> Option<&str> {
        self.instance_id.as_deref().filter(|id| !id.is_empty())
    }

    /// Status code as a string, empty when unset.
    pub fn status_code_str(&self) -> &str {
        self.status_code.as_ref().map_or("", StatusCode::as_str)
    }

    /// Status message, empty when unset.
    pub fn status_message_str(&self) -> &str {
        self.status_message.as_deref().unwrap_or_default()
    }
}

/// A set of spot requests keyed by request id.
///
/// Adding a request whose id is already present replaces the old entry, so
/// an id is never held under two different identities. Cloning yields an
/// independent snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestSet {
    requests: BTreeMap<String, SpotRequest>,
}

impl RequestSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a request by id.
    pub fn add(&mut self, request: SpotRequest) {
        self.requests.insert(request.id.clone(), request);
    }

    /// Remove a request by id. Returns true if it was present.
    pub fn delete(&mut self, id: &str) -> bool {
        self.requests.remove(id).is_some()
    }

    /// Add every request of `other`, replacing entries with the same id.
    pub fn extend(&mut self, other: &RequestSet) {
        for request in other.iter() {
            self.add(request.clone());
        }
    }

    /// Remove every request whose id also appears in `other`.
    pub fn delete_intersection(&mut self, other: &RequestSet) {
        self.requests.retain(|id, _| !other.contains(id));
    }

    /// Returns true if a request with this id is present.
    pub fn contains(&self, id: &str) -> bool {
        self.requests.contains_key(id)
    }

    /// Look up a request by id.
    pub fn get(&self, id: &str) -> Option<&SpotRequest> {
        self.requests.get(id)
    }

    /// Number of requests.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Returns true if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Iterate over the requests in id order.
    pub fn iter(&self) -> impl Iterator<Item = &SpotRequest> {
        self.requests.values()
    }

    /// Requests sorted by remote creation time, oldest first.
    pub fn in_creation_order(&self) -> Vec<&SpotRequest> {
        let mut ordered: Vec<_> = self.requests.values().collect();
        ordered.sort_by(|a, b| {
            a.creation_time
                .cmp(&b.creation_time)
                .then_with(|| a.id.cmp(&b.id))
        });
        ordered
    }

    /// Request ids, in id order.
    pub fn ids(&self) -> Vec<String> {
        self.requests.keys().cloned().collect()
    }

    /// Instance ids of the fulfilled requests.
    pub fn instance_ids(&self) -> Vec<String> {
        self.requests
            .values()
            .filter_map(SpotRequest::fulfilled_instance)
            .map(str::to_string)
            .collect()
    }
}

impl FromIterator<SpotRequest> for RequestSet {
    fn from_iter<I: IntoIterator<Item = SpotRequest>>(iter: I) -> Self {
        let mut set = Self::new();
        for request in iter {
            set.add(request);
        }
        set
    }
}
