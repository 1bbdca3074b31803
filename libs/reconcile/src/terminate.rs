//! Routing of terminate requests.

use std::collections::BTreeSet;

/// Prefix the remote API reserves for spot request ids.
///
/// Pending-request placeholders use the request id as their handle id, so
/// the prefix tells them apart from instance ids.
pub const SPOT_REQUEST_ID_PREFIX: &str = "sir-";

/// Handles split by the action needed to release them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TerminationPlan {
    /// Instance ids to terminate directly.
    pub instances: Vec<String>,

    /// Spot request ids to cancel.
    pub spot_requests: Vec<String>,
}

impl TerminationPlan {
    /// Returns true if nothing needs to be done.
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty() && self.spot_requests.is_empty()
    }
}

/// Returns true if the handle id names a spot request.
pub fn is_spot_request_id(id: &str) -> bool {
    id.starts_with(SPOT_REQUEST_ID_PREFIX)
}

/// Split handle ids into instances and spot requests. Duplicates collapse.
pub fn partition_handles<I, S>(ids: I) -> TerminationPlan
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut instances = BTreeSet::new();
    let mut spot_requests = BTreeSet::new();

    for id in ids {
        let id = id.as_ref();
        if is_spot_request_id(id) {
            spot_requests.insert(id.to_string());
        } else {
            instances.insert(id.to_string());
        }
    }

    TerminationPlan {
        instances: instances.into_iter().collect(),
        spot_requests: spot_requests.into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_partition_mixed() {
        let plan = partition_handles(["i-0abc", "sir-123", "i-0def", "sir-456", "sir-123"]);

        assert_eq!(plan.instances, vec!["i-0abc", "i-0def"]);
        assert_eq!(plan.spot_requests, vec!["sir-123", "sir-456"]);
    }

    #[test]
    fn test_partition_empty() {
        let plan = partition_handles(Vec::<String>::new());
        assert!(plan.is_empty());
    }

    proptest! {
        #[test]
        fn prop_partition_has_no_crossover(
            ids in proptest::collection::vec("(sir-|i-)[a-f0-9]{1,8}", 0..32)
        ) {
            let plan = partition_handles(&ids);

            prop_assert!(plan.spot_requests.iter().all(|id| id.starts_with(SPOT_REQUEST_ID_PREFIX)));
            prop_assert!(plan.instances.iter().all(|id| !id.starts_with(SPOT_REQUEST_ID_PREFIX)));
            for id in &ids {
                let routed = plan.spot_requests.contains(id) || plan.instances.contains(id);
                prop_assert!(routed);
            }
        }
    }
}
