//! Integration tests for the reconciliation pass.
//!
//! Each test drives a `SpotProvisioner` against a `SimulatedCloud` and checks
//! the handle list and the tracked set after one or more passes.

mod harness;

use std::sync::Arc;

use harness::{engine, foreign_request, handle_ids, owner_tags, placeholders};
use spotfleet_provisioner::cloud::{CallKind, CloudError, SimulatedCloud, SpotRequestApi, Tag};
use spotfleet_provisioner::ProvisionerError;
use spotfleet_reconcile::{InstanceState, RequestState, ResourceState, StatusCode};

#[tokio::test]
async fn test_launch_is_not_repeated_while_requests_are_unlisted() {
    let cloud = Arc::new(
        SimulatedCloud::new()
            .with_listing_lag(10)
            .hiding_from_lookups(),
    );
    let mut engine = engine(&cloud);

    engine.launch(2).await.unwrap();
    assert_eq!(engine.tracked().len(), 2);

    for _ in 0..3 {
        let handles = engine.list().await.unwrap();
        assert_eq!(handles.len(), 2);
        assert_eq!(placeholders(&handles), 2);
        assert!(handles
            .iter()
            .all(|h| h.state == InstanceState::SpotRequestPendingAws));
    }
    assert_eq!(engine.tracked().len(), 2);
    assert_eq!(cloud.calls(CallKind::RequestSpotInstances), 1);

    cloud.reveal_all();
    let fulfilled = cloud.fulfill_all();
    assert_eq!(fulfilled.len(), 2);

    let handles = engine.list().await.unwrap();
    assert_eq!(placeholders(&handles), 0);
    let mut ids = handle_ids(&handles);
    ids.sort();
    let mut expected = fulfilled.clone();
    expected.sort();
    assert_eq!(ids, expected);
    assert!(handles.iter().all(|h| h.state == InstanceState::Running));
}

#[tokio::test]
async fn test_lagging_request_found_by_id_stays_tracked() {
    let cloud = Arc::new(SimulatedCloud::new().with_listing_lag(10));
    let mut engine = engine(&cloud);

    engine.launch(1).await.unwrap();
    let request_id = engine.tracked().ids()[0].clone();

    let handles = engine.list().await.unwrap();

    assert_eq!(handle_ids(&handles), vec![request_id.clone()]);
    assert_eq!(handles[0].agent_name, request_id);
    assert!(engine.tracked().contains(&request_id));
    // Listing plus one targeted lookup.
    assert!(cloud.calls(CallKind::DescribeSpotRequests) >= 2);
}

#[tokio::test]
async fn test_restart_recovers_tracking_from_remote() {
    let cloud = Arc::new(SimulatedCloud::new());
    cloud.insert_request(
        foreign_request("sir-before-restart", RequestState::Open),
        owner_tags(),
    );
    cloud.insert_request(
        foreign_request("sir-other-pool", RequestState::Open),
        vec![Tag::new("spotfleet-owner", "someone-else")],
    );

    let mut engine = engine(&cloud);
    let handles = engine.list().await.unwrap();

    assert_eq!(handle_ids(&handles), vec!["sir-before-restart".to_string()]);
    assert_eq!(engine.tracked().ids(), vec!["sir-before-restart".to_string()]);
}

#[tokio::test]
async fn test_terminal_requests_are_dropped() {
    let cloud = Arc::new(SimulatedCloud::new());
    let mut engine = engine(&cloud);

    engine.launch(2).await.unwrap();
    let ids = engine.tracked().ids();
    let instance_id = cloud.fulfill(&ids[0]).unwrap();
    cloud.set_request_status(
        &ids[1],
        RequestState::Failed,
        Some(StatusCode::BadParameters),
        "The AMI does not exist",
    );

    let handles = engine.list().await.unwrap();

    assert_eq!(handle_ids(&handles), vec![instance_id]);
    assert_eq!(engine.tracked().ids(), vec![ids[0].clone()]);
}

#[tokio::test]
async fn test_capacity_problems_keep_requests_tracked() {
    let cloud = Arc::new(SimulatedCloud::new());
    let mut engine = engine(&cloud);

    engine.launch(1).await.unwrap();
    let id = engine.tracked().ids()[0].clone();
    cloud.set_request_status(
        &id,
        RequestState::Open,
        Some(StatusCode::CapacityNotAvailable),
        "There is no Spot capacity available that matches your request.",
    );

    let handles = engine.list().await.unwrap();

    assert_eq!(handle_ids(&handles), vec![id.clone()]);
    assert_eq!(
        engine.tracked().get(&id).unwrap().status_code,
        Some(StatusCode::CapacityNotAvailable)
    );
}

#[tokio::test]
async fn test_dead_instances_are_excluded_before_request_closes() {
    let cloud = Arc::new(SimulatedCloud::new());
    let mut engine = engine(&cloud);

    engine.launch(1).await.unwrap();
    let request_id = engine.tracked().ids()[0].clone();
    let instance_id = cloud.fulfill(&request_id).unwrap();
    assert_eq!(engine.list().await.unwrap().len(), 1);

    for state in [ResourceState::ShuttingDown, ResourceState::Terminated] {
        cloud.set_instance_state(&instance_id, state);
        let handles = engine.list().await.unwrap();
        assert!(handles.is_empty());
        assert!(engine.tracked().contains(&request_id));
    }

    cloud.set_request_status(
        &request_id,
        RequestState::Closed,
        Some(StatusCode::InstanceTerminatedByUser),
        "Spot Instance terminated due to user-initiated termination.",
    );
    assert!(engine.list().await.unwrap().is_empty());
    assert!(engine.tracked().is_empty());
}

#[tokio::test]
async fn test_fulfilled_instances_are_tagged() {
    let cloud = Arc::new(SimulatedCloud::new());
    let mut engine = engine(&cloud);

    engine.launch(1).await.unwrap();
    let instance_id = cloud.fulfill(&engine.tracked().ids()[0]).unwrap();
    engine.list().await.unwrap();

    let tags = cloud.instance_tags(&instance_id);
    assert_eq!(tags.get("Name").map(String::as_str), Some("spotfleet-agent"));
    assert_eq!(
        tags.get("spotfleet-resource-pool").map(String::as_str),
        Some("default")
    );
    assert_eq!(
        tags.get("spotfleet-owner").map(String::as_str),
        Some("spotfleet")
    );
    assert_eq!(
        tags.get("spotfleet-master-address").map(String::as_str),
        Some("http://127.0.0.1:8080")
    );
}

#[tokio::test]
async fn test_tagging_failure_does_not_fail_the_pass() {
    let cloud = Arc::new(SimulatedCloud::new());
    let mut engine = engine(&cloud);

    engine.launch(1).await.unwrap();
    let instance_id = cloud.fulfill(&engine.tracked().ids()[0]).unwrap();
    cloud.fail_next(
        CallKind::CreateTags,
        CloudError::api("RequestLimitExceeded", "Request limit exceeded."),
    );

    let handles = engine.list().await.unwrap();

    assert_eq!(handle_ids(&handles), vec![instance_id.clone()]);
    assert!(cloud.instance_tags(&instance_id).is_empty());

    // The next pass tags it.
    engine.list().await.unwrap();
    assert!(!cloud.instance_tags(&instance_id).is_empty());
}

#[tokio::test]
async fn test_canceled_but_running_instances_are_terminated() {
    let cloud = Arc::new(SimulatedCloud::new());
    cloud.insert_request(
        foreign_request("sir-orphan", RequestState::Active)
            .with_status(StatusCode::Fulfilled, "fulfilled")
            .with_instance("i-orphan"),
        owner_tags(),
    );
    cloud
        .cancel_spot_requests(&["sir-orphan".to_string()])
        .await
        .unwrap();
    assert_eq!(
        cloud.instance("i-orphan").unwrap().state,
        ResourceState::Running
    );

    let mut engine = engine(&cloud);
    cloud.fail_next(
        CallKind::TerminateInstances,
        CloudError::Transport("connection reset".to_string()),
    );

    // Termination failure is logged and retried by the next pass.
    let handles = engine.list().await.unwrap();
    assert!(handles.is_empty());
    assert_eq!(
        cloud.instance("i-orphan").unwrap().state,
        ResourceState::Running
    );

    engine.list().await.unwrap();
    assert_eq!(
        cloud.instance("i-orphan").unwrap().state,
        ResourceState::ShuttingDown
    );
    assert!(engine.tracked().is_empty());
}

#[tokio::test]
async fn test_listing_failure_surfaces() {
    let cloud = Arc::new(SimulatedCloud::new());
    let mut engine = engine(&cloud);
    engine.launch(1).await.unwrap();

    cloud.fail_next(
        CallKind::DescribeSpotRequests,
        CloudError::Transport("timeout".to_string()),
    );
    let err = engine.list().await.unwrap_err();

    assert!(matches!(err, ProvisionerError::DescribeSpotRequests(_)));
    assert_eq!(engine.tracked().len(), 1);
}

#[tokio::test]
async fn test_instance_describe_failure_surfaces() {
    let cloud = Arc::new(SimulatedCloud::new());
    let mut engine = engine(&cloud);
    engine.launch(1).await.unwrap();
    cloud.fulfill(&engine.tracked().ids()[0]).unwrap();

    cloud.fail_next(
        CallKind::DescribeInstances,
        CloudError::Transport("timeout".to_string()),
    );
    let err = engine.list().await.unwrap_err();

    assert!(matches!(err, ProvisionerError::DescribeInstances(_)));
}

#[tokio::test]
async fn test_no_instance_describe_without_fulfilled_requests() {
    let cloud = Arc::new(SimulatedCloud::new());
    let mut engine = engine(&cloud);
    engine.launch(3).await.unwrap();

    engine.list().await.unwrap();

    assert_eq!(cloud.calls(CallKind::DescribeInstances), 0);
}

#[tokio::test]
async fn test_tracked_set_converges_to_remote_live_set() {
    let cloud = Arc::new(SimulatedCloud::new().with_listing_lag(1));
    let mut engine = engine(&cloud);

    engine.launch(4).await.unwrap();
    let ids = engine.tracked().ids();
    cloud.reveal_all();

    cloud.fulfill(&ids[0]).unwrap();
    cloud.set_request_status(
        &ids[1],
        RequestState::Cancelled,
        Some(StatusCode::CanceledBeforeFulfillment),
        "canceled",
    );
    cloud.set_request_status(&ids[2], RequestState::Disabled, None, "disabled");
    cloud.insert_request(
        foreign_request("sir-foreign", RequestState::Open),
        owner_tags(),
    );

    for _ in 0..3 {
        engine.list().await.unwrap();
    }

    let mut remote_live = cloud.live_request_ids();
    remote_live.sort();
    assert_eq!(engine.tracked().ids(), remote_live);
    assert!(engine.tracked().iter().all(|r| r.state.is_live()));
}
