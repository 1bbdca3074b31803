//! Integration tests for clock skew calibration and validity-window retries.

mod harness;

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use harness::engine;
use spotfleet_provisioner::cloud::{CallKind, CloudError, SimulatedCloud};
use spotfleet_provisioner::ProvisionerError;

fn skewed(secs: i64) -> Arc<SimulatedCloud> {
    Arc::new(SimulatedCloud::new().with_clock_skew(TimeDelta::seconds(secs)))
}

#[tokio::test]
async fn test_offset_grows_until_window_is_accepted() {
    let cloud = skewed(35);
    let mut engine = engine(&cloud);

    engine.launch(1).await.unwrap();

    // 10s, 20s and 30s leads are rejected, 40s is accepted.
    assert_eq!(cloud.calls(CallKind::RequestSpotInstances), 4);
    assert_eq!(engine.clock().launch_time_offset(), Duration::from_secs(40));
    assert_eq!(engine.tracked().len(), 1);

    // The grown offset is kept for later launches.
    engine.launch(1).await.unwrap();
    assert_eq!(cloud.calls(CallKind::RequestSpotInstances), 5);
    assert_eq!(engine.clock().launch_time_offset(), Duration::from_secs(40));
    assert_eq!(engine.tracked().len(), 2);
}

#[tokio::test]
async fn test_rejected_windows_give_up_after_five_attempts() {
    let cloud = skewed(120);
    let mut engine = engine(&cloud);

    let err = engine.launch(2).await.unwrap_err();

    assert!(matches!(
        &err,
        ProvisionerError::Launch(cloud_err) if cloud_err.is_invalid_time()
    ));
    assert_eq!(cloud.calls(CallKind::RequestSpotInstances), 5);
    assert_eq!(engine.clock().launch_time_offset(), Duration::from_secs(60));
    assert!(engine.tracked().is_empty());
    assert!(cloud.live_request_ids().is_empty());
}

#[tokio::test]
async fn test_other_creation_errors_abort_immediately() {
    let cloud = skewed(0);
    let mut engine = engine(&cloud);
    cloud.fail_next(
        CallKind::RequestSpotInstances,
        CloudError::api("InsufficientInstanceCapacity", "no capacity"),
    );

    let err = engine.launch(1).await.unwrap_err();

    assert_eq!(
        err.cloud_error().and_then(CloudError::code),
        Some("InsufficientInstanceCapacity")
    );
    assert_eq!(cloud.calls(CallKind::RequestSpotInstances), 1);
    assert_eq!(engine.clock().launch_time_offset(), Duration::from_secs(10));
    assert!(engine.tracked().is_empty());
}

#[tokio::test]
async fn test_calibration_measures_and_rounds_skew() {
    let cloud = skewed(35);
    let mut engine = engine(&cloud);

    let skew = engine.approximate_clock_skew().await;

    assert_eq!(skew, TimeDelta::seconds(40));
    assert_eq!(engine.clock().approximate_clock_skew(), TimeDelta::seconds(40));
    assert!(cloud.live_request_ids().is_empty());
    assert!(engine.tracked().is_empty());

    // With the skew known, the first window is accepted.
    engine.launch(1).await.unwrap();
    assert_eq!(cloud.calls(CallKind::RequestSpotInstances), 2);
    assert_eq!(engine.clock().launch_time_offset(), Duration::from_secs(10));
}

#[tokio::test]
async fn test_calibration_handles_remote_clock_behind() {
    let cloud = skewed(-35);
    let mut engine = engine(&cloud);

    let skew = engine.approximate_clock_skew().await;
    assert_eq!(skew, TimeDelta::seconds(-40));

    engine.launch(1).await.unwrap();
    assert_eq!(cloud.calls(CallKind::RequestSpotInstances), 2);
}

#[tokio::test]
async fn test_calibration_request_uses_far_future_window() {
    let cloud = skewed(0);
    let mut engine = engine(&cloud);

    engine.approximate_clock_skew().await;

    let launches = cloud.launches();
    assert_eq!(launches.len(), 1);
    assert_eq!(launches[0].instance_count, 1);
    let lead = launches[0].valid_from - cloud.remote_now();
    assert!(lead > TimeDelta::hours(99));
}

#[tokio::test]
async fn test_calibration_cleanup_retries_until_visible() {
    let cloud = Arc::new(
        SimulatedCloud::new()
            .with_clock_skew(TimeDelta::seconds(15))
            .with_listing_lag(2)
            .hiding_from_lookups(),
    );
    let mut engine = engine(&cloud);

    let skew = engine.approximate_clock_skew().await;

    assert_eq!(skew, TimeDelta::seconds(20));
    assert_eq!(cloud.calls(CallKind::CancelSpotRequests), 3);
    assert!(cloud.live_request_ids().is_empty());
}

#[tokio::test]
async fn test_calibration_cleanup_stops_on_other_errors() {
    let cloud = skewed(15);
    let mut engine = engine(&cloud);
    cloud.fail_next(
        CallKind::CancelSpotRequests,
        CloudError::Transport("connection reset".to_string()),
    );

    let skew = engine.approximate_clock_skew().await;

    // The measurement is kept even though cleanup gave up.
    assert_eq!(skew, TimeDelta::seconds(20));
    assert_eq!(cloud.calls(CallKind::CancelSpotRequests), 1);
    assert_eq!(cloud.live_request_ids().len(), 1);
}

#[tokio::test]
async fn test_calibration_failure_leaves_skew_at_zero() {
    let cloud = skewed(35);
    let mut engine = engine(&cloud);
    cloud.fail_next(
        CallKind::RequestSpotInstances,
        CloudError::Transport("timeout".to_string()),
    );

    let skew = engine.approximate_clock_skew().await;

    assert_eq!(skew, TimeDelta::zero());
    assert_eq!(cloud.calls(CallKind::CancelSpotRequests), 0);

    // The launch offset compensates on its own.
    engine.launch(1).await.unwrap();
    assert_eq!(engine.clock().launch_time_offset(), Duration::from_secs(40));
}
