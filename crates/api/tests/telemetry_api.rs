//! HTTP-level integration tests for the telemetry push endpoint.

mod common;

use axum::http::StatusCode;
use common::{body_json, post_json, post_raw};
use serde_json::json;
use streamfleet_fleet::cache::{TelemetryCache, LATEST_STATS_KEY};
use streamfleet_fleet::testing::{stream, vps};
use streamfleet_core::stream_state::StreamStatus;

// ---------------------------------------------------------------------------
// Accepted pushes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn valid_push_is_stored_and_mirrored() {
    let t = common::build_test_app();
    t.store.insert_vps(vps(1, "edge-1"));
    t.store.insert_stream(stream(10, StreamStatus::Streaming));

    let response = post_json(
        t.app(),
        "/api/v1/telemetry",
        json!({
            "worker_id": 1,
            "cpu_usage": 42.5,
            "ram_usage": 61.0,
            "disk_usage": 30.0,
            "total_streams": 1,
            "active_streams": {
                "10": {"status": "streaming", "progress": 12.5, "uptime": 90}
            }
        }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["accepted"], true);

    assert_eq!(t.store.samples_for(1).len(), 1);
    assert!(t.cache.raw(LATEST_STATS_KEY, "1").is_some());
    let live = t.cache.live_status(10).await.unwrap().unwrap();
    assert_eq!(live.progress, Some(12.5));
    assert_eq!(t.store.progress_row(10).unwrap().uptime_secs, Some(90));
}

#[tokio::test]
async fn out_of_range_usage_is_clamped() {
    let t = common::build_test_app();
    t.store.insert_vps(vps(1, "edge-1"));

    let response = post_json(
        t.app(),
        "/api/v1/telemetry",
        json!({"worker_id": 1, "cpu_usage": 150, "ram_usage": -5, "disk_usage": 50}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let samples = t.store.samples_for(1);
    assert_eq!(samples[0].cpu_usage, 100.0);
    assert_eq!(samples[0].ram_usage, 0.0);
}

#[tokio::test]
async fn push_is_accepted_while_fast_store_is_down() {
    let t = common::build_test_app();
    t.store.insert_vps(vps(1, "edge-1"));
    t.cache.set_unavailable(true);

    let response = post_json(
        t.app(),
        "/api/v1/telemetry",
        json!({"worker_id": 1, "cpu_usage": 10, "ram_usage": 10, "disk_usage": 10}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(t.store.samples_for(1).len(), 1);
}

// ---------------------------------------------------------------------------
// Rejected pushes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_worker_is_rejected_quietly() {
    let t = common::build_test_app();

    let response = post_json(
        t.app(),
        "/api/v1/telemetry",
        json!({"worker_id": 99, "cpu_usage": 10, "ram_usage": 10, "disk_usage": 10}),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = body_json(response).await;
    assert_eq!(json["data"]["accepted"], false);
    assert!(t.store.samples_for(99).is_empty());
}

#[tokio::test]
async fn missing_required_field_is_rejected() {
    let t = common::build_test_app();
    t.store.insert_vps(vps(1, "edge-1"));

    let response = post_json(
        t.app(),
        "/api/v1/telemetry",
        json!({"worker_id": 1, "cpu_usage": 10, "ram_usage": 10}),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(t.store.samples_for(1).is_empty());
}

#[tokio::test]
async fn unparseable_body_is_rejected_with_envelope() {
    let t = common::build_test_app();

    let response = post_raw(t.app(), "/api/v1/telemetry", "{not json".to_string()).await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = body_json(response).await;
    assert_eq!(json["data"]["accepted"], false);
}
