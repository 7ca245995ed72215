//! HTTP-level integration tests for stream lifecycle endpoints.

mod common;

use axum::http::StatusCode;
use chrono::Utc;
use common::{body_json, get, post, TestApp};
use streamfleet_core::stream_state::StreamStatus;
use streamfleet_core::telemetry::{ActiveStreamReport, CachedSample};
use streamfleet_core::types::DbId;
use streamfleet_db::models::telemetry::StreamProgress;
use streamfleet_fleet::cache::TelemetryCache;
use streamfleet_fleet::connection::CommandOutcome;
use streamfleet_fleet::testing::{stream, vps, FakeShell};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn add_healthy_worker(t: &TestApp, id: DbId, current_streams: i32) {
    let mut worker = vps(id, &format!("edge-{id}"));
    worker.current_streams = current_streams;
    t.store.insert_vps(worker);
    t.cache
        .put_worker_sample(
            id,
            &CachedSample {
                cpu_usage: 20.0,
                ram_usage: 30.0,
                disk_usage: 40.0,
                total_streams: Some(current_streams),
                timestamp: Utc::now().timestamp(),
            },
        )
        .await
        .unwrap();
}

fn streaming_on(id: DbId, worker_id: DbId) -> streamfleet_db::models::stream::StreamConfig {
    let mut s = stream(id, StreamStatus::Streaming);
    s.vps_server_id = Some(worker_id);
    s
}

// ---------------------------------------------------------------------------
// Start
// ---------------------------------------------------------------------------

#[tokio::test]
async fn start_returns_assigned_worker() {
    let t = common::build_test_app();
    add_healthy_worker(&t, 1, 0).await;
    t.store.insert_stream(stream(10, StreamStatus::Inactive));

    let response = post(t.app(), "/api/v1/streams/10/start").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["data"]["stream_id"], 10);
    assert_eq!(json["data"]["status"], "streaming");
    assert_eq!(json["data"]["vps_server_id"], 1);
    assert_eq!(t.store.vps_row(1).unwrap().current_streams, 1);
}

#[tokio::test]
async fn start_without_eligible_worker_is_503() {
    let t = common::build_test_app();
    t.store.insert_vps(vps(1, "silent"));
    t.store.insert_stream(stream(10, StreamStatus::Inactive));

    let response = post(t.app(), "/api/v1/streams/10/start").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let json = body_json(response).await;
    assert_eq!(json["code"], "NO_AVAILABLE_WORKER");
    assert_eq!(
        json["error"],
        "No available VPS server, please try again later"
    );
}

#[tokio::test]
async fn start_of_running_stream_is_409() {
    let t = common::build_test_app();
    add_healthy_worker(&t, 1, 1).await;
    t.store.insert_stream(streaming_on(10, 1));

    let response = post(t.app(), "/api/v1/streams/10/start").await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["code"], "CONFLICT");
}

#[tokio::test]
async fn agent_failure_on_start_is_502() {
    let t = common::build_test_app();
    add_healthy_worker(&t, 1, 0).await;
    t.store.insert_stream(stream(10, StreamStatus::Inactive));
    t.shell
        .push_outcome(FakeShell::ok(r#"{"error": "rtmp endpoint refused"}"#));

    let response = post(t.app(), "/api/v1/streams/10/start").await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let json = body_json(response).await;
    assert_eq!(json["code"], "REMOTE_ERROR");
    assert_eq!(json["error"], "rtmp endpoint refused");
    assert_eq!(
        t.store.stream_row(10).unwrap().status().unwrap(),
        StreamStatus::Error
    );
}

#[tokio::test]
async fn start_of_missing_stream_is_404() {
    let t = common::build_test_app();
    let response = post(t.app(), "/api/v1/streams/404/start").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Stop / force-stop / recover
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stop_of_inactive_stream_is_409() {
    let t = common::build_test_app();
    t.store.insert_stream(stream(10, StreamStatus::Inactive));

    let response = post(t.app(), "/api/v1/streams/10/stop").await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["code"], "NO_WORKER_ASSIGNED");
    assert!(t.shell.calls().is_empty());
}

#[tokio::test]
async fn stop_releases_worker() {
    let t = common::build_test_app();
    add_healthy_worker(&t, 1, 1).await;
    t.store.insert_stream(streaming_on(10, 1));

    let response = post(t.app(), "/api/v1/streams/10/stop").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["status"], "inactive");

    let row = t.store.stream_row(10).unwrap();
    assert_eq!(row.status().unwrap(), StreamStatus::Inactive);
    assert_eq!(row.vps_server_id, None);
    assert_eq!(t.store.vps_row(1).unwrap().current_streams, 0);
}

#[tokio::test]
async fn stop_succeeds_while_fast_store_is_down() {
    let t = common::build_test_app();
    add_healthy_worker(&t, 1, 1).await;
    t.store.insert_stream(streaming_on(10, 1));
    t.cache.set_unavailable(true);

    let response = post(t.app(), "/api/v1/streams/10/stop").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        t.store.stream_row(10).unwrap().status().unwrap(),
        StreamStatus::Inactive
    );
    assert_eq!(t.store.vps_row(1).unwrap().current_streams, 0);
}

#[tokio::test]
async fn failed_stop_is_502_and_keeps_state() {
    let t = common::build_test_app();
    add_healthy_worker(&t, 1, 1).await;
    t.store.insert_stream(streaming_on(10, 1));
    t.shell
        .push_outcome(CommandOutcome::failed("Connection timed out"));

    let response = post(t.app(), "/api/v1/streams/10/stop").await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(
        t.store.stream_row(10).unwrap().status().unwrap(),
        StreamStatus::Streaming
    );
}

#[tokio::test]
async fn force_stop_marks_inactive_when_worker_is_unreachable() {
    let t = common::build_test_app();
    add_healthy_worker(&t, 1, 1).await;
    t.store.insert_stream(streaming_on(10, 1));
    t.shell.set_reachable(false);

    let response = post(t.app(), "/api/v1/streams/10/force-stop").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["data"]["stream_id"], 10);
    assert_eq!(json["data"]["outcome"], "forced");

    let row = t.store.stream_row(10).unwrap();
    assert_eq!(row.status().unwrap(), StreamStatus::Inactive);
    assert_eq!(row.vps_server_id, None);
    assert!(row
        .error_message
        .unwrap()
        .ends_with("Stream marked as stopped anyway."));
    assert_eq!(t.store.vps_row(1).unwrap().current_streams, 0);
}

#[tokio::test]
async fn force_stop_of_inactive_stream_is_a_no_op() {
    let t = common::build_test_app();
    t.store.insert_stream(stream(10, StreamStatus::Inactive));

    let response = post(t.app(), "/api/v1/streams/10/force-stop").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await["data"]["outcome"],
        "already_inactive"
    );
}

#[tokio::test]
async fn recover_moves_error_stream_to_inactive() {
    let t = common::build_test_app();
    let mut s = stream(10, StreamStatus::Error);
    s.vps_server_id = Some(1);
    t.store.insert_stream(s);

    let response = post(t.app(), "/api/v1/streams/10/recover").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(t.store.stream_row(10).unwrap().vps_server_id, None);

    let response = post(t.app(), "/api/v1/streams/10/recover").await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

fn durable_progress(stream_id: DbId) -> StreamProgress {
    StreamProgress {
        stream_config_id: stream_id,
        vps_server_id: Some(1),
        status: Some("streaming".into()),
        progress: Some(5.0),
        message: Some("from database".into()),
        uptime_secs: Some(30),
        error: None,
        updated_at: Utc::now(),
    }
}

#[tokio::test]
async fn progress_prefers_fast_store() {
    let t = common::build_test_app();
    t.store.insert_stream(streaming_on(10, 1));
    t.store.insert_progress(durable_progress(10));
    t.cache
        .put_live_status(
            10,
            &ActiveStreamReport {
                progress: Some(80.0),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let response = get(t.app(), "/api/v1/streams/10/progress").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["data"]["source"], "live");
    assert_eq!(json["data"]["progress"], 80.0);
}

#[tokio::test]
async fn progress_falls_back_to_durable_row() {
    let t = common::build_test_app();
    t.store.insert_stream(streaming_on(10, 1));
    t.store.insert_progress(durable_progress(10));
    t.cache.set_unavailable(true);

    let response = get(t.app(), "/api/v1/streams/10/progress").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["data"]["source"], "durable");
    assert_eq!(json["data"]["message"], "from database");
}

#[tokio::test]
async fn progress_without_reports_is_404() {
    let t = common::build_test_app();
    t.store.insert_stream(stream(10, StreamStatus::Inactive));

    let response = get(t.app(), "/api/v1/streams/10/progress").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = get(t.app(), "/api/v1/streams/11/progress").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
