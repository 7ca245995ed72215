//! Stream lifecycle orchestration.
//!
//! Start: allocate a worker, mark STARTING, build and upload the job spec,
//! ask the worker agent to start, then mark STREAMING or ERROR.
//! Stop: ask the agent to stop, then mark INACTIVE and release the worker.
//!
//! The worker's stream counter is incremented only once the stream is
//! persisted as STREAMING, and decremented only for a stream that held a slot.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use chrono::Utc;
use streamfleet_core::agent::{parse_response, remote_config_path, start_command, stop_command, AgentError};
use streamfleet_core::error::CoreError;
use streamfleet_core::job_spec::{MediaItem, StreamJobSpec};
use streamfleet_core::stream_state::{StreamEvent, StreamStatus};
use streamfleet_core::throttle::LogThrottle;
use streamfleet_core::types::DbId;
use streamfleet_db::models::stream::StreamConfig;
use streamfleet_db::models::vps::VpsServer;

use crate::allocator::StreamAllocator;
use crate::cache::{warn_throttled, TelemetryCache};
use crate::config::FleetConfig;
use crate::connection::RemoteShell;
use crate::error::StreamError;
use crate::media::MediaResolver;
use crate::store::FleetStore;

pub struct StreamManager {
    store: Arc<dyn FleetStore>,
    cache: Arc<dyn TelemetryCache>,
    shell: Arc<dyn RemoteShell>,
    media: Arc<dyn MediaResolver>,
    allocator: StreamAllocator,
    throttle: Arc<LogThrottle>,
    agent_port: u16,
    remote_config_dir: String,
}

impl StreamManager {
    pub fn new(
        store: Arc<dyn FleetStore>,
        cache: Arc<dyn TelemetryCache>,
        shell: Arc<dyn RemoteShell>,
        media: Arc<dyn MediaResolver>,
        allocator: StreamAllocator,
        throttle: Arc<LogThrottle>,
        config: &FleetConfig,
    ) -> Self {
        Self {
            store,
            cache,
            shell,
            media,
            allocator,
            throttle,
            agent_port: config.agent_port,
            remote_config_dir: config.remote_config_dir.clone(),
        }
    }

    async fn load(&self, stream_id: DbId) -> Result<StreamConfig, StreamError> {
        self.store
            .get_stream(stream_id)
            .await?
            .ok_or(StreamError::NotFound(stream_id))
    }

    /// Start a stream on the least-loaded eligible worker.
    ///
    /// Returns the chosen worker id. Any failure after the worker was
    /// chosen leaves the stream in ERROR with the worker still assigned.
    pub async fn start_stream(&self, stream_id: DbId) -> Result<DbId, StreamError> {
        let stream = self.load(stream_id).await?;
        let current = stream.status()?;
        current.apply(StreamEvent::BeginStart)?;

        let vps = self.allocator.find_optimal_vps(&stream).await?;

        if !self.store.begin_start(stream.id, current, vps.id).await? {
            return Err(StreamError::Transition(CoreError::Conflict(
                "Stream state changed while starting".to_string(),
            )));
        }
        tracing::info!(stream_id, worker_id = vps.id, "Starting stream");

        match self.launch(&stream, &vps).await {
            Ok(()) => {
                let next = StreamStatus::Starting.apply(StreamEvent::StartSucceeded)?;
                if !self.store.mark_streaming(stream.id, vps.id, Utc::now()).await? {
                    tracing::warn!(
                        stream_id,
                        worker_id = vps.id,
                        "Stream left STARTING while the agent was starting it, stopping it again",
                    );
                    self.send_stop(&vps, stream_id).await;
                    return Err(StreamError::Transition(CoreError::Conflict(
                        "Stream state changed while starting".to_string(),
                    )));
                }
                self.store.increment_streams(vps.id).await?;
                tracing::info!(stream_id, worker_id = vps.id, status = %next, "Stream started");
                Ok(vps.id)
            }
            Err(e) => {
                let next = StreamStatus::Starting.apply(StreamEvent::StartFailed)?;
                tracing::error!(
                    stream_id,
                    worker_id = vps.id,
                    status = %next,
                    error = %e,
                    "Failed to start stream",
                );
                if !self
                    .store
                    .mark_error(stream.id, StreamStatus::Starting, &e.to_string())
                    .await?
                {
                    tracing::warn!(stream_id, "Stream left STARTING before the failure was recorded");
                }
                Err(e)
            }
        }
    }

    /// Best-effort stop for a process nobody wants any more.
    async fn send_stop(&self, vps: &VpsServer, stream_id: DbId) {
        let outcome = self
            .shell
            .execute(vps, &stop_command(self.agent_port, stream_id))
            .await;
        if !outcome.success {
            tracing::warn!(
                stream_id,
                worker_id = vps.id,
                error = %outcome.failure_reason(),
                "Stop command for orphaned start failed",
            );
        }
    }

    /// Upload the job spec and ask the agent to start it.
    async fn launch(&self, stream: &StreamConfig, vps: &VpsServer) -> Result<(), StreamError> {
        let spec = self.build_job_spec(stream).await?;
        let remote_path = remote_config_path(&self.remote_config_dir, stream.id);

        let mut file = tempfile::NamedTempFile::new().map_err(|e| {
            tracing::error!(stream_id = stream.id, error = %e, "Failed to create temp file");
            StreamError::ConfigUpload
        })?;
        serde_json::to_writer(file.as_file_mut(), &spec)
            .map_err(std::io::Error::from)
            .and_then(|()| file.as_file_mut().flush())
            .map_err(|e| {
                tracing::error!(stream_id = stream.id, error = %e, "Failed to write job spec");
                StreamError::ConfigUpload
            })?;

        if !self.shell.upload_file(vps, file.path(), &remote_path).await {
            return Err(StreamError::ConfigUpload);
        }

        let outcome = self
            .shell
            .execute(vps, &start_command(self.agent_port, &remote_path))
            .await;
        if !outcome.success {
            return Err(StreamError::Remote(outcome.failure_reason()));
        }
        parse_response(&outcome.stdout).map(|_| ()).map_err(agent_error)
    }

    /// Assemble the worker-side job spec. Media references that no longer
    /// exist or cannot be resolved to a URL are dropped.
    pub async fn build_job_spec(&self, stream: &StreamConfig) -> Result<StreamJobSpec, StreamError> {
        let files: HashMap<DbId, _> = self
            .store
            .list_media_files(&stream.media_file_ids)
            .await?
            .into_iter()
            .map(|f| (f.id, f))
            .collect();

        let now = Utc::now();
        let media_files = stream
            .media_file_ids
            .iter()
            .filter_map(|id| {
                let Some(file) = files.get(id) else {
                    tracing::debug!(stream_id = stream.id, file_id = id, "Media file missing, skipped");
                    return None;
                };
                let Some(download_url) = self.media.download_url(file, now) else {
                    tracing::debug!(stream_id = stream.id, file_id = id, "Media file has no URL, skipped");
                    return None;
                };
                Some(MediaItem {
                    file_id: file.id,
                    filename: file.filename.clone(),
                    download_url,
                    size: file.size_bytes,
                })
            })
            .collect();

        Ok(StreamJobSpec {
            stream_id: stream.id,
            title: stream.title.clone(),
            rtmp_url: stream.rtmp_url.clone(),
            stream_key: stream.stream_key.clone(),
            media_files,
            loop_playlist: stream.loop_playlist,
            playback_order: stream.playback_order(),
            user_id: stream.user_id,
        })
    }

    /// Stop a stream on its assigned worker.
    ///
    /// Nothing is changed when the stop command fails.
    ///
    /// A failed stop leaves the status alone, except for a stream already in
    /// STOPPING: that retry failing moves it to ERROR and gives its slot back.
    pub async fn stop_stream(&self, stream_id: DbId) -> Result<(), StreamError> {
        let stream = self.load(stream_id).await?;
        let current = stream.status()?;
        match self.stop_loaded(&stream, current).await {
            Err(e @ (StreamError::Remote(_) | StreamError::InvalidResponse))
                if current == StreamStatus::Stopping =>
            {
                self.record_stop_failure(&stream, &e).await?;
                Err(e)
            }
            other => other,
        }
    }

    async fn record_stop_failure(
        &self,
        stream: &StreamConfig,
        err: &StreamError,
    ) -> Result<(), StreamError> {
        let next = StreamStatus::Stopping.apply(StreamEvent::StopFailed)?;
        let message = format!("Stop failed: {err}");
        if !self
            .store
            .mark_error(stream.id, StreamStatus::Stopping, &message)
            .await?
        {
            tracing::warn!(
                stream_id = stream.id,
                "Stream left STOPPING before the failure was recorded",
            );
            return Ok(());
        }
        if let Some(vps_id) = stream.vps_server_id {
            self.store.decrement_streams(vps_id).await?;
        }
        tracing::error!(
            stream_id = stream.id,
            worker_id = ?stream.vps_server_id,
            status = %next,
            error = %err,
            "Stop retry failed",
        );
        Ok(())
    }

    /// Stop `stream`, which was in `before_stop` when the stop was requested.
    ///
    /// The worker counter is given back only when `before_stop` held a slot.
    pub(crate) async fn stop_loaded(
        &self,
        stream: &StreamConfig,
        before_stop: StreamStatus,
    ) -> Result<(), StreamError> {
        let stream_id = stream.id;
        let Some(vps_id) = stream.vps_server_id else {
            return Err(StreamError::NoWorkerAssigned);
        };
        before_stop.apply(StreamEvent::BeginStop)?;

        let vps = self
            .store
            .get_vps(vps_id)
            .await?
            .ok_or_else(|| StreamError::Remote(format!("Assigned VPS server {vps_id} not found")))?;

        let outcome = self
            .shell
            .execute(&vps, &stop_command(self.agent_port, stream_id))
            .await;
        if !outcome.success {
            let err = StreamError::Remote(outcome.failure_reason());
            tracing::warn!(stream_id, worker_id = vps_id, error = %err, "Stop command failed");
            return Err(err);
        }
        if let Err(e) = parse_response(&outcome.stdout) {
            let err = agent_error(e);
            tracing::warn!(stream_id, worker_id = vps_id, error = %err, "Agent refused to stop stream");
            return Err(err);
        }

        // The agent has stopped the process; from here the database must follow.
        if let Err(e) = self.cache.clear_live_status(stream_id).await {
            warn_throttled(&self.throttle, "stop.live_status", &e);
        }
        let next = StreamStatus::Stopping.apply(StreamEvent::StopSucceeded)?;
        self.store.mark_stopped(stream_id, Utc::now(), None).await?;
        if before_stop.holds_worker_slot() {
            self.store.decrement_streams(vps_id).await?;
        }
        if let Err(e) = self.store.delete_progress(stream_id).await {
            tracing::warn!(stream_id, error = %e, "Failed to clear stream progress");
        }

        tracing::info!(
            stream_id,
            worker_id = vps_id,
            from = %before_stop,
            status = %next,
            "Stream stopped",
        );
        Ok(())
    }

    /// Move a stream out of ERROR back to INACTIVE and release its worker.
    pub async fn recover(&self, stream_id: DbId) -> Result<(), StreamError> {
        let stream = self.load(stream_id).await?;
        let next = stream.status()?.apply(StreamEvent::Recover)?;
        self.store.mark_stopped(stream_id, Utc::now(), None).await?;
        tracing::info!(
            stream_id,
            worker_id = ?stream.vps_server_id,
            status = %next,
            "Stream recovered from error",
        );
        Ok(())
    }
}

fn agent_error(err: AgentError) -> StreamError {
    match err {
        AgentError::InvalidResponse => StreamError::InvalidResponse,
        AgentError::Reported(message) => StreamError::Remote(message),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{CommandOutcome, ConnectionCheck};
    use crate::media::SignedMediaResolver;
    use crate::testing::{media_file, stream, vps, FakeShell, InMemoryCache, InMemoryStore, ShellCall};
    use assert_matches::assert_matches;
    use streamfleet_core::allocation::AllocationThresholds;
    use streamfleet_core::telemetry::{ActiveStreamReport, CachedSample};
    use streamfleet_core::throttle::LogThrottle;

    struct Harness {
        store: Arc<InMemoryStore>,
        cache: Arc<InMemoryCache>,
        shell: Arc<FakeShell>,
        manager: StreamManager,
    }

    fn manager_with(
        store: &Arc<InMemoryStore>,
        cache: &Arc<InMemoryCache>,
        shell: Arc<dyn RemoteShell>,
    ) -> StreamManager {
        let throttle = Arc::new(LogThrottle::default());
        let allocator = StreamAllocator::new(
            store.clone(),
            cache.clone(),
            throttle.clone(),
            AllocationThresholds::default(),
        );
        let media = Arc::new(SignedMediaResolver::new(
            Some("https://api.example.com".into()),
            Some("secret".into()),
            3600,
        ));
        StreamManager::new(
            store.clone(),
            cache.clone(),
            shell,
            media,
            allocator,
            throttle,
            &FleetConfig::default(),
        )
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryStore::default());
        let cache = Arc::new(InMemoryCache::default());
        let shell = Arc::new(FakeShell::default());
        let manager = manager_with(&store, &cache, shell.clone());
        Harness {
            store,
            cache,
            shell,
            manager,
        }
    }

    /// Lands a stop of `stream_id` while the agent is handling the start.
    struct StoppedMidStart {
        inner: Arc<FakeShell>,
        store: Arc<InMemoryStore>,
        stream_id: DbId,
    }

    #[async_trait::async_trait]
    impl RemoteShell for StoppedMidStart {
        async fn test_connection(&self, vps: &VpsServer) -> ConnectionCheck {
            self.inner.test_connection(vps).await
        }

        async fn execute(&self, vps: &VpsServer, command: &str) -> CommandOutcome {
            if command.contains("/start_stream") {
                self.store
                    .mark_stopped(self.stream_id, Utc::now(), Some("stopped by operator"))
                    .await
                    .unwrap();
            }
            self.inner.execute(vps, command).await
        }

        async fn upload_file(&self, vps: &VpsServer, local: &std::path::Path, remote: &str) -> bool {
            self.inner.upload_file(vps, local, remote).await
        }

        async fn download_file(&self, vps: &VpsServer, remote: &str, local: &std::path::Path) -> bool {
            self.inner.download_file(vps, remote, local).await
        }

        async fn read_file(&self, vps: &VpsServer, path: &str) -> Option<String> {
            self.inner.read_file(vps, path).await
        }
    }

    async fn healthy_worker(h: &Harness, id: DbId, ram: f64) {
        h.store.insert_vps(vps(id, &format!("edge-{id}")));
        let sample = CachedSample {
            cpu_usage: 10.0,
            ram_usage: ram,
            disk_usage: 10.0,
            total_streams: None,
            timestamp: Utc::now().timestamp(),
        };
        h.cache.put_worker_sample(id, &sample).await.unwrap();
    }

    fn streaming_on(id: DbId, worker_id: DbId) -> StreamConfig {
        let mut s = stream(id, StreamStatus::Streaming);
        s.vps_server_id = Some(worker_id);
        s
    }

    // -----------------------------------------------------------------------
    // start_stream
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn start_success_marks_streaming_and_counts() {
        let h = harness();
        healthy_worker(&h, 1, 50.0).await;
        healthy_worker(&h, 2, 20.0).await;
        let mut s = stream(10, StreamStatus::Inactive);
        s.error_message = Some("old failure".into());
        h.store.insert_stream(s);

        assert_eq!(h.manager.start_stream(10).await.unwrap(), 2);

        let row = h.store.stream_row(10).unwrap();
        assert_eq!(row.status().unwrap(), StreamStatus::Streaming);
        assert_eq!(row.vps_server_id, Some(2));
        assert!(row.last_started_at.is_some());
        assert_eq!(row.error_message, None);
        assert_eq!(h.store.vps_row(2).unwrap().current_streams, 1);

        let calls = h.shell.calls();
        assert_matches!(&calls[0], ShellCall::Upload { worker_id: 2, remote, .. } => {
            assert_eq!(remote, "/tmp/stream_config_10.json");
        });
        assert!(h.shell.commands()[0].contains("/start_stream"));
    }

    #[tokio::test]
    async fn already_streaming_is_rejected() {
        let h = harness();
        healthy_worker(&h, 1, 10.0).await;
        h.store.insert_stream(streaming_on(10, 1));

        assert_matches!(h.manager.start_stream(10).await, Err(StreamError::Transition(_)));
        assert!(h.shell.calls().is_empty());
    }

    #[tokio::test]
    async fn no_eligible_worker_leaves_stream_untouched() {
        let h = harness();
        h.store.insert_vps(vps(1, "silent"));
        h.store.insert_stream(stream(10, StreamStatus::Inactive));

        assert_matches!(
            h.manager.start_stream(10).await,
            Err(StreamError::NoAvailableWorker(_))
        );
        let row = h.store.stream_row(10).unwrap();
        assert_eq!(row.status().unwrap(), StreamStatus::Inactive);
        assert_eq!(row.vps_server_id, None);
    }

    #[tokio::test]
    async fn upload_failure_marks_error_and_keeps_worker() {
        let h = harness();
        healthy_worker(&h, 1, 10.0).await;
        h.store.insert_stream(stream(10, StreamStatus::Inactive));
        h.shell.set_upload_ok(false);

        assert_matches!(h.manager.start_stream(10).await, Err(StreamError::ConfigUpload));
        let row = h.store.stream_row(10).unwrap();
        assert_eq!(row.status().unwrap(), StreamStatus::Error);
        assert_eq!(row.vps_server_id, Some(1));
        assert_eq!(row.error_message.as_deref(), Some("Failed to upload config to VPS"));
        assert_eq!(h.store.vps_row(1).unwrap().current_streams, 0);
        assert!(h.shell.commands().is_empty());
    }

    #[tokio::test]
    async fn garbage_agent_output_is_invalid_response() {
        let h = harness();
        healthy_worker(&h, 1, 10.0).await;
        h.store.insert_stream(stream(10, StreamStatus::Inactive));
        h.shell.push_outcome(FakeShell::ok("<html>502</html>"));

        assert_matches!(h.manager.start_stream(10).await, Err(StreamError::InvalidResponse));
        let row = h.store.stream_row(10).unwrap();
        assert_eq!(row.status().unwrap(), StreamStatus::Error);
        assert_eq!(row.error_message.as_deref(), Some("Invalid response from VPS"));
    }

    #[tokio::test]
    async fn agent_error_is_reported_verbatim() {
        let h = harness();
        healthy_worker(&h, 1, 10.0).await;
        h.store.insert_stream(stream(10, StreamStatus::Error));
        h.shell.push_outcome(FakeShell::ok(r#"{"error": "ffmpeg not found"}"#));

        assert_matches!(h.manager.start_stream(10).await, Err(StreamError::Remote(msg)) => {
            assert_eq!(msg, "ffmpeg not found");
        });
        assert_eq!(
            h.store.stream_row(10).unwrap().error_message.as_deref(),
            Some("ffmpeg not found")
        );
    }

    #[tokio::test]
    async fn stop_landing_during_start_wins_and_the_process_is_stopped() {
        let store = Arc::new(InMemoryStore::default());
        let cache = Arc::new(InMemoryCache::default());
        let inner = Arc::new(FakeShell::default());
        let shell = Arc::new(StoppedMidStart {
            inner: inner.clone(),
            store: store.clone(),
            stream_id: 10,
        });
        let manager = manager_with(&store, &cache, shell);
        store.insert_vps(vps(1, "edge-1"));
        cache
            .put_worker_sample(
                1,
                &CachedSample {
                    cpu_usage: 10.0,
                    ram_usage: 10.0,
                    disk_usage: 10.0,
                    total_streams: None,
                    timestamp: Utc::now().timestamp(),
                },
            )
            .await
            .unwrap();
        store.insert_stream(stream(10, StreamStatus::Inactive));

        assert_matches!(manager.start_stream(10).await, Err(StreamError::Transition(_)));

        let row = store.stream_row(10).unwrap();
        assert_eq!(row.status().unwrap(), StreamStatus::Inactive);
        assert_eq!(row.vps_server_id, None);
        assert_eq!(row.error_message.as_deref(), Some("stopped by operator"));
        assert_eq!(store.vps_row(1).unwrap().current_streams, 0);
        let commands = inner.commands();
        assert_eq!(commands.len(), 2);
        assert!(commands[1].contains("/stop_stream"));
    }

    #[tokio::test]
    async fn unknown_stream_is_not_found() {
        let h = harness();
        assert_matches!(h.manager.start_stream(404).await, Err(StreamError::NotFound(404)));
    }

    // -----------------------------------------------------------------------
    // build_job_spec
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn job_spec_keeps_order_and_drops_unresolvable_media() {
        let h = harness();
        let mut cdn = media_file(3, 1);
        cdn.cdn_url = Some("https://cdn.example.com/3.mp4".into());
        h.store.insert_media(cdn);
        h.store.insert_media(media_file(1, 1));

        let mut s = stream(10, StreamStatus::Inactive);
        s.media_file_ids = vec![3, 2, 1];
        s.playback_order = "random".into();
        s.loop_playlist = false;

        let spec = h.manager.build_job_spec(&s).await.unwrap();
        let ids: Vec<DbId> = spec.media_files.iter().map(|m| m.file_id).collect();
        assert_eq!(ids, vec![3, 1]);
        assert_eq!(spec.media_files[0].download_url, "https://cdn.example.com/3.mp4");
        assert!(spec.media_files[1]
            .download_url
            .starts_with("https://api.example.com/media/1/download"));
        assert_eq!(spec.playback_order, streamfleet_core::job_spec::PlaybackOrder::Shuffle);
        assert!(!spec.loop_playlist);
        assert_eq!(spec.stream_key, "secret-key");
    }

    #[tokio::test]
    async fn uploaded_spec_is_the_serialized_job() {
        let h = harness();
        healthy_worker(&h, 1, 10.0).await;
        h.store.insert_stream(stream(10, StreamStatus::Inactive));
        h.manager.start_stream(10).await.unwrap();

        let ShellCall::Upload { contents, .. } = &h.shell.calls()[0] else {
            panic!("expected an upload first");
        };
        let spec: StreamJobSpec = serde_json::from_str(contents).unwrap();
        assert_eq!(spec.stream_id, 10);
        assert_eq!(spec.rtmp_url, "rtmp://live.example.com/app");
    }

    // -----------------------------------------------------------------------
    // stop_stream / recover
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn stop_on_inactive_stream_is_rejected_without_side_effects() {
        let h = harness();
        h.store.insert_vps(vps(1, "edge-1"));
        h.store.insert_stream(stream(10, StreamStatus::Inactive));
        let before = h.store.stream_row(10).unwrap();

        assert_matches!(h.manager.stop_stream(10).await, Err(StreamError::NoWorkerAssigned));
        assert!(h.shell.calls().is_empty());
        let after = h.store.stream_row(10).unwrap();
        assert_eq!(after.status_id, before.status_id);
        assert_eq!(after.updated_at, before.updated_at);
    }

    #[tokio::test]
    async fn stop_success_releases_worker() {
        let h = harness();
        let mut worker = vps(1, "edge-1");
        worker.current_streams = 1;
        h.store.insert_vps(worker);
        h.store.insert_stream(streaming_on(10, 1));
        h.cache
            .put_live_status(10, &ActiveStreamReport::default())
            .await
            .unwrap();

        h.manager.stop_stream(10).await.unwrap();

        let row = h.store.stream_row(10).unwrap();
        assert_eq!(row.status().unwrap(), StreamStatus::Inactive);
        assert_eq!(row.vps_server_id, None);
        assert!(row.last_stopped_at.is_some());
        assert_eq!(h.store.vps_row(1).unwrap().current_streams, 0);
        assert!(h.cache.live_status(10).await.unwrap().is_none());
        assert!(h.shell.commands()[0].contains(r#"{"stream_id": 10}"#));
    }

    #[tokio::test]
    async fn failed_stop_command_changes_nothing() {
        let h = harness();
        let mut worker = vps(1, "edge-1");
        worker.current_streams = 1;
        h.store.insert_vps(worker);
        h.store.insert_stream(streaming_on(10, 1));
        h.shell.push_outcome(CommandOutcome::failed("Connection timed out"));

        assert_matches!(h.manager.stop_stream(10).await, Err(StreamError::Remote(_)));
        let row = h.store.stream_row(10).unwrap();
        assert_eq!(row.status().unwrap(), StreamStatus::Streaming);
        assert_eq!(row.vps_server_id, Some(1));
        assert_eq!(h.store.vps_row(1).unwrap().current_streams, 1);
    }

    #[tokio::test]
    async fn failed_stop_retry_out_of_stopping_parks_stream_in_error() {
        let h = harness();
        let mut worker = vps(1, "edge-1");
        worker.current_streams = 1;
        h.store.insert_vps(worker);
        let mut stopping = streaming_on(10, 1);
        stopping.status_id = StreamStatus::Stopping.id();
        h.store.insert_stream(stopping);
        h.shell.push_outcome(FakeShell::ok(r#"{"error": "no such stream"}"#));

        assert_matches!(h.manager.stop_stream(10).await, Err(StreamError::Remote(msg)) => {
            assert_eq!(msg, "no such stream");
        });
        let row = h.store.stream_row(10).unwrap();
        assert_eq!(row.status().unwrap(), StreamStatus::Error);
        assert_eq!(row.vps_server_id, Some(1));
        assert_eq!(row.error_message.as_deref(), Some("Stop failed: no such stream"));
        assert_eq!(h.store.vps_row(1).unwrap().current_streams, 0);

        // ERROR holds no slot, so stopping it later leaves the count alone.
        h.manager.stop_stream(10).await.unwrap();
        assert_eq!(h.store.vps_row(1).unwrap().current_streams, 0);
    }

    #[tokio::test]
    async fn stopping_a_failed_start_keeps_the_running_count() {
        let h = harness();
        let mut worker = vps(1, "edge-1");
        worker.current_streams = 1;
        h.store.insert_vps(worker);
        h.store.insert_stream(streaming_on(20, 1));
        let mut failed = stream(10, StreamStatus::Error);
        failed.vps_server_id = Some(1);
        h.store.insert_stream(failed);

        h.manager.stop_stream(10).await.unwrap();

        let row = h.store.stream_row(10).unwrap();
        assert_eq!(row.status().unwrap(), StreamStatus::Inactive);
        assert_eq!(row.vps_server_id, None);
        assert_eq!(h.store.vps_row(1).unwrap().current_streams, 1);
    }

    #[tokio::test]
    async fn stopping_a_starting_stream_keeps_the_running_count() {
        let h = harness();
        let mut worker = vps(1, "edge-1");
        worker.current_streams = 1;
        h.store.insert_vps(worker);
        h.store.insert_stream(streaming_on(20, 1));
        let mut starting = stream(10, StreamStatus::Starting);
        starting.vps_server_id = Some(1);
        h.store.insert_stream(starting);

        h.manager.stop_stream(10).await.unwrap();

        assert_eq!(
            h.store.stream_row(10).unwrap().status().unwrap(),
            StreamStatus::Inactive
        );
        assert_eq!(h.store.vps_row(1).unwrap().current_streams, 1);
    }

    #[tokio::test]
    async fn stop_completes_while_fast_store_is_down() {
        let h = harness();
        let mut worker = vps(1, "edge-1");
        worker.current_streams = 1;
        h.store.insert_vps(worker);
        h.store.insert_stream(streaming_on(10, 1));
        h.cache.set_unavailable(true);

        h.manager.stop_stream(10).await.unwrap();

        let row = h.store.stream_row(10).unwrap();
        assert_eq!(row.status().unwrap(), StreamStatus::Inactive);
        assert_eq!(row.vps_server_id, None);
        assert_eq!(h.store.vps_row(1).unwrap().current_streams, 0);
        assert_eq!(h.shell.commands().len(), 1);
    }

    #[tokio::test]
    async fn recover_moves_error_to_inactive() {
        let h = harness();
        let mut s = stream(10, StreamStatus::Error);
        s.vps_server_id = Some(1);
        s.error_message = Some("boom".into());
        h.store.insert_stream(s);

        h.manager.recover(10).await.unwrap();
        let row = h.store.stream_row(10).unwrap();
        assert_eq!(row.status().unwrap(), StreamStatus::Inactive);
        assert_eq!(row.vps_server_id, None);
        assert_eq!(row.error_message, None);

        assert_matches!(h.manager.recover(10).await, Err(StreamError::Transition(_)));
    }
}
