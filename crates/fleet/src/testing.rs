//! In-memory doubles for the store, fast store and remote shell, plus row
//! fixtures. Compiled for tests and behind the `test-support` feature.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use streamfleet_core::stream_state::StreamStatus;
use streamfleet_core::types::{DbId, Timestamp};
use streamfleet_db::models::media::MediaFile;
use streamfleet_db::models::status::VpsStatus;
use streamfleet_db::models::stream::StreamConfig;
use streamfleet_db::models::telemetry::{
    CreateTelemetrySample, SampleAggregate, StreamProgress, TelemetrySample, UpsertStreamProgress,
};
use streamfleet_db::models::vps::VpsServer;

use crate::cache::TelemetryCache;
use crate::connection::{CommandOutcome, ConnectionCheck, RemoteShell};
use crate::error::{CacheError, FleetError};
use crate::store::{FleetStore, StoreResult};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// An active worker at `10.0.0.1` with capacity 10 and no streams.
pub fn vps(id: DbId, name: &str) -> VpsServer {
    let now = Utc::now();
    VpsServer {
        id,
        name: name.to_string(),
        ip_address: "10.0.0.1".to_string(),
        ssh_port: 22,
        ssh_user: "root".to_string(),
        ssh_key_path: None,
        ssh_password: None,
        status_id: VpsStatus::Active.id(),
        max_streams: 10,
        current_streams: 0,
        last_seen_at: None,
        created_at: now,
        updated_at: now,
    }
}

/// A stream job in `status` with no worker and no media.
pub fn stream(id: DbId, status: StreamStatus) -> StreamConfig {
    let now = Utc::now();
    StreamConfig {
        id,
        user_id: 1,
        title: format!("Stream {id}"),
        media_file_ids: Vec::new(),
        rtmp_url: "rtmp://live.example.com/app".to_string(),
        stream_key: "secret-key".to_string(),
        loop_playlist: true,
        playback_order: "sequential".to_string(),
        vps_server_id: None,
        status_id: status.id(),
        last_started_at: None,
        last_stopped_at: None,
        error_message: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn media_file(id: DbId, user_id: DbId) -> MediaFile {
    MediaFile {
        id,
        user_id,
        filename: format!("clip-{id}.mp4"),
        size_bytes: 1_048_576,
        cdn_url: None,
        created_at: Utc::now(),
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StoreState {
    vps: BTreeMap<DbId, VpsServer>,
    streams: BTreeMap<DbId, StreamConfig>,
    media: BTreeMap<DbId, MediaFile>,
    samples: Vec<TelemetrySample>,
    progress: BTreeMap<DbId, StreamProgress>,
    next_sample_id: DbId,
}

/// [`FleetStore`] over plain maps. Writes stamp `updated_at` like the
/// database trigger does.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
    unavailable: AtomicBool,
    worker_lookups_failing: AtomicBool,
}

impl InMemoryStore {
    fn state(&self) -> StoreResult<std::sync::MutexGuard<'_, StoreState>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(FleetError::Unavailable("store offline".into()));
        }
        Ok(self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()))
    }

    fn peek(&self) -> std::sync::MutexGuard<'_, StoreState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make every store call fail until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make `get_vps` fail while every other call keeps working.
    pub fn set_worker_lookups_failing(&self, failing: bool) {
        self.worker_lookups_failing.store(failing, Ordering::SeqCst);
    }

    pub fn insert_vps(&self, vps: VpsServer) {
        self.peek().vps.insert(vps.id, vps);
    }

    pub fn insert_stream(&self, stream: StreamConfig) {
        self.peek().streams.insert(stream.id, stream);
    }

    pub fn insert_media(&self, file: MediaFile) {
        self.peek().media.insert(file.id, file);
    }

    /// Insert a sample row directly, bypassing ingestion.
    pub fn insert_raw_sample(&self, vps_id: DbId, cpu: f64, ram: f64, disk: f64, at: Timestamp) {
        let mut state = self.peek();
        state.next_sample_id += 1;
        let id = state.next_sample_id;
        state.samples.push(TelemetrySample {
            id,
            vps_server_id: vps_id,
            cpu_usage: cpu,
            ram_usage: ram,
            disk_usage: disk,
            recorded_at: at,
            created_at: at,
        });
    }

    pub fn insert_progress(&self, progress: StreamProgress) {
        self.peek().progress.insert(progress.stream_config_id, progress);
    }

    pub fn vps_row(&self, id: DbId) -> Option<VpsServer> {
        self.peek().vps.get(&id).cloned()
    }

    pub fn stream_row(&self, id: DbId) -> Option<StreamConfig> {
        self.peek().streams.get(&id).cloned()
    }

    pub fn progress_row(&self, id: DbId) -> Option<StreamProgress> {
        self.peek().progress.get(&id).cloned()
    }

    pub fn samples_for(&self, vps_id: DbId) -> Vec<TelemetrySample> {
        self.peek()
            .samples
            .iter()
            .filter(|s| s.vps_server_id == vps_id)
            .cloned()
            .collect()
    }
}

fn streaming_counts(state: &StoreState) -> HashMap<DbId, i64> {
    let mut counts = HashMap::new();
    for stream in state.streams.values() {
        if stream.status_id == StreamStatus::Streaming.id() {
            if let Some(vps_id) = stream.vps_server_id {
                *counts.entry(vps_id).or_insert(0) += 1;
            }
        }
    }
    counts
}

#[async_trait]
impl FleetStore for InMemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        self.state().map(|_| ())
    }

    async fn get_vps(&self, id: DbId) -> StoreResult<Option<VpsServer>> {
        if self.worker_lookups_failing.load(Ordering::SeqCst) {
            return Err(FleetError::Unavailable("worker lookup failed".into()));
        }
        Ok(self.state()?.vps.get(&id).cloned())
    }

    async fn list_vps(&self) -> StoreResult<Vec<VpsServer>> {
        Ok(self.state()?.vps.values().cloned().collect())
    }

    async fn list_active_vps(&self) -> StoreResult<Vec<VpsServer>> {
        Ok(self
            .state()?
            .vps
            .values()
            .filter(|v| v.is_active())
            .cloned()
            .collect())
    }

    async fn increment_streams(&self, id: DbId) -> StoreResult<()> {
        if let Some(vps) = self.state()?.vps.get_mut(&id) {
            vps.current_streams += 1;
            vps.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn decrement_streams(&self, id: DbId) -> StoreResult<()> {
        if let Some(vps) = self.state()?.vps.get_mut(&id) {
            vps.current_streams = (vps.current_streams - 1).max(0);
            vps.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_streams(&self, id: DbId, count: i32) -> StoreResult<()> {
        if let Some(vps) = self.state()?.vps.get_mut(&id) {
            vps.current_streams = count.max(0);
            vps.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn reset_all_streams(&self) -> StoreResult<u64> {
        let mut state = self.state()?;
        let counts = streaming_counts(&state);
        let mut changed = 0;
        for vps in state.vps.values_mut() {
            let truth = counts.get(&vps.id).copied().unwrap_or(0) as i32;
            if vps.current_streams != truth {
                vps.current_streams = truth;
                vps.updated_at = Utc::now();
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn record_self_report(
        &self,
        id: DbId,
        total_streams: Option<i32>,
        seen_at: Timestamp,
    ) -> StoreResult<()> {
        if let Some(vps) = self.state()?.vps.get_mut(&id) {
            vps.last_seen_at = Some(seen_at);
            if let Some(total) = total_streams {
                vps.current_streams = total;
            }
            vps.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn get_stream(&self, id: DbId) -> StoreResult<Option<StreamConfig>> {
        Ok(self.state()?.streams.get(&id).cloned())
    }

    async fn list_streams_by_ids(&self, ids: &[DbId]) -> StoreResult<Vec<StreamConfig>> {
        let state = self.state()?;
        Ok(state
            .streams
            .values()
            .filter(|s| ids.contains(&s.id))
            .cloned()
            .collect())
    }

    async fn list_stuck_streams(
        &self,
        status: StreamStatus,
        cutoff: Timestamp,
    ) -> StoreResult<Vec<StreamConfig>> {
        Ok(self
            .state()?
            .streams
            .values()
            .filter(|s| s.status_id == status.id() && s.updated_at < cutoff)
            .cloned()
            .collect())
    }

    async fn count_streaming_by_vps(&self) -> StoreResult<HashMap<DbId, i64>> {
        let state = self.state()?;
        Ok(streaming_counts(&state))
    }

    async fn begin_start(
        &self,
        id: DbId,
        expected: StreamStatus,
        vps_id: DbId,
    ) -> StoreResult<bool> {
        let mut state = self.state()?;
        match state.streams.get_mut(&id) {
            Some(s) if s.status_id == expected.id() => {
                s.status_id = StreamStatus::Starting.id();
                s.vps_server_id = Some(vps_id);
                s.error_message = None;
                s.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_streaming(
        &self,
        id: DbId,
        vps_id: DbId,
        started_at: Timestamp,
    ) -> StoreResult<bool> {
        let mut state = self.state()?;
        match state.streams.get_mut(&id) {
            Some(s)
                if s.status_id == StreamStatus::Starting.id()
                    && s.vps_server_id == Some(vps_id) =>
            {
                s.status_id = StreamStatus::Streaming.id();
                s.last_started_at = Some(started_at);
                s.error_message = None;
                s.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_error(
        &self,
        id: DbId,
        expected: StreamStatus,
        message: &str,
    ) -> StoreResult<bool> {
        let mut state = self.state()?;
        match state.streams.get_mut(&id) {
            Some(s) if s.status_id == expected.id() => {
                s.status_id = StreamStatus::Error.id();
                s.error_message = Some(message.to_string());
                s.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_stopping(&self, id: DbId, expected: StreamStatus) -> StoreResult<bool> {
        let mut state = self.state()?;
        match state.streams.get_mut(&id) {
            Some(s) if s.status_id == expected.id() => {
                s.status_id = StreamStatus::Stopping.id();
                s.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_stopped(
        &self,
        id: DbId,
        stopped_at: Timestamp,
        message: Option<&str>,
    ) -> StoreResult<bool> {
        let mut state = self.state()?;
        match state.streams.get_mut(&id) {
            Some(s) => {
                s.status_id = StreamStatus::Inactive.id();
                s.vps_server_id = None;
                s.last_stopped_at = Some(stopped_at);
                s.error_message = message.map(str::to_string);
                s.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_media_files(&self, ids: &[DbId]) -> StoreResult<Vec<MediaFile>> {
        let state = self.state()?;
        Ok(ids.iter().filter_map(|id| state.media.get(id).cloned()).collect())
    }

    async fn insert_sample(&self, sample: &CreateTelemetrySample) -> StoreResult<TelemetrySample> {
        let mut state = self.state()?;
        state.next_sample_id += 1;
        let row = TelemetrySample {
            id: state.next_sample_id,
            vps_server_id: sample.vps_server_id,
            cpu_usage: sample.cpu_usage,
            ram_usage: sample.ram_usage,
            disk_usage: sample.disk_usage,
            recorded_at: sample.recorded_at,
            created_at: Utc::now(),
        };
        state.samples.push(row.clone());
        Ok(row)
    }

    async fn latest_sample(&self, vps_id: DbId) -> StoreResult<Option<TelemetrySample>> {
        Ok(self
            .state()?
            .samples
            .iter()
            .filter(|s| s.vps_server_id == vps_id)
            .max_by_key(|s| s.recorded_at)
            .cloned())
    }

    async fn recent_samples(
        &self,
        vps_id: DbId,
        since: Timestamp,
        limit: i64,
    ) -> StoreResult<Vec<TelemetrySample>> {
        let mut rows: Vec<TelemetrySample> = self
            .state()?
            .samples
            .iter()
            .filter(|s| s.vps_server_id == vps_id && s.recorded_at >= since)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        rows.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(rows)
    }

    async fn aggregate_samples(
        &self,
        vps_id: DbId,
        since: Timestamp,
    ) -> StoreResult<SampleAggregate> {
        let state = self.state()?;
        let rows: Vec<&TelemetrySample> = state
            .samples
            .iter()
            .filter(|s| s.vps_server_id == vps_id && s.recorded_at >= since)
            .collect();
        if rows.is_empty() {
            return Ok(SampleAggregate::default());
        }
        let n = rows.len() as f64;
        let avg = |f: fn(&TelemetrySample) -> f64| rows.iter().map(|s| f(s)).sum::<f64>() / n;
        let peak = |f: fn(&TelemetrySample) -> f64| {
            rows.iter().map(|s| f(s)).fold(f64::MIN, f64::max)
        };
        Ok(SampleAggregate {
            sample_count: rows.len() as i64,
            avg_cpu: Some(avg(|s| s.cpu_usage)),
            avg_ram: Some(avg(|s| s.ram_usage)),
            avg_disk: Some(avg(|s| s.disk_usage)),
            peak_cpu: Some(peak(|s| s.cpu_usage)),
            peak_ram: Some(peak(|s| s.ram_usage)),
            peak_disk: Some(peak(|s| s.disk_usage)),
        })
    }

    async fn latest_samples_since(&self, since: Timestamp) -> StoreResult<Vec<TelemetrySample>> {
        let state = self.state()?;
        let mut latest: BTreeMap<DbId, TelemetrySample> = BTreeMap::new();
        for sample in state.samples.iter().filter(|s| s.recorded_at >= since) {
            let newer = latest
                .get(&sample.vps_server_id)
                .map_or(true, |current| sample.recorded_at > current.recorded_at);
            if newer {
                latest.insert(sample.vps_server_id, sample.clone());
            }
        }
        Ok(latest.into_values().collect())
    }

    async fn delete_samples_older_than(&self, cutoff: Timestamp) -> StoreResult<u64> {
        let mut state = self.state()?;
        let before = state.samples.len();
        state.samples.retain(|s| s.recorded_at >= cutoff);
        Ok((before - state.samples.len()) as u64)
    }

    async fn upsert_progress(
        &self,
        progress: &UpsertStreamProgress,
        updated_at: Timestamp,
    ) -> StoreResult<()> {
        self.state()?.progress.insert(
            progress.stream_config_id,
            StreamProgress {
                stream_config_id: progress.stream_config_id,
                vps_server_id: Some(progress.vps_server_id),
                status: progress.status.clone(),
                progress: progress.progress,
                message: progress.message.clone(),
                uptime_secs: progress.uptime_secs,
                error: progress.error.clone(),
                updated_at,
            },
        );
        Ok(())
    }

    async fn find_progress(&self, stream_id: DbId) -> StoreResult<Option<StreamProgress>> {
        Ok(self.state()?.progress.get(&stream_id).cloned())
    }

    async fn list_progress_since(&self, since: Timestamp) -> StoreResult<Vec<StreamProgress>> {
        Ok(self
            .state()?
            .progress
            .values()
            .filter(|p| p.updated_at >= since)
            .cloned()
            .collect())
    }

    async fn delete_progress(&self, stream_id: DbId) -> StoreResult<()> {
        self.state()?.progress.remove(&stream_id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fast store
// ---------------------------------------------------------------------------

/// [`TelemetryCache`] over nested maps. Can be switched offline.
#[derive(Default)]
pub struct InMemoryCache {
    hashes: Mutex<HashMap<String, HashMap<String, String>>>,
    unavailable: AtomicBool,
}

impl InMemoryCache {
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Raw field value regardless of availability.
    pub fn raw(&self, key: &str, field: &str) -> Option<String> {
        self.lock().get(key).and_then(|h| h.get(field)).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, HashMap<String, String>>> {
        self.hashes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check(&self) -> Result<(), CacheError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("Connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl TelemetryCache for InMemoryCache {
    async fn ping(&self) -> Result<(), CacheError> {
        self.check()
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, CacheError> {
        self.check()?;
        Ok(self.raw(key, field))
    }

    async fn hash_set(&self, key: &str, field: &str, value: String) -> Result<(), CacheError> {
        self.check()?;
        self.lock()
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value);
        Ok(())
    }

    async fn hash_delete(&self, key: &str, field: &str) -> Result<(), CacheError> {
        self.check()?;
        if let Some(hash) = self.lock().get_mut(key) {
            hash.remove(field);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Remote shell
// ---------------------------------------------------------------------------

/// One recorded remote call.
#[derive(Debug, Clone, PartialEq)]
pub enum ShellCall {
    Execute { worker_id: DbId, command: String },
    Upload { worker_id: DbId, remote: String, contents: String },
}

/// [`RemoteShell`] that records calls and replays scripted outcomes.
///
/// `execute` pops the next queued outcome, or answers `{"status": "ok"}`
/// when the queue is empty.
pub struct FakeShell {
    outcomes: Mutex<VecDeque<CommandOutcome>>,
    calls: Mutex<Vec<ShellCall>>,
    upload_ok: AtomicBool,
    reachable: AtomicBool,
}

impl Default for FakeShell {
    fn default() -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            upload_ok: AtomicBool::new(true),
            reachable: AtomicBool::new(true),
        }
    }
}

impl FakeShell {
    /// Successful command printing `stdout`.
    pub fn ok(stdout: &str) -> CommandOutcome {
        CommandOutcome {
            success: true,
            stdout: stdout.to_string(),
            exit_code: Some(0),
            ..Default::default()
        }
    }

    pub fn push_outcome(&self, outcome: CommandOutcome) {
        self.outcomes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(outcome);
    }

    pub fn set_upload_ok(&self, ok: bool) {
        self.upload_ok.store(ok, Ordering::SeqCst);
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<ShellCall> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Commands passed to `execute`, in order.
    pub fn commands(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ShellCall::Execute { command, .. } => Some(command),
                ShellCall::Upload { .. } => None,
            })
            .collect()
    }

    fn record(&self, call: ShellCall) {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(call);
    }
}

#[async_trait]
impl RemoteShell for FakeShell {
    async fn test_connection(&self, _vps: &VpsServer) -> ConnectionCheck {
        if self.reachable.load(Ordering::SeqCst) {
            ConnectionCheck {
                ok: true,
                latency_ms: Some(1),
                error: None,
            }
        } else {
            ConnectionCheck {
                ok: false,
                latency_ms: None,
                error: Some("Connection refused".into()),
            }
        }
    }

    async fn execute(&self, vps: &VpsServer, command: &str) -> CommandOutcome {
        self.record(ShellCall::Execute {
            worker_id: vps.id,
            command: command.to_string(),
        });
        if !self.reachable.load(Ordering::SeqCst) {
            return CommandOutcome::failed("Connection refused");
        }
        self.outcomes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
            .unwrap_or_else(|| Self::ok(r#"{"status": "ok"}"#))
    }

    async fn upload_file(&self, vps: &VpsServer, local: &Path, remote: &str) -> bool {
        let contents = std::fs::read_to_string(local).unwrap_or_default();
        self.record(ShellCall::Upload {
            worker_id: vps.id,
            remote: remote.to_string(),
            contents,
        });
        self.reachable.load(Ordering::SeqCst) && self.upload_ok.load(Ordering::SeqCst)
    }

    async fn download_file(&self, _vps: &VpsServer, _remote: &str, _local: &Path) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    async fn read_file(&self, _vps: &VpsServer, _path: &str) -> Option<String> {
        None
    }
}
