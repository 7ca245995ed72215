use std::sync::Arc;

use streamfleet_core::throttle::LogThrottle;
use streamfleet_fleet::allocator::StreamAllocator;
use streamfleet_fleet::cache::TelemetryCache;
use streamfleet_fleet::config::FleetConfig;
use streamfleet_fleet::connection::RemoteShell;
use streamfleet_fleet::manager::StreamManager;
use streamfleet_fleet::media::MediaResolver;
use streamfleet_fleet::monitor::VpsMonitor;
use streamfleet_fleet::reconcile::Reconciler;
use streamfleet_fleet::store::FleetStore;
use streamfleet_fleet::telemetry::VpsStatsCollector;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Durable store (PostgreSQL in production).
    pub store: Arc<dyn FleetStore>,
    /// Fast shared store (Redis in production).
    pub cache: Arc<dyn TelemetryCache>,
    /// Remote shell channel to the workers.
    pub shell: Arc<dyn RemoteShell>,
    pub config: Arc<ServerConfig>,
    pub fleet_config: Arc<FleetConfig>,
    /// Rate limit for repeated fast-store error logs, shared by all services.
    pub throttle: Arc<LogThrottle>,
    pub collector: Arc<VpsStatsCollector>,
    pub monitor: Arc<VpsMonitor>,
    pub manager: Arc<StreamManager>,
    pub reconciler: Arc<Reconciler>,
}

impl AppState {
    /// Wire the fleet services over the given I/O boundaries.
    pub fn new(
        store: Arc<dyn FleetStore>,
        cache: Arc<dyn TelemetryCache>,
        shell: Arc<dyn RemoteShell>,
        media: Arc<dyn MediaResolver>,
        config: ServerConfig,
        fleet_config: FleetConfig,
    ) -> Self {
        let throttle = Arc::new(LogThrottle::new(fleet_config.log_throttle));

        let collector = Arc::new(VpsStatsCollector::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            Arc::clone(&throttle),
            fleet_config.telemetry_history_limit,
        ));
        let monitor = Arc::new(VpsMonitor::new(Arc::clone(&store), fleet_config.health));
        let allocator = StreamAllocator::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            Arc::clone(&throttle),
            fleet_config.allocation,
        );
        let manager = Arc::new(StreamManager::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            Arc::clone(&shell),
            media,
            allocator,
            Arc::clone(&throttle),
            &fleet_config,
        ));
        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            Arc::clone(&shell),
            Arc::clone(&manager),
            Arc::clone(&throttle),
            &fleet_config,
        ));

        Self {
            store,
            cache,
            shell,
            config: Arc::new(config),
            fleet_config: Arc::new(fleet_config),
            throttle,
            collector,
            monitor,
            manager,
            reconciler,
        }
    }
}
