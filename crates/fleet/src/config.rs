//! Fleet service configuration loaded from environment variables.

use std::time::Duration;

use streamfleet_core::agent::DEFAULT_AGENT_PORT;
use streamfleet_core::allocation::AllocationThresholds;
use streamfleet_core::health::HealthThresholds;
use streamfleet_core::throttle::DEFAULT_LOG_THROTTLE;

/// Tunables shared by every fleet service.
///
/// All fields have defaults suitable for local development; unparseable
/// values fall back to the default.
#[derive(Debug, Clone)]
pub struct FleetConfig {
    /// Port of the worker-local streaming agent.
    pub agent_port: u16,
    /// Directory on the worker where job specs are uploaded.
    pub remote_config_dir: String,
    pub ssh_connect_timeout: Duration,
    /// Upper bound for one remote call (connect + exec + disconnect).
    pub ssh_command_timeout: Duration,
    pub allocation: AllocationThresholds,
    pub health: HealthThresholds,
    /// A STOPPING stream older than this is forced to INACTIVE.
    pub stopping_timeout: Duration,
    /// A STARTING stream older than this is moved to ERROR.
    pub starting_timeout: Duration,
    pub telemetry_retention_days: i64,
    /// Maximum samples returned in a worker history slice.
    pub telemetry_history_limit: i64,
    pub log_throttle: Duration,
    /// Base URL of the media download endpoint used for signed links.
    pub download_base_url: Option<String>,
    pub download_signing_secret: Option<String>,
    pub download_link_ttl_secs: i64,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            agent_port: DEFAULT_AGENT_PORT,
            remote_config_dir: "/tmp".to_string(),
            ssh_connect_timeout: Duration::from_secs(10),
            ssh_command_timeout: Duration::from_secs(60),
            allocation: AllocationThresholds::default(),
            health: HealthThresholds::default(),
            stopping_timeout: Duration::from_secs(300),
            starting_timeout: Duration::from_secs(600),
            telemetry_retention_days: 7,
            telemetry_history_limit: 60,
            log_throttle: DEFAULT_LOG_THROTTLE,
            download_base_url: None,
            download_signing_secret: None,
            download_link_ttl_secs: 6 * 3600,
        }
    }
}

impl FleetConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default |
    /// |----------------------------|---------|
    /// | `STREAM_AGENT_PORT`        | `9999`  |
    /// | `REMOTE_CONFIG_DIR`        | `/tmp`  |
    /// | `SSH_CONNECT_TIMEOUT_SECS` | `10`    |
    /// | `SSH_COMMAND_TIMEOUT_SECS` | `60`    |
    /// | `TELEMETRY_STALE_SECS`     | `300`   |
    /// | `ALLOCATION_MAX_CPU`       | `80`    |
    /// | `ALLOCATION_MAX_RAM`       | `85`    |
    /// | `HEALTH_OVERLOAD_CPU`      | `90`    |
    /// | `HEALTH_OVERLOAD_RAM`      | `95`    |
    /// | `HEALTH_MAX_DISK`          | `95`    |
    /// | `STOPPING_TIMEOUT_SECS`    | `300`   |
    /// | `STARTING_TIMEOUT_SECS`    | `600`   |
    /// | `TELEMETRY_RETENTION_DAYS` | `7`     |
    /// | `TELEMETRY_HISTORY_LIMIT`  | `60`    |
    /// | `LOG_THROTTLE_SECS`        | `60`    |
    /// | `DOWNLOAD_BASE_URL`        | unset   |
    /// | `DOWNLOAD_SIGNING_SECRET`  | unset   |
    /// | `DOWNLOAD_LINK_TTL_SECS`   | `21600` |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            agent_port: env_or("STREAM_AGENT_PORT", defaults.agent_port),
            remote_config_dir: std::env::var("REMOTE_CONFIG_DIR")
                .unwrap_or(defaults.remote_config_dir),
            ssh_connect_timeout: env_secs("SSH_CONNECT_TIMEOUT_SECS", defaults.ssh_connect_timeout),
            ssh_command_timeout: env_secs("SSH_COMMAND_TIMEOUT_SECS", defaults.ssh_command_timeout),
            allocation: AllocationThresholds {
                max_cpu: env_or("ALLOCATION_MAX_CPU", defaults.allocation.max_cpu),
                max_ram: env_or("ALLOCATION_MAX_RAM", defaults.allocation.max_ram),
                stale_after: env_secs("TELEMETRY_STALE_SECS", defaults.allocation.stale_after),
            },
            health: HealthThresholds {
                stale_after: env_secs("TELEMETRY_STALE_SECS", defaults.health.stale_after),
                overload_cpu: env_or("HEALTH_OVERLOAD_CPU", defaults.health.overload_cpu),
                overload_ram: env_or("HEALTH_OVERLOAD_RAM", defaults.health.overload_ram),
                max_disk: env_or("HEALTH_MAX_DISK", defaults.health.max_disk),
            },
            stopping_timeout: env_secs("STOPPING_TIMEOUT_SECS", defaults.stopping_timeout),
            starting_timeout: env_secs("STARTING_TIMEOUT_SECS", defaults.starting_timeout),
            telemetry_retention_days: env_or(
                "TELEMETRY_RETENTION_DAYS",
                defaults.telemetry_retention_days,
            ),
            telemetry_history_limit: env_or(
                "TELEMETRY_HISTORY_LIMIT",
                defaults.telemetry_history_limit,
            ),
            log_throttle: env_secs("LOG_THROTTLE_SECS", defaults.log_throttle),
            download_base_url: env_non_empty("DOWNLOAD_BASE_URL"),
            download_signing_secret: env_non_empty("DOWNLOAD_SIGNING_SECRET"),
            download_link_ttl_secs: env_or(
                "DOWNLOAD_LINK_TTL_SECS",
                defaults.download_link_ttl_secs,
            ),
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_keep_allocation_tighter_than_health() {
        let config = FleetConfig::default();
        assert!(config.allocation.max_cpu < config.health.overload_cpu);
        assert!(config.allocation.max_ram < config.health.overload_ram);
        assert_eq!(config.agent_port, 9999);
        assert_eq!(config.stopping_timeout, Duration::from_secs(300));
        assert_eq!(config.allocation.stale_after, config.health.stale_after);
    }

    #[test]
    fn unparseable_values_fall_back() {
        assert_eq!(env_or("STREAMFLEET_TEST_UNSET_KEY", 7_i64), 7);
        assert_eq!(
            env_secs("STREAMFLEET_TEST_UNSET_KEY", Duration::from_secs(3)),
            Duration::from_secs(3)
        );
        assert_eq!(env_non_empty("STREAMFLEET_TEST_UNSET_KEY"), None);
    }
}
