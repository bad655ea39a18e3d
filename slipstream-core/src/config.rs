//! Centralized configuration for Slipstream.
//!
//! All tunable parameters and settings are defined here to avoid
//! hard-coded values scattered throughout the codebase.

use std::path::PathBuf;
use std::time::Duration;

/// Central configuration for all Slipstream components.
///
/// Groups related configuration settings into logical sections.
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct SlipstreamConfig {
    pub session: SessionConfig,
    pub server: ServerConfig,
    pub storage: StorageConfig,
}

/// Startup-protocol and session-orchestration configuration.
///
/// Controls how long the controller waits for a swarm to become playable
/// and how aggressively it nudges the engine while waiting.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Total deadline for the startup wait
    pub startup_deadline: Duration,
    /// Resolution at which the startup gate is polled
    pub startup_poll_interval: Duration,
    /// Cadence for re-issuing reannounce + resume while waiting
    pub reannounce_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            startup_deadline: Duration::from_secs(120),
            startup_poll_interval: Duration::from_millis(2500),
            reannounce_interval: Duration::from_secs(15),
        }
    }
}

/// Progressive media server configuration.
///
/// Controls the readiness gate that prevents serving an empty or too-short
/// file, and the background monitor that tracks file growth.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Minimum file size before any request is served
    pub min_ready_bytes: u64,
    /// Interval between readiness monitor checks
    pub monitor_interval: Duration,
    /// Consecutive same-size checks after which a non-growing file counts as ready
    pub stable_checks_required: u32,
    /// Total time before the monitor gives up and the server stays not-ready
    pub monitor_deadline: Duration,
    /// Bounded number of readiness re-checks a request performs before answering 503
    pub request_ready_rechecks: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            min_ready_bytes: 1024 * 1024, // 1 MiB
            monitor_interval: Duration::from_secs(1),
            stable_checks_required: 5,
            monitor_deadline: Duration::from_secs(120),
            request_ready_rechecks: 2,
        }
    }
}

/// Download artifact storage configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root directory under which per-session download directories are created
    pub download_root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            download_root: std::env::temp_dir().join("slipstream"),
        }
    }
}

impl SlipstreamConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Allows runtime configuration via environment variables while
    /// maintaining sensible defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(deadline) = std::env::var("SLIPSTREAM_STARTUP_DEADLINE") {
            if let Ok(seconds) = deadline.parse::<u64>() {
                config.session.startup_deadline = Duration::from_secs(seconds);
            }
        }

        if let Ok(interval) = std::env::var("SLIPSTREAM_REANNOUNCE_INTERVAL") {
            if let Ok(seconds) = interval.parse::<u64>() {
                config.session.reannounce_interval = Duration::from_secs(seconds);
            }
        }

        if let Ok(bytes) = std::env::var("SLIPSTREAM_MIN_READY_BYTES") {
            if let Ok(value) = bytes.parse::<u64>() {
                config.server.min_ready_bytes = value;
            }
        }

        if let Ok(root) = std::env::var("SLIPSTREAM_DOWNLOAD_ROOT") {
            config.storage.download_root = PathBuf::from(root);
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = SlipstreamConfig::default();

        assert_eq!(config.session.startup_deadline, Duration::from_secs(120));
        assert_eq!(
            config.session.startup_poll_interval,
            Duration::from_millis(2500)
        );
        assert_eq!(config.session.reannounce_interval, Duration::from_secs(15));
        assert_eq!(config.server.min_ready_bytes, 1024 * 1024);
        assert_eq!(config.server.stable_checks_required, 5);
        assert_eq!(config.server.monitor_deadline, Duration::from_secs(120));
    }

    #[test]
    fn test_env_override() {
        unsafe {
            std::env::set_var("SLIPSTREAM_STARTUP_DEADLINE", "30");
            std::env::set_var("SLIPSTREAM_MIN_READY_BYTES", "2048");
        }

        let config = SlipstreamConfig::from_env();

        assert_eq!(config.session.startup_deadline, Duration::from_secs(30));
        assert_eq!(config.server.min_ready_bytes, 2048);

        // Cleanup
        unsafe {
            std::env::remove_var("SLIPSTREAM_STARTUP_DEADLINE");
            std::env::remove_var("SLIPSTREAM_MIN_READY_BYTES");
        }
    }
}
