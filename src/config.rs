//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `node.toml`.
//!     loads configuration from file or falls back to defaults.
//!
//! structure:
//!     - SamplingConfig: soil burst size, inter-sample delay, cycle delay.
//!     - DisseminationConfig: broadcast/log intervals and the log failure policy.
//!     - DisplayConfig: whether to probe the OLED and how often to redraw it.
//!     - Thresholds: the mood classification cut-offs (see mood.rs).
//!     - LinkConfig: reconnect bound, poll cadence, time sync bound, watch cadence.
//!     - RemoteConfig: where log records are posted.
//!     - BroadcastConfig: where the websocket/status server listens.
//!     - SensorsConfig: ADC channels, DHT pin, ADC I2C address.
//!
//! every section is `#[serde(default)]` so a partial file only overrides
//! what it names.
//!
//! ==============================================================================

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::NodeError;
use crate::mood::Thresholds;

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct NodeConfig {
    pub sampling: SamplingConfig,
    pub dissemination: DisseminationConfig,
    pub display: DisplayConfig,
    pub thresholds: Thresholds,
    pub link: LinkConfig,
    pub remote: RemoteConfig,
    pub broadcast: BroadcastConfig,
    pub sensors: SensorsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SamplingConfig {
    pub soil_samples: usize,
    pub sample_delay_ms: u64,
    pub cycle_delay_ms: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self { soil_samples: 10, sample_delay_ms: 10, cycle_delay_ms: 1000 }
    }
}

/// What the log timer does with its reference time when an emission
/// fails or is skipped because the link is down.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFailurePolicy {
    /// restart the interval anyway; at most one interval of data is lost
    #[default]
    Advance,
    /// keep the old reference time so the next cycle tries again
    RetryNextCycle,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DisseminationConfig {
    pub broadcast_interval_ms: u64,
    pub log_interval_ms: u64,
    pub log_failure_policy: LogFailurePolicy,
}

impl Default for DisseminationConfig {
    fn default() -> Self {
        Self {
            broadcast_interval_ms: 0,
            log_interval_ms: 900_000, // 15 minutes
            log_failure_policy: LogFailurePolicy::Advance,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DisplayConfig {
    pub enabled: bool,
    pub refresh_interval_ms: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { enabled: true, refresh_interval_ms: 2000 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LinkConfig {
    pub reconnect_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub time_sync_timeout_secs: u64,
    /// background re-probe cadence while the link is believed up; 0 = off
    pub watch_interval_ms: u64,
    /// url fetched to decide the link is up and to read the remote clock
    pub probe_url: String,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            reconnect_timeout_secs: 15,
            poll_interval_ms: 500,
            time_sync_timeout_secs: 10,
            watch_interval_ms: 5000,
            probe_url: "http://example.com/".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_url: String,
    pub log_path: String,
    pub request_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            log_path: "/plants/plant1/logs.json".to_string(),
            request_timeout_secs: 10,
        }
    }
}

impl RemoteConfig {
    pub fn log_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.log_path)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BroadcastConfig {
    pub bind: String,
    pub port: u16,
    /// frames buffered per listener before a slow listener starts dropping
    pub channel_capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self { bind: "0.0.0.0".to_string(), port: 81, channel_capacity: 16 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SensorsConfig {
    pub soil_channel: u8,
    pub light_channel: u8,
    pub dht_pin: u8,
    pub adc_i2c_address: u8,
}

impl Default for SensorsConfig {
    fn default() -> Self {
        Self { soil_channel: 0, light_channel: 1, dht_pin: 4, adc_i2c_address: 0x48 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub show_sensor_data: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), show_sensor_data: true }
    }
}

impl NodeConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        let config: NodeConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))?;

        config.validate()?;
        Ok(config)
    }

    /// Load with default fallback
    ///
    /// runs before the tracing subscriber exists (the log level lives in
    /// this file), so it reports on stdout.
    pub fn load_or_default() -> Self {
        let paths = [
            std::path::PathBuf::from("config").join("node.toml"),
            std::path::PathBuf::from("..").join("config").join("node.toml"),
        ];

        for path in &paths {
            if path.exists() {
                match Self::load(path) {
                    Ok(config) => {
                        println!("[CONFIG] Loaded from {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        println!("[CONFIG] Warning: Failed to load {}: {}", path.display(), e);
                    }
                }
            }
        }

        println!("[CONFIG] Warning: No config file found - using defaults");
        Self::default()
    }

    /// Reject combinations the node cannot run with.
    pub fn validate(&self) -> Result<(), NodeError> {
        if self.sampling.soil_samples == 0 {
            return Err(NodeError::Config("sampling.soil_samples must be at least 1".into()));
        }
        if self.dissemination.log_interval_ms == 0 {
            return Err(NodeError::Config("dissemination.log_interval_ms must be positive".into()));
        }
        if self.link.reconnect_timeout_secs == 0 {
            return Err(NodeError::Config("link.reconnect_timeout_secs must be positive".into()));
        }
        let t = &self.thresholds;
        if t.dry_below > t.happy_max || t.happy_max > t.wet_above {
            return Err(NodeError::Config(format!(
                "thresholds must satisfy dry_below <= happy_max <= wet_above (got {} / {} / {})",
                t.dry_below, t.happy_max, t.wet_above
            )));
        }
        if self.remote.base_url.trim().is_empty() {
            return Err(NodeError::Config("remote.base_url is empty".into()));
        }
        Ok(())
    }

    pub fn sample_delay(&self) -> Duration {
        Duration::from_millis(self.sampling.sample_delay_ms)
    }

    pub fn cycle_delay(&self) -> Duration {
        Duration::from_millis(self.sampling.cycle_delay_ms)
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("┌─────────────────────────────────────────┐");
        println!("│           NODE CONFIGURATION            │");
        println!("├─────────────────────────────────────────┤");
        println!(
            "│ Soil Samples: {} x {}ms",
            self.sampling.soil_samples, self.sampling.sample_delay_ms
        );
        println!("│ Cycle Delay: {}ms", self.sampling.cycle_delay_ms);
        println!(
            "│ Log Interval: {}s ({:?})",
            self.dissemination.log_interval_ms / 1000,
            self.dissemination.log_failure_policy
        );
        println!("│ Remote Log: {}", self.remote.log_url());
        println!("│ Broadcast: ws://{}:{}/ws", self.broadcast.bind, self.broadcast.port);
        println!("│ Log Level: {}", self.logging.level);
        println!("└─────────────────────────────────────────┘");
    }
}
