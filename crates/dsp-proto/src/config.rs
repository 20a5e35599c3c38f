//! The on-disk, read-only-at-runtime `Config` record (spec.md §6).
//!
//! Mirrors the teacher's per-section `#[serde(default)]` + `default_xxx()`
//! style, swapped from TOML to YAML.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use dsp_core::{RotaryConfig, VelocityConfig, VelocityMode};

use super::platform;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse YAML config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("failed to serialize config to YAML: {0}")]
    Serialize(#[source] serde_yaml::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Accelerating,
    Constant,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Accelerating
    }
}

impl From<Mode> for VelocityMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Accelerating => VelocityMode::Accelerating,
            Mode::Constant => VelocityMode::Constant,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotaryOptions {
    #[serde(default = "default_db_per_step")]
    pub db_per_step: f64,
    #[serde(default = "default_velocity_window_ms")]
    pub velocity_window_ms: i64,
    #[serde(default = "default_velocity_multiplier")]
    pub velocity_multiplier: f64,
    #[serde(default = "default_velocity_threshold")]
    pub velocity_threshold: u32,
}

impl Default for RotaryOptions {
    fn default() -> Self {
        RotaryOptions {
            db_per_step: default_db_per_step(),
            velocity_window_ms: default_velocity_window_ms(),
            velocity_multiplier: default_velocity_multiplier(),
            velocity_threshold: default_velocity_threshold(),
        }
    }
}

/// Where the effects worker's DSP WebSocket client connects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DspConfig {
    /// Connecting to this placeholder is a configuration error in practice;
    /// a real deployment must set this to the DSP's actual WebSocket URL.
    #[serde(default = "default_dsp_url")]
    pub url: String,
    #[serde(default = "default_dsp_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_dsp_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

impl Default for DspConfig {
    fn default() -> Self {
        DspConfig {
            url: default_dsp_url(),
            read_timeout_ms: default_dsp_read_timeout_ms(),
            reconnect_delay_ms: default_dsp_reconnect_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngressConfig {
    #[serde(default = "default_ingress_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_ingress_port")]
    pub port: u16,
}

impl Default for IngressConfig {
    fn default() -> Self {
        IngressConfig {
            bind_address: default_ingress_bind_address(),
            port: default_ingress_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriberConfig {
    #[serde(default = "default_subscriber_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_subscriber_port")]
    pub port: u16,
    #[serde(default = "default_subscriber_queue_depth")]
    pub queue_depth: usize,
    #[serde(default = "default_subscriber_inbound_depth")]
    pub inbound_depth: usize,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        SubscriberConfig {
            bind_address: default_subscriber_bind_address(),
            port: default_subscriber_port(),
            queue_depth: default_subscriber_queue_depth(),
            inbound_depth: default_subscriber_inbound_depth(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_update_hz")]
    pub update_hz: u32,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default = "default_min_db")]
    pub min_db: f64,
    #[serde(default = "default_max_db")]
    pub max_db: f64,
    #[serde(default = "default_vel_max_db_per_s")]
    pub vel_max_db_per_s: f64,
    #[serde(default = "default_accel_time_s")]
    pub accel_time_s: f64,
    #[serde(default = "default_decay_tau_s")]
    pub decay_tau_s: f64,
    #[serde(default = "default_hold_timeout_ms")]
    pub hold_timeout_ms: u64,
    #[serde(default = "default_danger_zone_db")]
    pub danger_zone_db: f64,
    #[serde(default = "default_danger_vel_max_db_per_s")]
    pub danger_vel_max_db_per_s: f64,
    #[serde(default = "default_danger_vel_min_near_max_db_per_s")]
    pub danger_vel_min_near_max_db_per_s: f64,
    #[serde(default = "default_volume_update_threshold_db")]
    pub volume_update_threshold_db: f64,
    #[serde(default = "default_safe_default_db")]
    pub safe_default_db: f64,
    #[serde(default = "default_ws_coalesce_window_ms")]
    pub ws_coalesce_window_ms: u64,
    #[serde(default)]
    pub rotary: RotaryOptions,
    #[serde(default)]
    pub dsp: DspConfig,
    #[serde(default)]
    pub ingress: IngressConfig,
    #[serde(default)]
    pub subscriber: SubscriberConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            update_hz: default_update_hz(),
            mode: Mode::default(),
            min_db: default_min_db(),
            max_db: default_max_db(),
            vel_max_db_per_s: default_vel_max_db_per_s(),
            accel_time_s: default_accel_time_s(),
            decay_tau_s: default_decay_tau_s(),
            hold_timeout_ms: default_hold_timeout_ms(),
            danger_zone_db: default_danger_zone_db(),
            danger_vel_max_db_per_s: default_danger_vel_max_db_per_s(),
            danger_vel_min_near_max_db_per_s: default_danger_vel_min_near_max_db_per_s(),
            volume_update_threshold_db: default_volume_update_threshold_db(),
            safe_default_db: default_safe_default_db(),
            ws_coalesce_window_ms: default_ws_coalesce_window_ms(),
            rotary: RotaryOptions::default(),
            dsp: DspConfig::default(),
            ingress: IngressConfig::default(),
            subscriber: SubscriberConfig::default(),
            log_level: default_log_level(),
        }
    }
}

fn default_update_hz() -> u32 {
    30
}
fn default_min_db() -> f64 {
    -80.0
}
fn default_max_db() -> f64 {
    0.0
}
fn default_vel_max_db_per_s() -> f64 {
    15.0
}
fn default_accel_time_s() -> f64 {
    2.0
}
fn default_decay_tau_s() -> f64 {
    0.2
}
fn default_hold_timeout_ms() -> u64 {
    500
}
fn default_danger_zone_db() -> f64 {
    12.0
}
fn default_danger_vel_max_db_per_s() -> f64 {
    3.0
}
fn default_danger_vel_min_near_max_db_per_s() -> f64 {
    0.3
}
fn default_volume_update_threshold_db() -> f64 {
    0.02
}
fn default_safe_default_db() -> f64 {
    -45.0
}
fn default_ws_coalesce_window_ms() -> u64 {
    50
}
fn default_db_per_step() -> f64 {
    1.0
}
fn default_velocity_window_ms() -> i64 {
    250
}
fn default_velocity_multiplier() -> f64 {
    2.0
}
fn default_velocity_threshold() -> u32 {
    3
}
fn default_dsp_url() -> String {
    "ws://127.0.0.1:0/ws".to_string()
}
fn default_dsp_read_timeout_ms() -> u64 {
    2000
}
fn default_dsp_reconnect_delay_ms() -> u64 {
    1000
}
fn default_ingress_bind_address() -> String {
    "127.0.0.1".to_string()
}
fn default_ingress_port() -> u16 {
    platform::INGRESS_TCP_PORT
}
fn default_subscriber_bind_address() -> String {
    "127.0.0.1".to_string()
}
fn default_subscriber_port() -> u16 {
    platform::SUBSCRIBER_WS_PORT
}
fn default_subscriber_queue_depth() -> usize {
    32
}
fn default_subscriber_inbound_depth() -> usize {
    128
}
fn default_log_level() -> String {
    "info,dsp_daemon=debug".to_string()
}

impl Config {
    /// Loads YAML from `path`, or the platform config directory default if
    /// `None`. Writes out `Config::default()` (and creates parent
    /// directories) if no file exists yet there.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = path
            .map(PathBuf::from)
            .unwrap_or_else(Self::default_config_path);

        if !config_path.exists() {
            let config = Self::default();
            config.save(&config_path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
            path: config_path.clone(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: config_path,
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }
        let content = serde_yaml::to_string(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn default_config_path() -> PathBuf {
        platform::config_dir().join("config.yaml")
    }

    /// Builds the pure controller parameter bag `dsp-core` operates on.
    /// `max_dt_s` is left at `2 / update_hz` as the daemon loop mandates.
    pub fn velocity_config(&self) -> VelocityConfig {
        VelocityConfig {
            mode: self.mode.into(),
            vel_max_db_per_s: self.vel_max_db_per_s,
            accel_time_s: self.accel_time_s,
            decay_tau_s: self.decay_tau_s,
            min_db: self.min_db,
            max_db: self.max_db,
            hold_timeout_s: self.hold_timeout_ms as f64 / 1000.0,
            max_dt_s: 2.0 / self.update_hz as f64,
            danger_zone_db: self.danger_zone_db,
            danger_vel_max_db_per_s: self.danger_vel_max_db_per_s,
            danger_vel_min_near_max_db_per_s: self.danger_vel_min_near_max_db_per_s,
            volume_update_threshold_db: self.volume_update_threshold_db,
            safe_default_db: self.safe_default_db,
        }
    }

    pub fn rotary_config(&self) -> RotaryConfig {
        RotaryConfig {
            db_per_step: self.rotary.db_per_step,
            velocity_window_ms: self.rotary.velocity_window_ms,
            velocity_multiplier: self.rotary.velocity_multiplier,
            velocity_threshold: self.rotary.velocity_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_constants() {
        let config = Config::default();
        assert_eq!(config.update_hz, 30);
        assert_eq!(config.min_db, -80.0);
        assert_eq!(config.max_db, 0.0);
        assert_eq!(config.mode, Mode::Accelerating);
        assert_eq!(config.rotary.velocity_threshold, 3);
        assert_eq!(config.subscriber.queue_depth, 32);
        assert_eq!(config.subscriber.inbound_depth, 128);
    }

    #[test]
    fn velocity_config_derives_max_dt_from_update_hz() {
        let mut config = Config::default();
        config.update_hz = 60;
        let vel = config.velocity_config();
        assert_eq!(vel.max_dt_s, 2.0 / 60.0);
    }

    #[test]
    fn round_trips_through_yaml() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.update_hz, config.update_hz);
        assert_eq!(parsed.dsp.url, config.dsp.url);
    }
}
