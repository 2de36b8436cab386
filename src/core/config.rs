//! Configuration system: TOML file + env var overrides + smart defaults.
//!
//! Mirrors spec.md §6's "Configuration (recognized options)" table: every
//! key named there has a field here. No CLI flags feed into `Config` itself
//! (per spec.md, "no CLI flags") — the `tn-node` binary's flags only select
//! *which* config file to load and which subcommand to run.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, TnError};

/// Full telemetry-node configuration model.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub link: LinkConfig,
    pub endpoint: EndpointConfig,
    pub ntp: NtpConfig,
    pub timing: TimingConfig,
    pub storage: StorageConfig,
    pub uploader: UploaderConfig,
    pub paths: PathsConfig,
    pub device: DeviceConfig,
}

/// Device identity, ambient stack not named by spec.md §6's option table but
/// needed for the wire protocol's `mac` parameter and the `EventLog`'s
/// cross-cutting `mac`/firmware-version context (spec.md §4.4).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DeviceConfig {
    pub mac: String,
    pub firmware_version: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            mac: "02:00:00:00:00:01".to_string(),
            firmware_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Wi-Fi station credentials. Modeled per spec.md §6's `link.ssid / link.password`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LinkConfig {
    pub ssid: String,
    pub password: String,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            ssid: String::new(),
            password: String::new(),
        }
    }
}

/// Remote ingestion endpoint. Per spec.md §6's `endpoint.url / endpoint.api_key`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EndpointConfig {
    pub url: String,
    pub api_key: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080/api.php".to_string(),
            api_key: String::new(),
        }
    }
}

/// Network time source. Per spec.md §6's `ntp.server / ntp.gmt_offset_sec / ntp.dst_offset_sec`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NtpConfig {
    pub server: String,
    pub gmt_offset_sec: i32,
    pub dst_offset_sec: i32,
}

impl Default for NtpConfig {
    fn default() -> Self {
        Self {
            server: "pool.ntp.org".to_string(),
            gmt_offset_sec: 0,
            dst_offset_sec: 0,
        }
    }
}

/// Scheduler timing knobs. Per spec.md §6's `timing.*` keys; defaults match
/// the values named there exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimingConfig {
    pub window_flow_end_sec: u32,
    pub sample_point_temp_sec: u32,
    pub sample_point_volt_sec: u32,
    pub flow_send_period_ms: u64,
    pub sync_period_ms: u64,
    pub scan_period_ms: u64,
    pub stabilize_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            window_flow_end_sec: 29,
            sample_point_temp_sec: 35,
            sample_point_volt_sec: 40,
            flow_send_period_ms: 1_000,
            sync_period_ms: 6 * 60 * 60 * 1_000,
            scan_period_ms: 30_000,
            stabilize_ms: 2_500,
        }
    }
}

/// Journal/EventLog storage knobs. Per spec.md §6's `storage.max_log_bytes`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory of persistent storage (spec.md §6 filesystem layout).
    pub root: PathBuf,
    pub max_log_bytes: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            max_log_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Drain batch sizing. Per spec.md §6's `uploader.batch_max`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UploaderConfig {
    pub batch_max: usize,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self { batch_max: 6 }
    }
}

/// Ambient-stack paths (config file location), not named by spec.md but
/// needed to locate the TOML file itself, mirroring the teacher's
/// `PathsConfig`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            config_file: default_config_path(),
        }
    }
}

fn default_storage_root() -> PathBuf {
    let home = env::var_os("HOME").map_or_else(|| PathBuf::from("/var/lib/tn-node"), PathBuf::from);
    if home == Path::new("/var/lib/tn-node") {
        home
    } else {
        home.join(".local").join("share").join("tn-node")
    }
}

fn default_config_path() -> PathBuf {
    let home = env::var_os("HOME").map_or_else(|| PathBuf::from("/var/lib/tn-node"), PathBuf::from);
    if home == Path::new("/var/lib/tn-node") {
        PathBuf::from("/etc/tn-node/config.toml")
    } else {
        home.join(".config").join("tn-node").join("config.toml")
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from an explicit path, `TN_CONFIG`, or the default path,
    /// then apply env var overrides and validate. Missing config file at the
    /// default path is not an error — defaults are used, as spec.md §6 names
    /// no required file.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_config = if path.is_none() {
            env::var_os("TN_CONFIG").map(PathBuf::from)
        } else {
            None
        };

        let path_buf = path.map_or_else(
            || env_config.clone().unwrap_or_else(Self::default_path),
            Path::to_path_buf,
        );
        let is_explicit = path.is_some() || env_config.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| TnError::Io {
                path: path_buf.clone(),
                source,
            })?;
            toml::from_str::<Self>(&raw)?
        } else if is_explicit {
            return Err(TnError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides()?;
        cfg.storage.root = crate::core::paths::resolve_absolute_path(&cfg.storage.root);
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(raw) = env_var("TN_LINK_SSID") {
            self.link.ssid = raw;
        }
        if let Some(raw) = env_var("TN_LINK_PASSWORD") {
            self.link.password = raw;
        }
        if let Some(raw) = env_var("TN_ENDPOINT_URL") {
            self.endpoint.url = raw;
        }
        if let Some(raw) = env_var("TN_ENDPOINT_API_KEY") {
            self.endpoint.api_key = raw;
        }
        if let Some(raw) = env_var("TN_NTP_SERVER") {
            self.ntp.server = raw;
        }
        set_env_i32("TN_NTP_GMT_OFFSET_SEC", &mut self.ntp.gmt_offset_sec)?;
        set_env_i32("TN_NTP_DST_OFFSET_SEC", &mut self.ntp.dst_offset_sec)?;

        set_env_u32(
            "TN_TIMING_WINDOW_FLOW_END_SEC",
            &mut self.timing.window_flow_end_sec,
        )?;
        set_env_u32(
            "TN_TIMING_SAMPLE_POINT_TEMP_SEC",
            &mut self.timing.sample_point_temp_sec,
        )?;
        set_env_u32(
            "TN_TIMING_SAMPLE_POINT_VOLT_SEC",
            &mut self.timing.sample_point_volt_sec,
        )?;
        set_env_u64(
            "TN_TIMING_FLOW_SEND_PERIOD_MS",
            &mut self.timing.flow_send_period_ms,
        )?;
        set_env_u64("TN_TIMING_SYNC_PERIOD_MS", &mut self.timing.sync_period_ms)?;
        set_env_u64("TN_TIMING_SCAN_PERIOD_MS", &mut self.timing.scan_period_ms)?;
        set_env_u64("TN_TIMING_STABILIZE_MS", &mut self.timing.stabilize_ms)?;

        if let Some(raw) = env_var("TN_STORAGE_ROOT") {
            self.storage.root = PathBuf::from(raw);
        }
        set_env_u64("TN_STORAGE_MAX_LOG_BYTES", &mut self.storage.max_log_bytes)?;

        set_env_usize("TN_UPLOADER_BATCH_MAX", &mut self.uploader.batch_max)?;

        if let Some(raw) = env_var("TN_DEVICE_MAC") {
            self.device.mac = raw;
        }

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if !(self.timing.window_flow_end_sec < self.timing.sample_point_temp_sec
            && self.timing.sample_point_temp_sec < self.timing.sample_point_volt_sec
            && self.timing.sample_point_volt_sec < 60)
        {
            return Err(TnError::InvalidConfig {
                details: format!(
                    "timing windows must satisfy window_flow_end_sec < sample_point_temp_sec < sample_point_volt_sec < 60, got {} < {} < {}",
                    self.timing.window_flow_end_sec,
                    self.timing.sample_point_temp_sec,
                    self.timing.sample_point_volt_sec
                ),
            });
        }
        if self.timing.flow_send_period_ms == 0 {
            return Err(TnError::InvalidConfig {
                details: "timing.flow_send_period_ms must be > 0".to_string(),
            });
        }
        if self.timing.scan_period_ms == 0 {
            return Err(TnError::InvalidConfig {
                details: "timing.scan_period_ms must be > 0".to_string(),
            });
        }
        if self.uploader.batch_max == 0 {
            return Err(TnError::InvalidConfig {
                details: "uploader.batch_max must be >= 1".to_string(),
            });
        }
        if self.storage.max_log_bytes == 0 {
            return Err(TnError::InvalidConfig {
                details: "storage.max_log_bytes must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn set_env_u32(name: &str, slot: &mut u32) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw.parse::<u32>().map_err(|error| TnError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}

fn set_env_i32(name: &str, slot: &mut i32) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw.parse::<i32>().map_err(|error| TnError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}

fn set_env_u64(name: &str, slot: &mut u64) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw.parse::<u64>().map_err(|error| TnError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}

fn set_env_usize(name: &str, slot: &mut usize) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw
            .parse::<usize>()
            .map_err(|error| TnError::ConfigParse {
                context: "env",
                details: format!("{name}={raw:?}: {error}"),
            })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn default_timing_matches_spec_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.timing.window_flow_end_sec, 29);
        assert_eq!(cfg.timing.sample_point_temp_sec, 35);
        assert_eq!(cfg.timing.sample_point_volt_sec, 40);
        assert_eq!(cfg.timing.flow_send_period_ms, 1_000);
        assert_eq!(cfg.timing.sync_period_ms, 6 * 60 * 60 * 1_000);
        assert_eq!(cfg.timing.scan_period_ms, 30_000);
        assert_eq!(cfg.timing.stabilize_ms, 2_500);
        assert_eq!(cfg.storage.max_log_bytes, 10 * 1024 * 1024);
        assert_eq!(cfg.uploader.batch_max, 6);
    }

    #[test]
    fn window_ordering_enforced() {
        let mut cfg = Config::default();
        cfg.timing.sample_point_temp_sec = 10;
        let err = cfg.validate().expect_err("expected validation error");
        assert!(err.to_string().contains("timing windows"));
    }

    #[test]
    fn batch_max_zero_rejected() {
        let mut cfg = Config::default();
        cfg.uploader.batch_max = 0;
        let err = cfg.validate().expect_err("expected validation error");
        assert!(err.to_string().contains("batch_max"));
    }

    #[test]
    fn load_returns_error_for_explicit_missing_path() {
        let result = Config::load(Some(Path::new("/nonexistent/tn-node/config.toml")));
        assert!(result.is_err());
        assert!(matches!(result.unwrap_err(), TnError::MissingConfig { .. }));
    }

    #[test]
    fn load_from_toml_roundtrips_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[endpoint]
url = "http://example.test/api.php"
api_key = "secret"

[timing]
window_flow_end_sec = 20
sample_point_temp_sec = 25
sample_point_volt_sec = 30
"#,
        )
        .unwrap();

        let cfg = Config::load(Some(&path)).unwrap();
        assert_eq!(cfg.endpoint.url, "http://example.test/api.php");
        assert_eq!(cfg.endpoint.api_key, "secret");
        assert_eq!(cfg.timing.window_flow_end_sec, 20);
    }
}
