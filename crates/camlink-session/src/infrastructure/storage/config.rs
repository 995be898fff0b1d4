//! TOML-based configuration persistence for CamLink.
//!
//! Reads and writes [`AppConfig`] to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\CamLink\config.toml`
//! - Linux:    `$XDG_CONFIG_HOME/camlink/config.toml` (or `~/.config/camlink/`)
//! - macOS:    `~/Library/Application Support/CamLink/config.toml`
//!
//! Example file:
//!
//! ```toml
//! [general]
//! device_name = "tripod-phone"
//! log_level = "info"
//!
//! [session]
//! accept_timeout_secs = 120
//! min_frame_interval_ms = 250
//! jpeg_quality = 40
//! keepalive_interval_secs = 5   # 0 disables keepalive pings
//! idle_timeout_secs = 15        # 0 disables the idle timeout
//!
//! [network]
//! bind_address = "0.0.0.0:24900"
//!
//! [[peers]]
//! name = "living-room-phone"
//! address = "192.168.1.20:24900"
//! ```
//!
//! Every field has a serde default, so a missing file, a missing section or
//! a config written by an older version all load cleanly.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::application::config::SessionConfig;
use crate::application::transport::{
    PeerHandle, ServiceRecord, CAMERA_REMOTE_SERVICE_ID, CAMERA_REMOTE_SERVICE_NAME,
};

/// Failures while reading, writing or interpreting `config.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Neither the XDG/HOME nor the APPDATA variables point anywhere.
    #[error("no platform config directory (set HOME or pass --config)")]
    NoPlatformConfigDir,

    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config is not valid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("cannot write config as TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A field parsed but holds an unusable value.
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Contents of `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub service: ServiceSettings,
    #[serde(default)]
    pub network: NetworkSettings,
    /// Devices this one has been paired with, offered to the controller.
    #[serde(default)]
    pub peers: Vec<PeerHandle>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralConfig {
    /// Label for this device in log output only.  No message carries it, so
    /// a TCP peer knows this device by its socket address.
    #[serde(default = "default_device_name")]
    pub device_name: String,
    /// `tracing` log level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Session timing and sizing.  Durations are whole seconds or milliseconds
/// so the file stays readable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSettings {
    #[serde(default = "default_accept_timeout_secs")]
    pub accept_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_min_frame_interval_ms")]
    pub min_frame_interval_ms: u64,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    #[serde(default = "default_outbound_queue_depth")]
    pub outbound_queue_depth: usize,
    /// `0` disables keepalive pings.
    #[serde(default = "default_keepalive_interval_secs")]
    pub keepalive_interval_secs: u64,
    /// `0` disables the idle timeout.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_preview_tick_ms")]
    pub preview_tick_ms: u64,
    #[serde(default = "default_preview_start_delay_ms")]
    pub preview_start_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceSettings {
    #[serde(default = "default_service_name")]
    pub name: String,
    #[serde(default = "default_service_id")]
    pub id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkSettings {
    /// Address the host listens on.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_device_name() -> String {
    "camlink".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_accept_timeout_secs() -> u64 {
    120
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_min_frame_interval_ms() -> u64 {
    250
}
fn default_jpeg_quality() -> u8 {
    40
}
fn default_outbound_queue_depth() -> usize {
    64
}
fn default_keepalive_interval_secs() -> u64 {
    5
}
fn default_idle_timeout_secs() -> u64 {
    15
}
fn default_preview_tick_ms() -> u64 {
    100
}
fn default_preview_start_delay_ms() -> u64 {
    1000
}
fn default_service_name() -> String {
    CAMERA_REMOTE_SERVICE_NAME.to_string()
}
fn default_service_id() -> Uuid {
    CAMERA_REMOTE_SERVICE_ID
}
fn default_bind_address() -> String {
    "0.0.0.0:24900".to_string()
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            log_level: default_log_level(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            accept_timeout_secs: default_accept_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            min_frame_interval_ms: default_min_frame_interval_ms(),
            jpeg_quality: default_jpeg_quality(),
            outbound_queue_depth: default_outbound_queue_depth(),
            keepalive_interval_secs: default_keepalive_interval_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            preview_tick_ms: default_preview_tick_ms(),
            preview_start_delay_ms: default_preview_start_delay_ms(),
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            id: default_service_id(),
        }
    }
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

fn optional_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl AppConfig {
    /// Builds the runtime [`SessionConfig`] from the file's settings.
    pub fn session_config(&self) -> SessionConfig {
        let s = &self.session;
        SessionConfig {
            service: ServiceRecord {
                name: self.service.name.clone(),
                id: self.service.id,
            },
            accept_timeout: Duration::from_secs(s.accept_timeout_secs),
            connect_timeout: Duration::from_secs(s.connect_timeout_secs),
            min_frame_interval: Duration::from_millis(s.min_frame_interval_ms),
            jpeg_quality: s.jpeg_quality.clamp(1, 100),
            outbound_queue_depth: s.outbound_queue_depth.max(1),
            keepalive_interval: optional_secs(s.keepalive_interval_secs),
            idle_timeout: optional_secs(s.idle_timeout_secs),
            preview_tick: Duration::from_millis(s.preview_tick_ms.max(1)),
            preview_start_delay: Duration::from_millis(s.preview_start_delay_ms),
            ..SessionConfig::default()
        }
    }

    /// Parses `network.bind_address`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] if it is not a `host:port` socket address.
    pub fn bind_address(&self) -> Result<SocketAddr, ConfigError> {
        self.network
            .bind_address
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                field: "network.bind_address",
                reason: e.to_string(),
            })
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Directory holding `config.toml` on this platform.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Full path of `config.toml`.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `AppConfig` from `path`, returning `AppConfig::default()` if the file
/// does not exist yet.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes `config` to `path`, creating the parent directory if needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config base directory including the `CamLink` subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("CamLink"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("camlink"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME")
            .map(|h| PathBuf::from(h).join("Library").join("Application Support").join("CamLink"))
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("camlink_test_{}", Uuid::new_v4()))
            .join("config.toml")
    }

    #[test]
    fn test_app_config_default_matches_session_defaults() {
        // Arrange / Act
        let session = AppConfig::default().session_config();
        let expected = SessionConfig::default();

        // Assert
        assert_eq!(session.accept_timeout, expected.accept_timeout);
        assert_eq!(session.connect_timeout, expected.connect_timeout);
        assert_eq!(session.min_frame_interval, expected.min_frame_interval);
        assert_eq!(session.jpeg_quality, expected.jpeg_quality);
        assert_eq!(session.keepalive_interval, expected.keepalive_interval);
        assert_eq!(session.idle_timeout, expected.idle_timeout);
        assert_eq!(session.service, expected.service);
    }

    #[test]
    fn test_deserialize_empty_toml_uses_defaults() {
        let cfg: AppConfig = toml::from_str("").expect("empty file is valid");
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.general.log_level, "info");
        assert!(cfg.peers.is_empty());
    }

    #[test]
    fn test_deserialize_partial_session_overrides_defaults() {
        // Arrange
        let toml_str = r#"
[session]
jpeg_quality = 70
keepalive_interval_secs = 0
"#;

        // Act
        let cfg: AppConfig = toml::from_str(toml_str).expect("deserialize partial");
        let session = cfg.session_config();

        // Assert
        assert_eq!(session.jpeg_quality, 70);
        assert_eq!(session.keepalive_interval, None);
        assert_eq!(session.idle_timeout, Some(Duration::from_secs(15)));
    }

    #[test]
    fn test_deserialize_peer_list() {
        let toml_str = r#"
[[peers]]
name = "living-room-phone"
address = "192.168.1.20:24900"

[[peers]]
name = "tablet"
address = "192.168.1.21:24900"
"#;
        let cfg: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.peers.len(), 2);
        assert_eq!(cfg.peers[1], PeerHandle::new("tablet", "192.168.1.21:24900"));
    }

    #[test]
    fn test_bind_address_rejects_garbage() {
        let mut cfg = AppConfig::default();
        cfg.network.bind_address = "everywhere".to_string();
        assert!(matches!(
            cfg.bind_address(),
            Err(ConfigError::Invalid { field: "network.bind_address", .. })
        ));
    }

    #[test]
    fn test_deserialize_invalid_toml_returns_parse_error() {
        let path = temp_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[[[ not valid toml").unwrap();

        let result = load_config_from(&path);

        assert!(matches!(result, Err(ConfigError::Parse(_))));
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_load_config_from_missing_file_returns_default() {
        let result = load_config_from(&temp_path()).unwrap();
        assert_eq!(result, AppConfig::default());
    }

    #[test]
    fn test_save_and_load_config_round_trip_via_temp_dir() {
        // Arrange
        let path = temp_path();
        let mut cfg = AppConfig::default();
        cfg.general.device_name = "tripod-phone".to_string();
        cfg.session.min_frame_interval_ms = 500;
        cfg.peers.push(PeerHandle::new("tablet", "10.0.0.7:24900"));

        // Act
        save_config_to(&cfg, &path).unwrap();
        let loaded = load_config_from(&path).unwrap();

        // Assert
        assert_eq!(loaded, cfg);

        // Cleanup
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_config_file_path_ends_with_config_toml() {
        if let Ok(path) = config_file_path() {
            assert!(path.ends_with("config.toml"), "got {path:?}");
        }
    }
}
