//! Runtime configuration for a session.
//!
//! [`SessionConfig`] is a plain struct with sensible defaults.  The TOML file
//! handled by `infrastructure::storage::config` converts into it; tests build
//! one directly with shortened timeouts.

use std::time::Duration;

use crate::application::transport::{ConnectMode, ServiceRecord, DEFAULT_CONNECT_MODES};

/// Tunables for one [`SessionManager`](crate::SessionManager).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Service the host listens under and the controller connects to.
    pub service: ServiceRecord,
    /// How long a listening host waits for a controller.
    pub accept_timeout: Duration,
    /// Deadline for each individual connect attempt.
    pub connect_timeout: Duration,
    /// Connection modes the controller tries, in order.
    pub connect_modes: Vec<ConnectMode>,
    /// Minimum spacing between two transmitted preview frames.
    pub min_frame_interval: Duration,
    /// JPEG quality for preview frames (1–100).
    pub jpeg_quality: u8,
    /// Capacity of the outbound message queue.  Sends beyond it are dropped.
    pub outbound_queue_depth: usize,
    /// Longest inbound line accepted before the stream is considered corrupt.
    pub max_line_bytes: usize,
    /// Interval between keepalive PINGs, `None` to disable.
    pub keepalive_interval: Option<Duration>,
    /// Silence after which a connected stream is considered dead, `None` to disable.
    /// Armed only once the peer has sent a PING or ACK.
    pub idle_timeout: Option<Duration>,
    /// How often the host pulls a preview frame from the camera.
    pub preview_tick: Duration,
    /// Delay between connecting and the first preview frame.
    pub preview_start_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            service: ServiceRecord::default(),
            accept_timeout: Duration::from_secs(120),
            connect_timeout: Duration::from_secs(10),
            connect_modes: DEFAULT_CONNECT_MODES.to_vec(),
            min_frame_interval: Duration::from_millis(250),
            jpeg_quality: 40,
            outbound_queue_depth: 64,
            max_line_bytes: 4 * 1024 * 1024,
            keepalive_interval: Some(Duration::from_secs(5)),
            idle_timeout: Some(Duration::from_secs(15)),
            preview_tick: Duration::from_millis(100),
            preview_start_delay: Duration::from_secs(1),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_defaults() {
        let cfg = SessionConfig::default();
        assert_eq!(cfg.accept_timeout, Duration::from_secs(120));
        assert_eq!(cfg.min_frame_interval, Duration::from_millis(250));
        assert_eq!(cfg.jpeg_quality, 40);
        assert_eq!(cfg.outbound_queue_depth, 64);
        assert_eq!(cfg.connect_modes, DEFAULT_CONNECT_MODES.to_vec());
    }

    #[test]
    fn test_keepalive_is_shorter_than_idle_timeout() {
        let cfg = SessionConfig::default();
        let (Some(ping), Some(idle)) = (cfg.keepalive_interval, cfg.idle_timeout) else {
            panic!("both keepalive settings are on by default");
        };
        assert!(ping < idle, "a healthy peer must ping before the idle deadline");
    }
}
