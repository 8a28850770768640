//! Configuration types for the streaming core

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration shared by broadcaster, viewer, and talkback roles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// STUN server URLs (may be empty for direct connectivity)
    pub stun_servers: Vec<String>,

    /// TURN relay configurations (optional; absence lowers success
    /// probability behind restrictive networks but is legal)
    pub turn_servers: Vec<TurnServerConfig>,

    /// Local peer ID (auto-generated per instance if None)
    pub peer_id: Option<String>,

    /// Maximum concurrent viewer sessions per broadcaster (default: 10)
    pub max_viewers: u32,

    /// Recovery timing windows
    pub timing: TimingConfig,
}

/// TURN server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnServerConfig {
    /// TURN server URL (turn: or turns:)
    pub url: String,

    /// Username for TURN authentication
    pub username: String,

    /// Credential for TURN authentication
    pub credential: String,
}

/// Recovery timing windows
///
/// These values are empirically tuned for recovery latency, not load-bearing
/// for correctness; tests run them at millisecond scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Grace window after a transient disconnect before the session is
    /// replaced (default: 5000ms); many disconnects self-heal
    pub disconnect_grace_ms: u64,

    /// Grace window after an ICE restart for connectivity to land before
    /// falling back to replacement (default: 3000ms)
    pub restart_grace_ms: u64,

    /// Delay between tearing down a dead session and creating its
    /// replacement (default: 1500ms)
    pub replacement_delay_ms: u64,

    /// Settle delay before a received stream is surfaced to the sink
    /// (default: 300ms), so playback does not start on unprimed buffers
    pub media_settle_ms: u64,
}

impl TimingConfig {
    /// Disconnect grace window as a Duration
    pub fn disconnect_grace(&self) -> Duration {
        Duration::from_millis(self.disconnect_grace_ms)
    }

    /// Post-restart grace window as a Duration
    pub fn restart_grace(&self) -> Duration {
        Duration::from_millis(self.restart_grace_ms)
    }

    /// Replacement delay as a Duration
    pub fn replacement_delay(&self) -> Duration {
        Duration::from_millis(self.replacement_delay_ms)
    }

    /// Media settle delay as a Duration
    pub fn media_settle(&self) -> Duration {
        Duration::from_millis(self.media_settle_ms)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            turn_servers: Vec::new(),
            peer_id: None,
            max_viewers: 10,
            timing: TimingConfig::default(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            disconnect_grace_ms: 5000,
            restart_grace_ms: 3000,
            replacement_delay_ms: 1500,
            media_settle_ms: 300,
        }
    }
}

impl StreamConfig {
    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `max_viewers` is not in range 1-50
    /// - any STUN URL does not start with `stun:`
    /// - any TURN URL does not start with `turn:` or `turns:`
    /// - any timing window is zero
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        if self.max_viewers == 0 || self.max_viewers > 50 {
            return Err(Error::InvalidConfig(format!(
                "max_viewers must be in range 1-50, got {}",
                self.max_viewers
            )));
        }

        for url in &self.stun_servers {
            if !url.starts_with("stun:") {
                return Err(Error::InvalidConfig(format!(
                    "STUN URL must start with stun:, got {}",
                    url
                )));
            }
        }

        for server in &self.turn_servers {
            if !server.url.starts_with("turn:") && !server.url.starts_with("turns:") {
                return Err(Error::InvalidConfig(format!(
                    "TURN URL must start with turn: or turns:, got {}",
                    server.url
                )));
            }
        }

        let t = &self.timing;
        for (name, value) in [
            ("disconnect_grace_ms", t.disconnect_grace_ms),
            ("restart_grace_ms", t.restart_grace_ms),
            ("replacement_delay_ms", t.replacement_delay_ms),
            ("media_settle_ms", t.media_settle_ms),
        ] {
            if value == 0 {
                return Err(Error::InvalidConfig(format!("{} must be non-zero", name)));
            }
        }

        Ok(())
    }

    /// Create a configuration preset for flaky candidate networks
    ///
    /// Best for exam centers on cellular or congested Wi-Fi where disconnects
    /// usually self-heal given enough patience.
    ///
    /// Settings:
    /// - Disconnect grace: 8s (more time to self-heal)
    /// - Restart grace: 5s
    /// - Replacement delay: 2.5s (avoid thrashing the signaling store)
    /// - Media settle: 500ms
    ///
    /// # Example
    ///
    /// ```
    /// use proctorcast::config::StreamConfig;
    ///
    /// let config = StreamConfig::flaky_network();
    /// assert_eq!(config.timing.disconnect_grace_ms, 8000);
    /// ```
    pub fn flaky_network() -> Self {
        Self {
            stun_servers: vec![
                "stun:stun.l.google.com:19302".to_string(),
                "stun:stun1.l.google.com:19302".to_string(),
            ],
            turn_servers: Vec::new(),
            peer_id: None,
            max_viewers: 10,
            timing: TimingConfig {
                disconnect_grace_ms: 8000,
                restart_grace_ms: 5000,
                replacement_delay_ms: 2500,
                media_settle_ms: 500,
            },
        }
    }

    /// Create a configuration preset that fails over quickly
    ///
    /// Best for wired proctoring stations where a disconnect almost never
    /// self-heals and viewers want a replacement session as soon as possible.
    ///
    /// # Example
    ///
    /// ```
    /// use proctorcast::config::StreamConfig;
    ///
    /// let config = StreamConfig::fast_failover();
    /// assert_eq!(config.timing.disconnect_grace_ms, 2000);
    /// ```
    pub fn fast_failover() -> Self {
        Self {
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            turn_servers: Vec::new(),
            peer_id: None,
            max_viewers: 10,
            timing: TimingConfig {
                disconnect_grace_ms: 2000,
                restart_grace_ms: 1500,
                replacement_delay_ms: 500,
                media_settle_ms: 300,
            },
        }
    }

    /// Add TURN relay servers to this configuration
    ///
    /// Useful for chaining with preset methods.
    ///
    /// # Example
    ///
    /// ```
    /// use proctorcast::config::{StreamConfig, TurnServerConfig};
    ///
    /// let config = StreamConfig::flaky_network().with_turn_servers(vec![TurnServerConfig {
    ///     url: "turn:turn.example.com:3478".to_string(),
    ///     username: "user".to_string(),
    ///     credential: "pass".to_string(),
    /// }]);
    /// assert_eq!(config.turn_servers.len(), 1);
    /// ```
    pub fn with_turn_servers(mut self, turn_servers: Vec<TurnServerConfig>) -> Self {
        self.turn_servers = turn_servers;
        self
    }

    /// Set the local peer ID for this configuration
    pub fn with_peer_id(mut self, peer_id: &str) -> Self {
        self.peer_id = Some(peer_id.to_string());
        self
    }

    /// Set the maximum number of concurrent viewer sessions
    pub fn with_max_viewers(mut self, max_viewers: u32) -> Self {
        self.max_viewers = max_viewers;
        self
    }

    /// Replace the timing windows
    pub fn with_timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }
}
