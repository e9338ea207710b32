//! Configuration for the framelink demo host.

use std::path::Path;
use std::time::Duration;

use framelink_core::{ReceiveConfig, SendConfig};
use serde::{Deserialize, Serialize};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Pipeline settings.
    pub link: LinkConfig,
    /// Test-pattern source settings.
    pub pattern: PatternConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Endpoint name used for both sending and receiving.
    pub source_name: String,
    /// Label the receive side announces itself under.
    pub receiver_label: String,
    /// Outbound frame rate in frames per second.
    pub framerate: u32,
    /// Whether frames are actually transmitted (pacing and
    /// backpressure run either way).
    pub send_enabled: bool,
    /// Apply the R↔B channel swap before transmission.
    pub swap_channels: bool,
    /// Blocking capture timeout in milliseconds.
    pub capture_timeout_ms: u64,
    /// Transmit-thread queue wait in milliseconds.
    pub queue_wait_ms: u64,
    /// Transmit-thread lock-retry sleep in milliseconds.
    pub handle_retry_ms: u64,
}

/// Test-pattern source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// Pattern width in pixels.
    pub width: u32,
    /// Pattern height in pixels.
    pub height: u32,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            link: LinkConfig::default(),
            pattern: PatternConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            source_name: "Example".into(),
            receiver_label: String::new(),
            framerate: 30,
            send_enabled: true,
            swap_channels: false,
            capture_timeout_ms: 1000,
            queue_wait_ms: 250,
            handle_retry_ms: 20,
        }
    }
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Receive-pipeline settings derived from this config.
    pub fn to_receive_config(&self) -> ReceiveConfig {
        ReceiveConfig {
            capture_timeout: Duration::from_millis(self.link.capture_timeout_ms.max(1)),
            receiver_label: (!self.link.receiver_label.is_empty())
                .then(|| self.link.receiver_label.clone()),
            ..ReceiveConfig::default()
        }
    }

    /// Send-pipeline settings derived from this config.
    pub fn to_send_config(&self) -> SendConfig {
        SendConfig {
            queue_wait: Duration::from_millis(self.link.queue_wait_ms.max(1)),
            handle_retry: Duration::from_millis(self.link.handle_retry_ms.max(1)),
            swap_channels: self.link.swap_channels,
            send_enabled: self.link.send_enabled,
            ..SendConfig::default()
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
