//! Settings types.
//!
//! Every struct is `#[serde(default)]`, so a settings file only needs to name
//! the keys it changes.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatwireSettings {
    /// HTTP / WebSocket server.
    pub server: ServerSettings,
    /// Per-connection session behavior.
    pub session: SessionSettings,
    /// Status channel.
    pub status: StatusSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl ChatwireSettings {
    /// Reject values that would make the server unusable.
    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            return Err(SettingsError::InvalidValue("server.host is empty".into()));
        }
        if self.server.outbound_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "server.outboundQueueCapacity must be at least 1".into(),
            ));
        }
        if self.server.ping_interval_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "server.pingIntervalSecs must be at least 1".into(),
            ));
        }
        if self.server.pong_timeout_secs < self.server.ping_interval_secs {
            return Err(SettingsError::InvalidValue(
                "server.pongTimeoutSecs must not be shorter than the ping interval".into(),
            ));
        }
        if self.session.cancel_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "session.cancelTimeoutMs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Server network settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` picks a free port).
    pub port: u16,
    /// Directory holding `index.html` and the assets served under `/static`.
    pub static_dir: PathBuf,
    /// Application name passed to the agent runtime.
    pub app_name: String,
    /// Frames buffered per connection before senders wait.
    pub outbound_queue_capacity: usize,
    /// Seconds between server Ping frames.
    pub ping_interval_secs: u64,
    /// Seconds without client activity before the socket is dropped.
    pub pong_timeout_secs: u64,
}

impl ServerSettings {
    /// Ping interval as a `Duration`.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    /// Pong timeout as a `Duration`.
    pub fn pong_timeout(&self) -> Duration {
        Duration::from_secs(self.pong_timeout_secs)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            static_dir: PathBuf::from("static"),
            app_name: "ADK Chat App".to_string(),
            outbound_queue_capacity: 256,
            ping_interval_secs: 30,
            pong_timeout_secs: 60,
        }
    }
}

/// Connection session settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Ceiling on waiting for a relay task to acknowledge cancellation.
    pub cancel_timeout_ms: u64,
    /// Send `server_log` diagnostic frames to the client.
    pub forward_server_logs: bool,
}

impl SessionSettings {
    /// Cancellation ceiling as a `Duration`.
    pub fn cancel_timeout(&self) -> Duration {
        Duration::from_millis(self.cancel_timeout_ms)
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            cancel_timeout_ms: 2_000,
            forward_server_logs: false,
        }
    }
}

/// Status channel settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatusSettings {
    /// Messages kept for `GET /status`.
    pub history_limit: usize,
    /// Delay between steps of the simulated background job.
    pub simulate_step_delay_ms: u64,
}

impl Default for StatusSettings {
    fn default() -> Self {
        Self {
            history_limit: 100,
            simulate_step_delay_ms: 1_500,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
