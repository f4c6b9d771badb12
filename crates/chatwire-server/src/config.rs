//! Runtime configuration of the server, resolved from settings.

use std::path::PathBuf;
use std::time::Duration;

use chatwire_settings::ChatwireSettings;

/// Configuration for the chat server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` auto-assigns).
    pub port: u16,
    /// Directory holding `index.html` and `/static` assets.
    pub static_dir: PathBuf,
    /// Application name handed to the agent runtime.
    pub app_name: String,
    /// Outbound frames buffered per connection.
    pub outbound_queue_capacity: usize,
    /// Interval between server Ping frames.
    pub ping_interval: Duration,
    /// Silence after which a client is dropped.
    pub pong_timeout: Duration,
    /// Ceiling on waiting for a relay task to observe cancellation.
    pub cancel_timeout: Duration,
    /// Send `server_log` frames to clients.
    pub forward_server_logs: bool,
    /// Delay between simulated work steps.
    pub simulate_step_delay: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            static_dir: PathBuf::from("static"),
            app_name: "ADK Chat App".into(),
            outbound_queue_capacity: 256,
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(60),
            cancel_timeout: Duration::from_secs(2),
            forward_server_logs: false,
            simulate_step_delay: Duration::from_millis(1_500),
        }
    }
}

impl From<&ChatwireSettings> for ServerConfig {
    fn from(settings: &ChatwireSettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            static_dir: settings.server.static_dir.clone(),
            app_name: settings.server.app_name.clone(),
            outbound_queue_capacity: settings.server.outbound_queue_capacity,
            ping_interval: settings.server.ping_interval(),
            pong_timeout: settings.server.pong_timeout(),
            cancel_timeout: settings.session.cancel_timeout(),
            forward_server_logs: settings.session.forward_server_logs,
            simulate_step_delay: Duration::from_millis(settings.status.simulate_step_delay_ms),
        }
    }
}

impl ServerConfig {
    /// `host:port` string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_binds_loopback_on_any_port() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.bind_addr(), "127.0.0.1:0");
        assert_eq!(cfg.cancel_timeout, Duration::from_secs(2));
        assert!(!cfg.forward_server_logs);
    }

    #[test]
    fn from_settings() {
        let mut settings = ChatwireSettings::default();
        settings.server.port = 9000;
        settings.session.cancel_timeout_ms = 250;
        settings.session.forward_server_logs = true;
        settings.status.simulate_step_delay_ms = 10;
        let cfg = ServerConfig::from(&settings);
        assert_eq!(cfg.bind_addr(), "0.0.0.0:9000");
        assert_eq!(cfg.cancel_timeout, Duration::from_millis(250));
        assert!(cfg.forward_server_logs);
        assert_eq!(cfg.simulate_step_delay, Duration::from_millis(10));
        assert_eq!(cfg.ping_interval, Duration::from_secs(30));
        assert_eq!(cfg.app_name, "ADK Chat App");
    }
}
