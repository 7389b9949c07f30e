use serde::{Deserialize, Serialize};

/// Where the sync link connects and how it recovers
///
/// Both the sending and the receiving side connect to the same relay endpoint, so
/// the two configs usually differ only in who runs with `--receive`.
///
/// # Performance Impact
///
/// - `reconnect_delay_ms`: lower values bring the link back sooner after the relay
///   restarts but retry more aggressively while it is down
/// - `frame_queue`: frames waiting for the socket writer. A small queue drops frames
///   on a slow network instead of letting the peer fall behind
///
/// # Examples
///
/// ```rust
/// use iidx_monitor::sync::SyncConfig;
///
/// let config = SyncConfig::default();
/// assert_eq!(config.url(), "ws://127.0.0.1:2356/ws");
///
/// // Relay on another machine in the LAN
/// let lan = SyncConfig {
///     host: "192.168.1.40".to_string(),
///     path: "ws".to_string(),
///     ..Default::default()
/// };
/// assert_eq!(lan.url(), "ws://192.168.1.40:2356/ws");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub path: String,
    pub reconnect_delay_ms: u64,
    /// Frames waiting for the socket writer; newer frames are dropped when full
    pub frame_queue: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 2356,
            path: "/ws".to_string(),
            reconnect_delay_ms: 1000,
            frame_queue: 64,
        }
    }
}

impl SyncConfig {
    pub fn url(&self) -> String {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        format!("ws://{}:{}{}", self.host, self.port, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_url_points_at_local_peer() {
        assert_eq!(SyncConfig::default().url(), "ws://127.0.0.1:2356/ws");
    }

    #[test]
    fn path_gets_leading_slash() {
        let config = SyncConfig {
            host: "192.168.0.20".into(),
            path: "live".into(),
            ..Default::default()
        };

        assert_eq!(config.url(), "ws://192.168.0.20:2356/live");
    }
}
