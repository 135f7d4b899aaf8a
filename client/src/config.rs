//! Client configuration

use std::time::Duration;

/// Endpoints and timing knobs of the client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the REST surface, e.g. `https://api.miramatch.app`
    pub api_base_url: String,
    /// Websocket endpoint, derived from the API base when not given
    pub socket_url: String,
    /// Reconnect attempts after the socket drops
    pub reconnect_attempts: u32,
    /// Pause before each reconnect attempt
    pub reconnect_delay: Duration,
    /// Silence after which typing is considered stopped
    pub typing_quiet_interval: Duration,
}

impl ClientConfig {
    /// Config with default timings for a server at `api_base_url`
    pub fn new(api_base_url: impl Into<String>) -> Self {
        let api_base_url = api_base_url.into().trim_end_matches('/').to_string();
        let socket_url = socket_url_for(&api_base_url);
        Self {
            api_base_url,
            socket_url,
            reconnect_attempts: 5,
            reconnect_delay: Duration::from_secs(1),
            typing_quiet_interval: Duration::from_secs(3),
        }
    }

    pub fn with_socket_url(mut self, socket_url: impl Into<String>) -> Self {
        self.socket_url = socket_url.into();
        self
    }
}

/// Map an HTTP base URL onto the `/ws` endpoint of the same host
fn socket_url_for(base: &str) -> String {
    let ws = if base.starts_with("wss://") || base.starts_with("ws://") {
        base.to_string()
    } else if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else if base.starts_with("localhost") || base.starts_with("127.0.0.1") {
        // No TLS in dev
        format!("ws://{}", base)
    } else {
        format!("wss://{}", base)
    };

    if ws.ends_with("/ws") {
        ws
    } else {
        format!("{}/ws", ws)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_url_follows_api_scheme() {
        assert_eq!(
            ClientConfig::new("https://api.miramatch.app/").socket_url,
            "wss://api.miramatch.app/ws"
        );
        assert_eq!(
            ClientConfig::new("http://10.0.2.2:3000").socket_url,
            "ws://10.0.2.2:3000/ws"
        );
        assert_eq!(ClientConfig::new("localhost:3000").socket_url, "ws://localhost:3000/ws");
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::new("http://localhost:3000");
        assert_eq!(config.reconnect_attempts, 5);
        assert_eq!(config.reconnect_delay, Duration::from_secs(1));
        assert_eq!(config.typing_quiet_interval, Duration::from_secs(3));
    }
}
