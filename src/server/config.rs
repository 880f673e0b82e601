//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

use crate::media::annexb::DEFAULT_MAX_UNIT_LEN;

/// Relay server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the HTTP signaling surface to
    pub bind_addr: SocketAddr,

    /// STUN servers handed to the peer transport as ICE discovery hints
    pub stun_servers: Vec<String>,

    /// Hard cap on one access unit before the reframer force-emits
    pub max_unit_len: usize,

    /// How often the stale-session sweep runs
    pub reaper_interval: Duration,

    /// How long a session may sit in a terminal state before eviction
    pub terminal_grace: Duration,

    /// Absolute session age limit, applied regardless of state
    pub max_session_age: Duration,

    /// How often the metrics emitter logs counters
    pub stats_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".parse().unwrap(),
            stun_servers: vec!["stun:stun.l.google.com:19302".to_owned()],
            max_unit_len: DEFAULT_MAX_UNIT_LEN,
            reaper_interval: Duration::from_secs(60),
            terminal_grace: Duration::from_secs(120),
            max_session_age: Duration::from_secs(4 * 60 * 60),
            stats_interval: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    /// Create a new config with a custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Replace the STUN server list
    pub fn stun_servers(mut self, servers: Vec<String>) -> Self {
        self.stun_servers = servers;
        self
    }

    /// Set the sweep interval
    pub fn reaper_interval(mut self, interval: Duration) -> Self {
        self.reaper_interval = interval;
        self
    }

    /// Set the terminal-state grace period
    pub fn terminal_grace(mut self, grace: Duration) -> Self {
        self.terminal_grace = grace;
        self
    }

    /// Set the absolute session age limit
    pub fn max_session_age(mut self, age: Duration) -> Self {
        self.max_session_age = age;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.stun_servers.len(), 1);
        assert_eq!(config.max_unit_len, DEFAULT_MAX_UNIT_LEN);
        assert_eq!(config.reaper_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let config = ServerConfig::default()
            .bind(addr)
            .stun_servers(vec![])
            .reaper_interval(Duration::from_secs(5))
            .terminal_grace(Duration::from_secs(10))
            .max_session_age(Duration::from_secs(600));

        assert_eq!(config.bind_addr, addr);
        assert!(config.stun_servers.is_empty());
        assert_eq!(config.reaper_interval, Duration::from_secs(5));
        assert_eq!(config.terminal_grace, Duration::from_secs(10));
        assert_eq!(config.max_session_age, Duration::from_secs(600));
    }
}
