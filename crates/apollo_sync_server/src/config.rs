//! Server configuration.

use std::time::Duration;

/// Configuration for the reference config service.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// How long a long-poll is held open while nothing changes.
    pub hold_timeout: Duration,
    /// Maximum namespaces accepted in one long-poll.
    pub max_notifications: usize,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new(hold_timeout: Duration) -> Self {
        Self {
            hold_timeout,
            max_notifications: 100,
        }
    }

    /// Sets the hold timeout.
    pub fn with_hold_timeout(mut self, timeout: Duration) -> Self {
        self.hold_timeout = timeout;
        self
    }

    /// Sets the maximum namespaces per long-poll.
    pub fn with_max_notifications(mut self, max: usize) -> Self {
        self.max_notifications = max;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.hold_timeout, Duration::from_secs(60));
        assert_eq!(config.max_notifications, 100);
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::default()
            .with_hold_timeout(Duration::from_millis(250))
            .with_max_notifications(2);

        assert_eq!(config.hold_timeout, Duration::from_millis(250));
        assert_eq!(config.max_notifications, 2);
    }
}
