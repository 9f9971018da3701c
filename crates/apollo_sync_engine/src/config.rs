//! Configuration for the sync engine.

use crate::error::{SyncError, SyncResult};
use apollo_sync_protocol::{DEFAULT_CLUSTER, DEFAULT_NAMESPACE};
use serde::Deserialize;
use std::net::{Ipv4Addr, UdpSocket};
use std::path::PathBuf;
use std::time::Duration;

/// Address probed to learn which local interface routes outbound traffic.
/// Connecting a UDP socket sends no packets.
const IP_PROBE_ADDR: (Ipv4Addr, u16) = (Ipv4Addr::new(8, 8, 8, 8), 53);

/// Configuration for the sync engine.
///
/// Can be built in code with the `with_*` methods or deserialized from any
/// serde format; durations are given in seconds there.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Application id registered with the configuration service.
    pub app_id: String,
    /// Cluster name.
    pub cluster: String,
    /// Base URL of the configuration service.
    pub server_url: String,
    /// Long-poll timeout. Also the fixed backoff after a failed poll.
    #[serde(with = "secs")]
    pub timeout: Duration,
    /// Client IP reported to the service. Detected when unset.
    pub ip: Option<String>,
    /// Whether to dump the cache to `dump_dir` after every refresh.
    pub dump_enabled: bool,
    /// Directory for snapshot dumps.
    pub dump_dir: PathBuf,
    /// Bound on the blocking first synchronization. `None` retries forever.
    #[serde(with = "opt_secs")]
    pub startup_deadline: Option<Duration>,
    /// Whether refreshed namespaces are copied into the shared config store.
    pub propagate_globals: bool,
    /// Namespaces tracked from construction on.
    pub namespaces: Vec<String>,
}

impl SyncConfig {
    /// Creates a new configuration for the given application.
    pub fn new(app_id: impl Into<String>, server_url: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            cluster: DEFAULT_CLUSTER.to_string(),
            server_url: server_url.into(),
            timeout: Duration::from_secs(10),
            ip: None,
            dump_enabled: false,
            dump_dir: PathBuf::from("/tmp/apollo_config/"),
            startup_deadline: Some(Duration::from_secs(30)),
            propagate_globals: true,
            namespaces: vec![DEFAULT_NAMESPACE.to_string()],
        }
    }

    /// Sets the cluster.
    pub fn with_cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = cluster.into();
        self
    }

    /// Sets the long-poll timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the client IP instead of detecting it.
    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    /// Enables snapshot dumps into the given directory.
    pub fn with_dump_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dump_enabled = true;
        self.dump_dir = dir.into();
        self
    }

    /// Sets the startup deadline. `None` retries forever.
    pub fn with_startup_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.startup_deadline = deadline;
        self
    }

    /// Enables or disables copying namespaces into the shared config store.
    pub fn with_propagate_globals(mut self, enabled: bool) -> Self {
        self.propagate_globals = enabled;
        self
    }

    /// Adds a namespace tracked from construction on.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        if !self.namespaces.contains(&namespace) {
            self.namespaces.push(namespace);
        }
        self
    }

    /// Checks that the configuration can drive an engine.
    pub fn validate(&self) -> SyncResult<()> {
        if self.app_id.trim().is_empty() {
            return Err(SyncError::InvalidConfig("app_id must not be empty".into()));
        }
        if self.server_url.trim().is_empty() {
            return Err(SyncError::InvalidConfig(
                "server_url must not be empty".into(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(SyncError::InvalidConfig("timeout must be positive".into()));
        }
        Ok(())
    }

    /// Returns the configured IP, or detects one.
    pub fn client_ip(&self) -> String {
        match &self.ip {
            Some(ip) => ip.clone(),
            None => detect_local_ip(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("", "http://localhost:8080")
    }
}

/// Detects the local IP used for outbound traffic, falling back to loopback.
pub fn detect_local_ip() -> String {
    let probe = || -> std::io::Result<String> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect(IP_PROBE_ADDR)?;
        Ok(socket.local_addr()?.ip().to_string())
    };
    match probe() {
        Ok(ip) => ip,
        Err(e) => {
            tracing::warn!(error = %e, "local ip detection failed, using loopback");
            Ipv4Addr::LOCALHOST.to_string()
        }
    }
}

mod secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

mod opt_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(d)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_service_conventions() {
        let config = SyncConfig::new("demo", "http://config:8080");
        assert_eq!(config.cluster, "default");
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.namespaces, vec!["application".to_string()]);
        assert!(config.propagate_globals);
        assert!(!config.dump_enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new("demo", "http://config:8080")
            .with_cluster("gray")
            .with_timeout(Duration::from_secs(2))
            .with_ip("10.1.2.3")
            .with_dump_dir("/var/tmp/apollo")
            .with_startup_deadline(None)
            .with_namespace("db")
            .with_namespace("db");

        assert_eq!(config.cluster, "gray");
        assert_eq!(config.timeout, Duration::from_secs(2));
        assert_eq!(config.client_ip(), "10.1.2.3");
        assert!(config.dump_enabled);
        assert_eq!(config.dump_dir, PathBuf::from("/var/tmp/apollo"));
        assert_eq!(config.startup_deadline, None);
        assert_eq!(
            config.namespaces,
            vec!["application".to_string(), "db".to_string()]
        );
    }

    #[test]
    fn validate_rejects_incomplete_config() {
        assert!(matches!(
            SyncConfig::default().validate(),
            Err(SyncError::InvalidConfig(_))
        ));
        assert!(SyncConfig::new("demo", "").validate().is_err());
        assert!(SyncConfig::new("demo", "http://x")
            .with_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn deserialize_with_seconds() {
        let config: SyncConfig = serde_json::from_str(
            r#"{
                "app_id": "demo",
                "server_url": "http://config:8080",
                "timeout": 1.5,
                "startup_deadline": null
            }"#,
        )
        .unwrap();

        assert_eq!(config.app_id, "demo");
        assert_eq!(config.cluster, "default");
        assert_eq!(config.timeout, Duration::from_millis(1500));
        assert_eq!(config.startup_deadline, None);
    }

    #[test]
    fn detected_ip_is_parseable() {
        let ip = detect_local_ip();
        assert!(ip.parse::<std::net::IpAddr>().is_ok());
    }
}
