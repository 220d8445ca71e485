use crate::stream::Protocol;
use crate::utils::error::{MeshProxyError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub listeners: Vec<ProxyConfig>,
    #[serde(default)]
    pub clusters: Vec<ClusterConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String, // "json" or "pretty"
}

/// Routing section of one proxy listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub name: String,
    #[serde(default = "default_protocol")]
    pub downstream_protocol: Protocol,
    #[serde(default = "default_protocol")]
    pub upstream_protocol: Protocol,
    /// Append a catch-all route resolving clusters by service name.
    #[serde(default)]
    pub support_dynamic_route: bool,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    pub name: String,
    pub service: String,
    pub cluster: String,
    #[serde(default = "default_global_timeout_ms")]
    pub global_timeout_ms: u64,
    #[serde(default)]
    pub retry_policy: Option<RetryPolicyConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryPolicyConfig {
    #[serde(default)]
    pub retry_on: bool,
    #[serde(default)]
    pub retry_timeout_ms: u64,
    #[serde(default)]
    pub num_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub name: String,
    /// Concurrent in-flight requests admitted per cluster; 0 rejects all.
    #[serde(default = "default_max_requests")]
    pub max_requests: u64,
    #[serde(default)]
    pub hosts: Vec<HostConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    pub address: String,
    #[serde(default)]
    pub hostname: Option<String>,
}

// Default values
fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_protocol() -> Protocol {
    Protocol::Http1
}

fn default_global_timeout_ms() -> u64 {
    60_000
}

fn default_max_requests() -> u64 {
    1024
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl ProxyConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            downstream_protocol: default_protocol(),
            upstream_protocol: default_protocol(),
            support_dynamic_route: false,
            routes: Vec::new(),
        }
    }

    /// Validate the routing rules of this listener
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(MeshProxyError::Config(
                "listener name cannot be empty".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for route in &self.routes {
            if route.name.trim().is_empty()
                || route.service.trim().is_empty()
                || route.cluster.trim().is_empty()
            {
                return Err(MeshProxyError::Config(format!(
                    "listener {}: route name, service and cluster are required",
                    self.name
                )));
            }

            if !names.insert(route.name.as_str()) {
                return Err(MeshProxyError::Config(format!(
                    "listener {}: duplicate route name {}",
                    self.name, route.name
                )));
            }
        }

        Ok(())
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| MeshProxyError::Config(format!("Failed to read config file: {}", e)))?;

        Self::parse(&content)
    }

    /// Parse and validate configuration text
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| MeshProxyError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(MeshProxyError::Config(format!(
                "Invalid log format: {}. Must be 'pretty' or 'json'",
                self.logging.format
            )));
        }

        let mut listeners = HashSet::new();
        for listener in &self.listeners {
            listener.validate()?;
            if !listeners.insert(listener.name.as_str()) {
                return Err(MeshProxyError::Config(format!(
                    "duplicate listener name {}",
                    listener.name
                )));
            }
        }

        let mut clusters = HashSet::new();
        for cluster in &self.clusters {
            if cluster.name.trim().is_empty() {
                return Err(MeshProxyError::Config(
                    "cluster name cannot be empty".to_string(),
                ));
            }
            if !clusters.insert(cluster.name.as_str()) {
                return Err(MeshProxyError::Config(format!(
                    "duplicate cluster name {}",
                    cluster.name
                )));
            }
        }

        Ok(())
    }

    pub fn listener(&self, name: &str) -> Option<&ProxyConfig> {
        self.listeners.iter().find(|l| l.name == name)
    }

    /// Create example configuration file
    pub fn create_example<P: AsRef<Path>>(path: P) -> Result<()> {
        let example = r#"[logging]
level = "info"  # Options: "trace", "debug", "info", "warn", "error"
format = "pretty"  # Options: "pretty", "json"

[[listeners]]
name = "egress"
downstream_protocol = "http1"  # Options: "http1", "http2", "sofarpc"
upstream_protocol = "http1"
support_dynamic_route = true

  [[listeners.routes]]
  name = "orders"
  service = "com.example.orders"
  cluster = "orders"
  global_timeout_ms = 30000

    [listeners.routes.retry_policy]
    retry_on = true
    retry_timeout_ms = 2000
    num_retries = 2

[[clusters]]
name = "orders"
max_requests = 1024

  [[clusters.hosts]]
  address = "127.0.0.1:8080"
"#;

        std::fs::write(path.as_ref(), example).map_err(|e| {
            MeshProxyError::Config(format!("Failed to write example config: {}", e))
        })?;

        Ok(())
    }
}

/// Load configuration without blocking the runtime
pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = tokio::fs::read_to_string(path.as_ref())
        .await
        .map_err(|e| MeshProxyError::Config(format!("Failed to read config file: {}", e)))?;

    let config = Config::parse(&content)?;

    info!(
        listeners = config.listeners.len(),
        clusters = config.clusters.len(),
        "Configuration loaded successfully"
    );

    Ok(config)
}

/// Load configuration synchronously (for use from watcher callbacks)
pub fn load_config_sync<P: AsRef<Path>>(path: P) -> Result<Config> {
    let config = Config::from_file(path)?;

    info!(
        listeners = config.listeners.len(),
        clusters = config.clusters.len(),
        "Configuration loaded successfully"
    );

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(name: &str) -> RouteConfig {
        RouteConfig {
            name: name.to_string(),
            service: format!("svc-{}", name),
            cluster: format!("cluster-{}", name),
            global_timeout_ms: 1000,
            retry_policy: None,
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "pretty");
        assert!(config.listeners.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        let mut listener = ProxyConfig::new("egress");
        listener.routes.push(route("a"));
        listener.routes.push(route("a"));
        config.listeners.push(listener);
        assert!(config.validate().is_err()); // duplicate route

        config.listeners[0].routes.pop();
        assert!(config.validate().is_ok());

        config.listeners[0].routes[0].cluster = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.listeners.push(ProxyConfig::new("egress"));
        config.listeners.push(ProxyConfig::new("egress"));
        assert!(config.validate().is_err()); // duplicate listener
    }

    #[test]
    fn test_parse_minimal_listener() {
        let config = Config::parse(
            r#"
            [[listeners]]
            name = "ingress"

            [[listeners.routes]]
            name = "a"
            service = "svc-a"
            cluster = "cluster-a"
            "#,
        )
        .unwrap();

        let listener = config.listener("ingress").unwrap();
        assert_eq!(listener.downstream_protocol, Protocol::Http1);
        assert!(!listener.support_dynamic_route);
        assert_eq!(listener.routes[0].global_timeout_ms, 60_000);
        assert!(listener.routes[0].retry_policy.is_none());
        assert!(config.listener("missing").is_none());
    }

    #[test]
    fn test_parse_rejects_unknown_protocol() {
        let result = Config::parse(
            r#"
            [[listeners]]
            name = "ingress"
            downstream_protocol = "gopher"
            "#,
        );
        assert!(matches!(result, Err(MeshProxyError::Config(_))));
    }
}
