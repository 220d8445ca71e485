use super::policy::RoutePolicy;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Header carrying the target service identifier.
pub const SERVICE_HEADER: &str = "Service";
/// Lower-case spelling probed when `SERVICE_HEADER` is absent.
pub const SERVICE_HEADER_FALLBACK: &str = "service";

pub type Headers = HashMap<String, String>;

/// Maps a match key to a cluster name for dynamic routes.
pub type ClusterMapper = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Extract the service identifier, preferring `Service` over `service`.
/// An empty value counts as absent.
pub fn service_identifier(headers: &Headers) -> Option<&str> {
    headers
        .get(SERVICE_HEADER)
        .or_else(|| headers.get(SERVICE_HEADER_FALLBACK))
        .map(String::as_str)
        .filter(|s| !s.is_empty())
}

/// Outcome of matching one entry against request headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteMatch {
    Matched(String),
    /// A service identifier was found but the entry does not accept it.
    Mismatched(String),
    NoServiceKey,
}

impl RouteMatch {
    pub fn is_match(&self) -> bool {
        matches!(self, RouteMatch::Matched(_))
    }

    pub fn key(&self) -> &str {
        match self {
            RouteMatch::Matched(key) | RouteMatch::Mismatched(key) => key,
            RouteMatch::NoServiceKey => "",
        }
    }
}

/// Route for a single named service.
#[derive(Debug, Clone)]
pub struct StaticRoute {
    pub name: String,
    pub service: String,
    pub cluster: String,
    pub global_timeout: Duration,
    pub policy: Arc<RoutePolicy>,
}

impl StaticRoute {
    fn matches(&self, headers: &Headers) -> RouteMatch {
        match service_identifier(headers) {
            Some(service) if service == self.service => RouteMatch::Matched(service.to_string()),
            Some(service) => RouteMatch::Mismatched(service.to_string()),
            None => RouteMatch::NoServiceKey,
        }
    }
}

/// Catch-all route resolving the cluster from the service identifier.
#[derive(Clone)]
pub struct DynamicRoute {
    pub global_timeout: Duration,
    pub policy: Arc<RoutePolicy>,
    mapper: ClusterMapper,
}

impl DynamicRoute {
    /// Dynamic route whose cluster is the service identifier itself.
    pub fn new(global_timeout: Duration, policy: Arc<RoutePolicy>) -> Self {
        Self {
            global_timeout,
            policy,
            mapper: Arc::new(|key: &str| key.to_string()),
        }
    }

    pub fn with_cluster_mapper(mut self, mapper: ClusterMapper) -> Self {
        self.mapper = mapper;
        self
    }

    pub fn map_rule(&self, key: &str) -> String {
        (self.mapper)(key)
    }

    fn matches(&self, headers: &Headers) -> RouteMatch {
        match service_identifier(headers) {
            Some(service) => {
                debug!(service = service, "Matched dynamic route");
                RouteMatch::Matched(service.to_string())
            }
            None => RouteMatch::NoServiceKey,
        }
    }
}

impl fmt::Debug for DynamicRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicRoute")
            .field("global_timeout", &self.global_timeout)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// One rule of a route table.
#[derive(Debug, Clone)]
pub enum RouteEntry {
    Static(StaticRoute),
    Dynamic(DynamicRoute),
}

impl RouteEntry {
    /// Name used by add/remove; the dynamic route has none.
    pub fn name(&self) -> Option<&str> {
        match self {
            RouteEntry::Static(route) => Some(&route.name),
            RouteEntry::Dynamic(_) => None,
        }
    }

    pub fn matches(&self, headers: &Headers) -> RouteMatch {
        match self {
            RouteEntry::Static(route) => route.matches(headers),
            RouteEntry::Dynamic(route) => route.matches(headers),
        }
    }

    /// Cluster serving a request matched with `key`.
    pub fn cluster_name(&self, key: &str) -> String {
        match self {
            RouteEntry::Static(route) => route.cluster.clone(),
            RouteEntry::Dynamic(route) => route.map_rule(key),
        }
    }

    pub fn global_timeout(&self) -> Duration {
        match self {
            RouteEntry::Static(route) => route.global_timeout,
            RouteEntry::Dynamic(route) => route.global_timeout,
        }
    }

    pub fn policy(&self) -> &Arc<RoutePolicy> {
        match self {
            RouteEntry::Static(route) => &route.policy,
            RouteEntry::Dynamic(route) => &route.policy,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, RouteEntry::Dynamic(_))
    }
}
