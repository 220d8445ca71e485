use super::entry::{service_identifier, DynamicRoute, Headers, RouteEntry, RouteMatch, StaticRoute};
use super::policy::{RetryPolicy, RoutePolicy, DEFAULT_GLOBAL_TIMEOUT};
use crate::config::ProxyConfig;
use crate::utils::error::{MeshProxyError, Result};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[cfg(feature = "metrics")]
use crate::upstream::metrics::RouteMetrics;

/// Outcome of a table lookup.
#[derive(Debug, Clone)]
pub struct RouteResult {
    pub entry: Option<Arc<RouteEntry>>,
    /// Service identifier the entry matched on; empty when nothing matched.
    pub match_key: String,
}

impl RouteResult {
    fn miss() -> Self {
        Self {
            entry: None,
            match_key: String::new(),
        }
    }

    pub fn is_match(&self) -> bool {
        self.entry.is_some()
    }

    pub fn cluster_name(&self) -> Option<String> {
        self.entry
            .as_ref()
            .map(|entry| entry.cluster_name(&self.match_key))
    }
}

/// Ordered routing rules of one listener; the first matching entry wins.
pub struct RouteTable {
    name: String,
    entries: RwLock<Vec<Arc<RouteEntry>>>,
}

impl RouteTable {
    pub fn new(name: impl Into<String>, entries: Vec<RouteEntry>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(entries.into_iter().map(Arc::new).collect()),
        }
    }

    /// Build the table of a listener
    pub fn from_config(config: &ProxyConfig) -> Self {
        let entries = Self::compile_config(config);

        info!(
            listener = %config.name,
            routes = entries.len(),
            dynamic = config.support_dynamic_route,
            "Route table built"
        );

        Self::new(&config.name, entries)
    }

    fn compile_config(config: &ProxyConfig) -> Vec<RouteEntry> {
        let mut entries: Vec<RouteEntry> = config
            .routes
            .iter()
            .map(|route| {
                let retry = route
                    .retry_policy
                    .as_ref()
                    .map(RetryPolicy::from)
                    .unwrap_or_default();

                RouteEntry::Static(StaticRoute {
                    name: route.name.clone(),
                    service: route.service.clone(),
                    cluster: route.cluster.clone(),
                    global_timeout: Duration::from_millis(route.global_timeout_ms),
                    policy: RoutePolicy::shared(retry),
                })
            })
            .collect();

        if config.support_dynamic_route {
            let (global_timeout, policy) = inherited_defaults(entries.first());
            entries.push(RouteEntry::Dynamic(DynamicRoute::new(global_timeout, policy)));
        }

        entries
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolve request headers to the first matching entry
    pub async fn route(&self, headers: &Headers) -> RouteResult {
        let entries = self.entries.read().await;

        for entry in entries.iter() {
            if let RouteMatch::Matched(key) = entry.matches(headers) {
                debug!(
                    listener = %self.name,
                    service = %key,
                    route = entry.name().unwrap_or("<dynamic>"),
                    "Route matched"
                );

                #[cfg(feature = "metrics")]
                RouteMetrics::record_hit(&self.name);

                return RouteResult {
                    entry: Some(Arc::clone(entry)),
                    match_key: key,
                };
            }
        }

        debug!(
            listener = %self.name,
            service = service_identifier(headers).unwrap_or(""),
            "No route matched"
        );

        #[cfg(feature = "metrics")]
        RouteMetrics::record_miss(&self.name);

        RouteResult::miss()
    }

    /// Append a static route serving `name`, unless one already exists.
    ///
    /// The new entry takes the global timeout of the first entry and shares
    /// its policy handle.
    pub async fn add_router(&self, name: &str) {
        let mut entries = self.entries.write().await;

        if entries.iter().any(|e| e.name() == Some(name)) {
            debug!(listener = %self.name, route = name, "Route already present");
            return;
        }

        let (global_timeout, policy) = inherited_defaults(entries.first().map(|e| &**e));
        entries.push(Arc::new(RouteEntry::Static(StaticRoute {
            name: name.to_string(),
            service: name.to_string(),
            cluster: name.to_string(),
            global_timeout,
            policy,
        })));

        debug!(listener = %self.name, route = name, total = entries.len(), "Route added");
    }

    /// Remove the first entry named `name`
    pub async fn del_router(&self, name: &str) {
        let mut entries = self.entries.write().await;

        if let Some(index) = entries.iter().position(|e| e.name() == Some(name)) {
            entries.remove(index);
            debug!(listener = %self.name, route = name, total = entries.len(), "Route removed");
        }
    }

    /// Replace every entry with the rules of `config`
    pub async fn reload(&self, config: &ProxyConfig) -> Result<()> {
        config.validate()?;
        let compiled = Self::compile_config(config);

        let mut entries = self.entries.write().await;
        *entries = compiled.into_iter().map(Arc::new).collect();

        info!(listener = %self.name, routes = entries.len(), "Route table reloaded");

        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Names of the static entries in match order
    pub async fn names(&self) -> Vec<String> {
        self.entries
            .read()
            .await
            .iter()
            .filter_map(|e| e.name().map(str::to_string))
            .collect()
    }

    /// Snapshot of the entries in match order
    pub async fn entries(&self) -> Vec<Arc<RouteEntry>> {
        self.entries.read().await.clone()
    }
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteTable")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

fn inherited_defaults(first: Option<&RouteEntry>) -> (Duration, Arc<RoutePolicy>) {
    match first {
        Some(entry) => (entry.global_timeout(), Arc::clone(entry.policy())),
        None => (
            DEFAULT_GLOBAL_TIMEOUT,
            RoutePolicy::shared(RetryPolicy::default()),
        ),
    }
}

/// Basic router factory: builds a table from a `ProxyConfig`.
pub fn new_routers(config: &dyn Any) -> Result<RouteTable> {
    let config = config.downcast_ref::<ProxyConfig>().ok_or_else(|| {
        MeshProxyError::InvalidConfiguration("expected a proxy configuration".to_string())
    })?;

    Ok(RouteTable::from_config(config))
}
