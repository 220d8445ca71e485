use super::table::{new_routers, RouteTable};
use crate::stream::Protocol;
use crate::utils::error::{MeshProxyError, Result};
use dashmap::DashMap;
use std::any::Any;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Builds a route table from a protocol specific configuration object.
pub type RouterFactory = fn(&dyn Any) -> Result<RouteTable>;

/// Router factories keyed by downstream protocol.
pub struct RouterRegistry {
    factories: DashMap<Protocol, RouterFactory>,
}

impl RouterRegistry {
    pub fn new() -> Self {
        Self {
            factories: DashMap::new(),
        }
    }

    /// Registry with the basic factory installed for every known protocol.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        for protocol in Protocol::ALL {
            registry.register(protocol, new_routers);
        }
        registry
    }

    /// Register `factory` for `protocol`, replacing any previous one.
    pub fn register(&self, protocol: Protocol, factory: RouterFactory) {
        if self.factories.insert(protocol, factory).is_some() {
            debug!(protocol = %protocol, "Router factory replaced");
        } else {
            debug!(protocol = %protocol, "Router factory registered");
        }
    }

    pub fn factory(&self, protocol: Protocol) -> Option<RouterFactory> {
        self.factories.get(&protocol).map(|f| *f)
    }

    pub fn create(&self, protocol: Protocol, config: &dyn Any) -> Result<RouteTable> {
        let factory = self
            .factory(protocol)
            .ok_or(MeshProxyError::NoRouterFactory(protocol))?;
        factory(config)
    }

    pub fn protocols(&self) -> Vec<Protocol> {
        let mut protocols: Vec<Protocol> = self.factories.iter().map(|e| *e.key()).collect();
        protocols.sort_by_key(|p| p.as_str());
        protocols
    }
}

impl Default for RouterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RouterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterRegistry")
            .field("protocols", &self.protocols())
            .finish()
    }
}

static GLOBAL: OnceLock<Arc<RouterRegistry>> = OnceLock::new();

/// Install the process-wide registry; returns false if one is already set.
pub fn install_global(registry: RouterRegistry) -> bool {
    GLOBAL.set(Arc::new(registry)).is_ok()
}

pub fn global() -> Option<Arc<RouterRegistry>> {
    GLOBAL.get().cloned()
}
