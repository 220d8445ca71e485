use super::resource::ResourceManager;
use super::stats::{StatsScope, UpstreamStats};
use crate::config::ClusterConfig;
use std::sync::Arc;

/// Static facts and shared state of an upstream cluster.
#[derive(Debug)]
pub struct ClusterInfo {
    name: String,
    stats: Arc<UpstreamStats>,
    resource_manager: ResourceManager,
}

impl ClusterInfo {
    pub fn new(name: impl Into<String>, max_requests: u64) -> Self {
        Self::with_resource_manager(name, ResourceManager::new(max_requests))
    }

    pub fn with_resource_manager(name: impl Into<String>, resource_manager: ResourceManager) -> Self {
        let name = name.into();
        Self {
            stats: Arc::new(UpstreamStats::new(StatsScope::Cluster, &name)),
            name,
            resource_manager,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> &Arc<UpstreamStats> {
        &self.stats
    }

    pub fn resource_manager(&self) -> &ResourceManager {
        &self.resource_manager
    }
}

/// A single upstream endpoint.
#[derive(Debug)]
pub struct Host {
    address: String,
    hostname: String,
    stats: UpstreamStats,
    cluster: Arc<ClusterInfo>,
}

impl Host {
    pub fn new(address: impl Into<String>, cluster: Arc<ClusterInfo>) -> Self {
        let address = address.into();
        Self {
            stats: UpstreamStats::new(StatsScope::Host, &address),
            hostname: address.clone(),
            address,
            cluster,
        }
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn host_stats(&self) -> &UpstreamStats {
        &self.stats
    }

    pub fn cluster_info(&self) -> &Arc<ClusterInfo> {
        &self.cluster
    }

    /// Apply `f` to the host counters, then to the cluster counters.
    #[inline]
    pub fn for_each_stats(&self, f: impl Fn(&UpstreamStats)) {
        f(&self.stats);
        f(self.cluster.stats());
    }
}

/// A cluster and the hosts that belong to it.
#[derive(Debug, Clone)]
pub struct Cluster {
    pub info: Arc<ClusterInfo>,
    pub hosts: Vec<Arc<Host>>,
}

impl Cluster {
    pub fn from_config(config: &ClusterConfig) -> Self {
        let info = Arc::new(ClusterInfo::new(&config.name, config.max_requests));
        let hosts = config
            .hosts
            .iter()
            .map(|h| {
                let host = Host::new(&h.address, Arc::clone(&info));
                Arc::new(match &h.hostname {
                    Some(name) => host.with_hostname(name),
                    None => host,
                })
            })
            .collect();

        Self { info, hosts }
    }
}
