pub mod host;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod resource;
pub mod stats;

pub use host::{Cluster, ClusterInfo, Host};
pub use resource::{Resource, ResourceLimit, ResourceManager};
pub use stats::{Counter, StatsScope, UpstreamStats};
