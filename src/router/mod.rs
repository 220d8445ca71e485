pub mod entry;
pub mod policy;
pub mod registry;
pub mod table;
pub mod watcher;

pub use entry::{
    service_identifier, ClusterMapper, DynamicRoute, Headers, RouteEntry, RouteMatch,
    StaticRoute, SERVICE_HEADER, SERVICE_HEADER_FALLBACK,
};
pub use policy::{RetryPolicy, RoutePolicy, DEFAULT_GLOBAL_TIMEOUT};
pub use registry::{RouterFactory, RouterRegistry};
pub use table::{new_routers, RouteResult, RouteTable};
pub use watcher::{reload_tables, RouteTables, RouteWatcher};
