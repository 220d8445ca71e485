// MeshProxy - routing and upstream connection pooling for a sidecar proxy

pub mod config;
pub mod router;
pub mod stream;
pub mod upstream;
pub mod utils;

// Re-export commonly used types
pub use utils::error::{MeshProxyError, Result};
