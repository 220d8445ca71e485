//! Upstream stream plumbing: the codec-facing contracts and the
//! single-connection pool built on top of them.

pub mod client;
pub mod pool;
pub mod types;

pub use client::{ActiveClient, ClientCallbacks, ClientEvent, ClientId, ClientState};
pub use pool::ConnPool;
pub use types::{
    Cancellable, CodecClient, CodecClientCallbacks, CodecClientFactory, ConnectionCallbacks,
    ConnectionEvent, ConnectionPool, ConnectionStats, PoolEventListener, PoolFailureReason,
    Protocol, StreamConnectionCallbacks, StreamContext, StreamDecoder, StreamEncoder,
    StreamResetReason,
};
