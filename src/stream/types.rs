use crate::upstream::{Host, UpstreamStats};
use crate::utils::error::MeshProxyError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Application protocols a listener or upstream can speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    SofaRpc,
    Http1,
    Http2,
}

impl Protocol {
    pub const ALL: [Protocol; 3] = [Protocol::SofaRpc, Protocol::Http1, Protocol::Http2];

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::SofaRpc => "sofarpc",
            Protocol::Http1 => "http1",
            Protocol::Http2 => "http2",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = MeshProxyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Protocol::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| MeshProxyError::UnknownProtocol(s.to_string()))
    }
}

/// Events raised by the transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    RemoteClose,
    LocalClose,
    OnReadErrClose,
    OnWriteErrClose,
    ConnectTimeout,
    ConnectFailed,
}

impl ConnectionEvent {
    /// Whether the event ends the connection.
    pub fn is_close(&self) -> bool {
        matches!(
            self,
            ConnectionEvent::RemoteClose
                | ConnectionEvent::LocalClose
                | ConnectionEvent::OnReadErrClose
                | ConnectionEvent::OnWriteErrClose
        )
    }
}

/// Why a request stream was reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamResetReason {
    ConnectionTermination,
    ConnectionFailed,
    LocalReset,
    RemoteReset,
}

/// Why a pool could not hand out a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum PoolFailureReason {
    Overflow,
}

impl fmt::Display for PoolFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolFailureReason::Overflow => f.write_str("overflow"),
        }
    }
}

/// Request-scoped values handed down to the codec layer.
#[derive(Debug, Clone, Default)]
pub struct StreamContext {
    values: HashMap<String, String>,
}

impl StreamContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

/// Counters are signed; byte counts beyond `i64::MAX` saturate.
fn delta(bytes: u64) -> i64 {
    i64::try_from(bytes).unwrap_or(i64::MAX)
}

/// Byte counters a codec connection reports its traffic into.
#[derive(Debug, Clone)]
pub struct ConnectionStats {
    stats: Arc<UpstreamStats>,
}

impl ConnectionStats {
    pub fn new(stats: Arc<UpstreamStats>) -> Self {
        Self { stats }
    }

    pub fn record_read(&self, bytes: u64) {
        self.stats.upstream_bytes_read.inc(delta(bytes));
        self.stats.upstream_bytes_read_current.inc(delta(bytes));
    }

    pub fn consume_read(&self, bytes: u64) {
        self.stats.upstream_bytes_read_current.dec(delta(bytes));
    }

    pub fn record_write(&self, bytes: u64) {
        self.stats.upstream_bytes_write.inc(delta(bytes));
        self.stats.upstream_bytes_write_current.inc(delta(bytes));
    }

    pub fn consume_write(&self, bytes: u64) {
        self.stats.upstream_bytes_write_current.dec(delta(bytes));
    }
}

/// Sending half of a request stream.
pub trait StreamEncoder: Send + Sync {
    fn stream_id(&self) -> &str;
    fn append_headers(&self, headers: HashMap<String, String>, end_stream: bool);
    fn append_data(&self, data: &[u8], end_stream: bool);
}

/// Receiving half of a request stream, supplied by the caller.
pub trait StreamDecoder: Send + Sync {
    fn on_decode_headers(&self, headers: HashMap<String, String>, end_stream: bool);
    fn on_decode_data(&self, data: &[u8], end_stream: bool);
}

/// Outcome notifications for `ConnectionPool::new_stream`.
pub trait PoolEventListener: Send + Sync {
    fn on_pool_failure(&self, stream_id: &str, reason: PoolFailureReason, host: Option<&Arc<Host>>);
    fn on_pool_ready(&self, stream_id: &str, encoder: Arc<dyn StreamEncoder>, host: &Arc<Host>);
}

/// Handle that aborts a pending pool request.
pub trait Cancellable: Send + Sync {
    fn cancel(&self);
}

/// Transport-level notifications.
pub trait ConnectionCallbacks: Send + Sync {
    fn on_event(&self, event: ConnectionEvent);
    fn on_above_write_buffer_high_watermark(&self);
    fn on_below_write_buffer_low_watermark(&self);
}

/// Per-stream notifications from the codec client.
pub trait CodecClientCallbacks: Send + Sync {
    fn on_stream_destroy(&self);
    fn on_stream_reset(&self, reason: StreamResetReason);
}

/// Connection-wide notifications from the codec.
pub trait StreamConnectionCallbacks: Send + Sync {
    fn on_go_away(&self);
}

/// A codec-level connection to one upstream host.
pub trait CodecClient: Send + Sync {
    fn new_stream(&self, stream_id: &str, response_decoder: Arc<dyn StreamDecoder>) -> Arc<dyn StreamEncoder>;
    fn add_connection_callbacks(&self, callbacks: Arc<dyn ConnectionCallbacks>);
    fn set_codec_client_callbacks(&self, callbacks: Arc<dyn CodecClientCallbacks>);
    fn set_codec_connection_callbacks(&self, callbacks: Arc<dyn StreamConnectionCallbacks>);
    fn set_connection_stats(&self, stats: ConnectionStats);
    fn close(&self);
}

/// Builds codec connections. May block while the connection is set up.
pub trait CodecClientFactory: Send + Sync {
    fn protocol(&self) -> Protocol;
    fn create_client(&self, ctx: &StreamContext, host: &Arc<Host>) -> Box<dyn CodecClient>;
}

/// Upstream connection pool bound to a single host.
pub trait ConnectionPool: Send + Sync {
    fn protocol(&self) -> Protocol;

    fn new_stream(
        &self,
        ctx: &StreamContext,
        stream_id: &str,
        response_decoder: Arc<dyn StreamDecoder>,
        listener: &dyn PoolEventListener,
    ) -> Option<Box<dyn Cancellable>>;

    fn drain_connections(&self);

    fn close(&self);
}
