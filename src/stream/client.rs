use super::pool::PoolShared;
use super::types::{
    CodecClient, CodecClientCallbacks, CodecClientFactory, ConnectionCallbacks, ConnectionEvent,
    ConnectionStats, Protocol, StreamConnectionCallbacks, StreamContext, StreamDecoder,
    StreamEncoder, StreamResetReason,
};
use crate::upstream::Host;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use tracing::{debug, trace, warn};

/// Global counter for client IDs; only uniqueness matters.
static CLIENT_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier of an `ActiveClient`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

impl ClientId {
    fn next() -> Self {
        Self(CLIENT_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Lifecycle of a pooled upstream connection.
///
/// ```text
/// Uninitialized -> Initializing -> Active -> Closed
/// ```
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Uninitialized = 0,
    Initializing = 1,
    Active = 2,
    Closed = 3,
}

impl From<u8> for ClientState {
    fn from(val: u8) -> Self {
        match val {
            1 => ClientState::Initializing,
            2 => ClientState::Active,
            3 => ClientState::Closed,
            _ => ClientState::Uninitialized,
        }
    }
}

/// Everything the codec layer can tell a client about, as one closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientEvent {
    Connection(ConnectionEvent),
    StreamDestroy,
    StreamReset(StreamResetReason),
    GoAway,
    AboveWriteBufferHighWatermark,
    BelowWriteBufferLowWatermark,
}

/// State reachable from the codec callbacks.
///
/// Kept apart from `ActiveClient` so the codec connection, which holds the
/// callbacks, never owns the client that owns it.
pub(crate) struct ClientShared {
    id: ClientId,
    pool: Weak<PoolShared>,
    host: Arc<Host>,
    state: AtomicU8,
    closed_with_active_request: AtomicBool,
    active_streams: AtomicU64,
    total_streams: AtomicU64,
    connection: OnceLock<Weak<dyn CodecClient>>,
}

impl ClientShared {
    fn state(&self) -> ClientState {
        ClientState::from(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ClientState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn has_active_request(&self) -> bool {
        self.closed_with_active_request.load(Ordering::Acquire)
            || self.active_streams.load(Ordering::Acquire) > 0
    }

    fn dispatch(&self, event: ClientEvent) {
        trace!(client = %self.id, event = ?event, "Client event");

        match event {
            ClientEvent::Connection(event) => self.on_connection_event(event),
            ClientEvent::StreamDestroy => self.on_stream_destroy(),
            ClientEvent::StreamReset(reason) => self.on_stream_reset(reason),
            ClientEvent::GoAway => self.on_go_away(),
            ClientEvent::AboveWriteBufferHighWatermark
            | ClientEvent::BelowWriteBufferLowWatermark => {}
        }
    }

    fn on_connection_event(&self, event: ConnectionEvent) {
        let host = &self.host;

        if event.is_close() {
            if self.has_active_request() {
                match event {
                    ConnectionEvent::LocalClose => host.for_each_stats(|s| {
                        s.upstream_connection_local_close_with_active_request.inc(1)
                    }),
                    ConnectionEvent::RemoteClose => host.for_each_stats(|s| {
                        s.upstream_connection_remote_close_with_active_request.inc(1)
                    }),
                    _ => {}
                }
            }

            let previous = self.state.swap(ClientState::Closed as u8, Ordering::AcqRel);
            if ClientState::from(previous) != ClientState::Closed {
                host.for_each_stats(|s| s.upstream_connection_active.dec(1));
            }

            if let Some(pool) = self.pool.upgrade() {
                pool.release_client(self.id);
            }

            debug!(client = %self.id, host = host.address(), event = ?event, "Upstream connection closed");
        } else if event == ConnectionEvent::ConnectTimeout {
            host.for_each_stats(|s| s.upstream_request_timeout.inc(1));
            warn!(client = %self.id, host = host.address(), "Upstream connect timeout, closing connection");

            if let Some(connection) = self.connection.get().and_then(Weak::upgrade) {
                connection.close();
            }
        } else if event == ConnectionEvent::ConnectFailed {
            host.for_each_stats(|s| s.upstream_connection_con_fail.inc(1));
            warn!(client = %self.id, host = host.address(), "Upstream connect failed");
        }
    }

    fn on_stream_destroy(&self) {
        let _ = self
            .active_streams
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| v.checked_sub(1));

        self.host.for_each_stats(|s| s.upstream_request_active.dec(1));
        self.host
            .cluster_info()
            .resource_manager()
            .requests()
            .decrease();
    }

    fn on_stream_reset(&self, reason: StreamResetReason) {
        match reason {
            StreamResetReason::ConnectionTermination | StreamResetReason::ConnectionFailed => {
                self.host
                    .for_each_stats(|s| s.upstream_request_failure_eject.inc(1));
                self.closed_with_active_request.store(true, Ordering::Release);
            }
            StreamResetReason::LocalReset => {
                self.host.for_each_stats(|s| s.upstream_request_local_reset.inc(1));
            }
            StreamResetReason::RemoteReset => {
                self.host.for_each_stats(|s| s.upstream_request_remote_reset.inc(1));
            }
        }
    }

    fn on_go_away(&self) {
        // Single-connection pools have no primary to drain towards.
        self.host
            .for_each_stats(|s| s.upstream_connection_close_notify.inc(1));
    }
}

/// Listener object registered with the codec connection.
pub struct ClientCallbacks {
    shared: Arc<ClientShared>,
}

impl ConnectionCallbacks for ClientCallbacks {
    fn on_event(&self, event: ConnectionEvent) {
        self.shared.dispatch(ClientEvent::Connection(event));
    }

    fn on_above_write_buffer_high_watermark(&self) {
        self.shared.dispatch(ClientEvent::AboveWriteBufferHighWatermark);
    }

    fn on_below_write_buffer_low_watermark(&self) {
        self.shared.dispatch(ClientEvent::BelowWriteBufferLowWatermark);
    }
}

impl CodecClientCallbacks for ClientCallbacks {
    fn on_stream_destroy(&self) {
        self.shared.dispatch(ClientEvent::StreamDestroy);
    }

    fn on_stream_reset(&self, reason: StreamResetReason) {
        self.shared.dispatch(ClientEvent::StreamReset(reason));
    }
}

impl StreamConnectionCallbacks for ClientCallbacks {
    fn on_go_away(&self) {
        self.shared.dispatch(ClientEvent::GoAway);
    }
}

/// The live connection behind a pool.
pub struct ActiveClient {
    shared: Arc<ClientShared>,
    connection: Arc<dyn CodecClient>,
}

impl ActiveClient {
    /// Build the codec connection and wire its callbacks back to this client.
    pub(crate) fn connect(
        ctx: &StreamContext,
        pool: Weak<PoolShared>,
        host: Arc<Host>,
        factory: &dyn CodecClientFactory,
    ) -> Self {
        let shared = Arc::new(ClientShared {
            id: ClientId::next(),
            pool,
            host: Arc::clone(&host),
            state: AtomicU8::new(ClientState::Initializing as u8),
            closed_with_active_request: AtomicBool::new(false),
            active_streams: AtomicU64::new(0),
            total_streams: AtomicU64::new(0),
            connection: OnceLock::new(),
        });

        let connection: Arc<dyn CodecClient> = Arc::from(factory.create_client(ctx, &host));
        let _ = shared.connection.set(Arc::downgrade(&connection));

        let callbacks = Arc::new(ClientCallbacks {
            shared: Arc::clone(&shared),
        });
        connection.add_connection_callbacks(callbacks.clone());
        connection.set_codec_client_callbacks(callbacks.clone());
        connection.set_codec_connection_callbacks(callbacks);

        let protocol = factory.protocol();
        host.for_each_stats(|s| {
            s.upstream_connection_total.inc(1);
            s.upstream_connection_active.inc(1);
            match protocol {
                Protocol::Http1 => s.upstream_connection_total_http1.inc(1),
                Protocol::Http2 => s.upstream_connection_total_http2.inc(1),
                Protocol::SofaRpc => {}
            }
        });

        connection.set_connection_stats(ConnectionStats::new(Arc::clone(
            host.cluster_info().stats(),
        )));

        // A close delivered while wiring up already moved the client to Closed.
        let _ = shared.state.compare_exchange(
            ClientState::Initializing as u8,
            ClientState::Active as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );

        debug!(
            client = %shared.id,
            host = host.address(),
            protocol = %protocol,
            "Upstream client created"
        );

        Self { shared, connection }
    }

    pub fn id(&self) -> ClientId {
        self.shared.id
    }

    pub fn state(&self) -> ClientState {
        self.shared.state()
    }

    pub fn closed_with_active_request(&self) -> bool {
        self.shared.closed_with_active_request.load(Ordering::Acquire)
    }

    pub fn active_streams(&self) -> u64 {
        self.shared.active_streams.load(Ordering::Acquire)
    }

    pub fn total_streams(&self) -> u64 {
        self.shared.total_streams.load(Ordering::Acquire)
    }

    pub(crate) fn new_stream(
        &self,
        stream_id: &str,
        response_decoder: Arc<dyn StreamDecoder>,
    ) -> Arc<dyn StreamEncoder> {
        self.shared.active_streams.fetch_add(1, Ordering::AcqRel);
        self.shared.total_streams.fetch_add(1, Ordering::AcqRel);
        self.connection.new_stream(stream_id, response_decoder)
    }

    /// Deliver an event as if it came from the codec layer.
    pub fn handle_event(&self, event: ClientEvent) {
        self.shared.dispatch(event);
    }

    pub fn on_event(&self, event: ConnectionEvent) {
        self.handle_event(ClientEvent::Connection(event));
    }

    pub fn on_stream_destroy(&self) {
        self.handle_event(ClientEvent::StreamDestroy);
    }

    pub fn on_stream_reset(&self, reason: StreamResetReason) {
        self.handle_event(ClientEvent::StreamReset(reason));
    }

    pub fn on_go_away(&self) {
        self.handle_event(ClientEvent::GoAway);
    }

    pub fn on_above_write_buffer_high_watermark(&self) {
        self.handle_event(ClientEvent::AboveWriteBufferHighWatermark);
    }

    pub fn on_below_write_buffer_low_watermark(&self) {
        self.handle_event(ClientEvent::BelowWriteBufferLowWatermark);
    }
}

impl fmt::Debug for ActiveClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveClient")
            .field("id", &self.shared.id)
            .field("host", &self.shared.host.address())
            .field("state", &self.state())
            .field("active_streams", &self.active_streams())
            .finish()
    }
}
