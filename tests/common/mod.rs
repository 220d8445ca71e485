//! Codec layer stand-ins shared by the pool integration tests.

#![allow(dead_code)]

use meshproxy::stream::{
    CodecClient, CodecClientCallbacks, CodecClientFactory, ConnectionCallbacks, ConnectionEvent,
    ConnectionStats, PoolEventListener, PoolFailureReason, Protocol, StreamConnectionCallbacks,
    StreamContext, StreamDecoder, StreamEncoder, StreamResetReason,
};
use meshproxy::upstream::{ClusterInfo, Host};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub fn host(cluster: &str, max_requests: u64) -> Arc<Host> {
    let info = Arc::new(ClusterInfo::new(cluster, max_requests));
    Arc::new(Host::new(format!("{}-host:8080", cluster), info))
}

/// Test side of one codec connection: records what the pool registered and
/// lets the test raise events through it.
#[derive(Default)]
pub struct MockConnection {
    connection_callbacks: Mutex<Vec<Arc<dyn ConnectionCallbacks>>>,
    client_callbacks: Mutex<Option<Arc<dyn CodecClientCallbacks>>>,
    stream_callbacks: Mutex<Option<Arc<dyn StreamConnectionCallbacks>>>,
    stats: Mutex<Option<ConnectionStats>>,
    streams: Mutex<Vec<String>>,
    closed: AtomicBool,
    close_on_register: bool,
}

impl MockConnection {
    pub fn raise(&self, event: ConnectionEvent) {
        let callbacks = self.connection_callbacks.lock().clone();
        for cb in callbacks {
            cb.on_event(event);
        }
    }

    pub fn destroy_stream(&self) {
        let cb = self.client_callbacks.lock().clone();
        if let Some(cb) = cb {
            cb.on_stream_destroy();
        }
    }

    pub fn reset_stream(&self, reason: StreamResetReason) {
        let cb = self.client_callbacks.lock().clone();
        if let Some(cb) = cb {
            cb.on_stream_reset(reason);
        }
    }

    pub fn go_away(&self) {
        let cb = self.stream_callbacks.lock().clone();
        if let Some(cb) = cb {
            cb.on_go_away();
        }
    }

    pub fn high_watermark(&self) {
        let callbacks = self.connection_callbacks.lock().clone();
        for cb in callbacks {
            cb.on_above_write_buffer_high_watermark();
            cb.on_below_write_buffer_low_watermark();
        }
    }

    pub fn stats(&self) -> Option<ConnectionStats> {
        self.stats.lock().clone()
    }

    pub fn streams(&self) -> Vec<String> {
        self.streams.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn has_all_callbacks(&self) -> bool {
        !self.connection_callbacks.lock().is_empty()
            && self.client_callbacks.lock().is_some()
            && self.stream_callbacks.lock().is_some()
    }
}

struct MockCodecClient {
    conn: Arc<MockConnection>,
}

impl CodecClient for MockCodecClient {
    fn new_stream(&self, stream_id: &str, _decoder: Arc<dyn StreamDecoder>) -> Arc<dyn StreamEncoder> {
        self.conn.streams.lock().push(stream_id.to_string());
        Arc::new(MockEncoder {
            id: stream_id.to_string(),
        })
    }

    fn add_connection_callbacks(&self, callbacks: Arc<dyn ConnectionCallbacks>) {
        self.conn.connection_callbacks.lock().push(callbacks);
        if self.conn.close_on_register {
            self.conn.raise(ConnectionEvent::RemoteClose);
        }
    }

    fn set_codec_client_callbacks(&self, callbacks: Arc<dyn CodecClientCallbacks>) {
        *self.conn.client_callbacks.lock() = Some(callbacks);
    }

    fn set_codec_connection_callbacks(&self, callbacks: Arc<dyn StreamConnectionCallbacks>) {
        *self.conn.stream_callbacks.lock() = Some(callbacks);
    }

    fn set_connection_stats(&self, stats: ConnectionStats) {
        *self.conn.stats.lock() = Some(stats);
    }

    fn close(&self) {
        if !self.conn.closed.swap(true, Ordering::AcqRel) {
            self.conn.raise(ConnectionEvent::LocalClose);
        }
    }
}

pub struct MockEncoder {
    id: String,
}

impl StreamEncoder for MockEncoder {
    fn stream_id(&self) -> &str {
        &self.id
    }

    fn append_headers(&self, _headers: HashMap<String, String>, _end_stream: bool) {}

    fn append_data(&self, _data: &[u8], _end_stream: bool) {}
}

pub struct NullDecoder;

impl StreamDecoder for NullDecoder {
    fn on_decode_headers(&self, _headers: HashMap<String, String>, _end_stream: bool) {}

    fn on_decode_data(&self, _data: &[u8], _end_stream: bool) {}
}

pub fn decoder() -> Arc<dyn StreamDecoder> {
    Arc::new(NullDecoder)
}

pub struct MockFactory {
    protocol: Protocol,
    connect_delay: Option<Duration>,
    close_on_register: AtomicBool,
    created: Mutex<Vec<Arc<MockConnection>>>,
}

impl MockFactory {
    pub fn new(protocol: Protocol) -> Arc<Self> {
        Arc::new(Self {
            protocol,
            connect_delay: None,
            close_on_register: AtomicBool::new(false),
            created: Mutex::new(Vec::new()),
        })
    }

    pub fn slow(protocol: Protocol, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            protocol,
            connect_delay: Some(delay),
            close_on_register: AtomicBool::new(false),
            created: Mutex::new(Vec::new()),
        })
    }

    /// Make the next connections close while the pool wires them up.
    pub fn close_during_setup(&self, enabled: bool) {
        self.close_on_register.store(enabled, Ordering::Release);
    }

    pub fn created(&self) -> usize {
        self.created.lock().len()
    }

    pub fn connection(&self, index: usize) -> Arc<MockConnection> {
        Arc::clone(&self.created.lock()[index])
    }
}

impl CodecClientFactory for MockFactory {
    fn protocol(&self) -> Protocol {
        self.protocol
    }

    fn create_client(&self, _ctx: &StreamContext, _host: &Arc<Host>) -> Box<dyn CodecClient> {
        if let Some(delay) = self.connect_delay {
            std::thread::sleep(delay);
        }

        let conn = Arc::new(MockConnection {
            close_on_register: self.close_on_register.load(Ordering::Acquire),
            ..MockConnection::default()
        });
        self.created.lock().push(Arc::clone(&conn));

        Box::new(MockCodecClient { conn })
    }
}

#[derive(Default)]
pub struct RecordingListener {
    ready: Mutex<Vec<String>>,
    failures: Mutex<Vec<(String, PoolFailureReason, bool)>>,
}

impl RecordingListener {
    pub fn ready(&self) -> Vec<String> {
        self.ready.lock().clone()
    }

    /// `(stream_id, reason, host_supplied)` per failure.
    pub fn failures(&self) -> Vec<(String, PoolFailureReason, bool)> {
        self.failures.lock().clone()
    }
}

impl PoolEventListener for RecordingListener {
    fn on_pool_failure(&self, stream_id: &str, reason: PoolFailureReason, host: Option<&Arc<Host>>) {
        self.failures
            .lock()
            .push((stream_id.to_string(), reason, host.is_some()));
    }

    fn on_pool_ready(&self, stream_id: &str, encoder: Arc<dyn StreamEncoder>, _host: &Arc<Host>) {
        assert_eq!(encoder.stream_id(), stream_id);
        self.ready.lock().push(stream_id.to_string());
    }
}
