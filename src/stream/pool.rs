use super::client::{ActiveClient, ClientId, ClientState};
use super::types::{
    Cancellable, CodecClientFactory, ConnectionPool, PoolEventListener, PoolFailureReason,
    Protocol, StreamContext, StreamDecoder,
};
use crate::upstream::Host;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// State shared between the pool handle and the clients it creates.
pub(crate) struct PoolShared {
    host: Arc<Host>,
    factory: Arc<dyn CodecClientFactory>,
    /// Serializes client construction; never taken by the event path.
    init: Mutex<()>,
    client: RwLock<Option<Arc<ActiveClient>>>,
    initializations: AtomicU64,
}

impl PoolShared {
    /// Forget the current client, but only if it is still `id`.
    pub(crate) fn release_client(&self, id: ClientId) {
        let released = {
            let mut slot = self.client.write();
            match slot.as_ref() {
                Some(current) if current.id() == id => slot.take(),
                _ => None,
            }
        };

        // Dropped outside the lock: tearing down the codec may raise more events.
        match released {
            Some(_) => debug!(client = %id, host = self.host.address(), "Released upstream client"),
            None => trace!(client = %id, host = self.host.address(), "Ignoring event from stale client"),
        }
    }
}

/// Connection pool keeping one upstream connection per host.
///
/// The first `new_stream` builds the connection; later calls reuse it
/// until a close event or `close()` forgets it.
#[derive(Clone)]
pub struct ConnPool {
    shared: Arc<PoolShared>,
}

impl ConnPool {
    pub fn new(host: Arc<Host>, factory: Arc<dyn CodecClientFactory>) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                host,
                factory,
                init: Mutex::new(()),
                client: RwLock::new(None),
                initializations: AtomicU64::new(0),
            }),
        }
    }

    pub fn host(&self) -> &Arc<Host> {
        &self.shared.host
    }

    /// The client currently backing the pool, if any.
    pub fn active_client(&self) -> Option<Arc<ActiveClient>> {
        self.shared.client.read().clone()
    }

    /// State of the current client; `Uninitialized` when there is none.
    pub fn client_state(&self) -> ClientState {
        self.active_client()
            .map(|c| c.state())
            .unwrap_or(ClientState::Uninitialized)
    }

    /// How many clients this pool has constructed so far.
    pub fn initializations(&self) -> u64 {
        self.shared.initializations.load(Ordering::Acquire)
    }

    fn client_or_init(&self, ctx: &StreamContext) -> Arc<ActiveClient> {
        if let Some(client) = self.active_client() {
            return client;
        }

        let _init = self.shared.init.lock();
        if let Some(client) = self.active_client() {
            return client;
        }

        let client = Arc::new(ActiveClient::connect(
            ctx,
            Arc::downgrade(&self.shared),
            Arc::clone(&self.shared.host),
            self.shared.factory.as_ref(),
        ));
        self.shared.initializations.fetch_add(1, Ordering::AcqRel);

        // The close path marks the client Closed before it takes this lock,
        // so a close either shows up here or finds the client in the slot.
        let cached = {
            let mut slot = self.shared.client.write();
            let open = client.state() != ClientState::Closed;
            if open {
                *slot = Some(Arc::clone(&client));
            }
            open
        };

        if !cached {
            warn!(
                client = %client.id(),
                host = self.shared.host.address(),
                "Upstream client closed during setup, not caching it"
            );
        }

        client
    }
}

impl ConnectionPool for ConnPool {
    fn protocol(&self) -> Protocol {
        self.shared.factory.protocol()
    }

    fn new_stream(
        &self,
        ctx: &StreamContext,
        stream_id: &str,
        response_decoder: Arc<dyn StreamDecoder>,
        listener: &dyn PoolEventListener,
    ) -> Option<Box<dyn Cancellable>> {
        let client = self.client_or_init(ctx);
        let host = &self.shared.host;

        if !host
            .cluster_info()
            .resource_manager()
            .requests()
            .try_increase()
        {
            listener.on_pool_failure(stream_id, PoolFailureReason::Overflow, None);
            host.for_each_stats(|s| s.upstream_request_pending_overflow.inc(1));
            warn!(
                stream_id = stream_id,
                host = host.address(),
                cluster = host.cluster_info().name(),
                "Upstream request rejected, pool overflow"
            );
            return None;
        }

        host.for_each_stats(|s| {
            s.upstream_request_total.inc(1);
            s.upstream_request_active.inc(1);
        });

        let encoder = client.new_stream(stream_id, response_decoder);
        trace!(stream_id = stream_id, client = %client.id(), "Upstream stream opened");
        listener.on_pool_ready(stream_id, encoder, host);

        None
    }

    fn drain_connections(&self) {}

    fn close(&self) {
        let forgotten = self.shared.client.write().take();
        if let Some(client) = forgotten {
            debug!(client = %client.id(), host = self.shared.host.address(), "Connection pool closed");
        }
    }
}
