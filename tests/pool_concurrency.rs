/// Connection Pool Concurrency Tests
///
/// Racing first callers and admission under contention
mod common;

use common::{decoder, host, MockFactory, RecordingListener};
use meshproxy::stream::{ClientState, ConnPool, ConnectionPool, Protocol, StreamContext};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

#[test]
fn concurrent_first_calls_build_one_client() {
    const CALLERS: usize = 16;

    let factory = MockFactory::slow(Protocol::Http1, Duration::from_millis(20));
    let pool = ConnPool::new(host("race", 1024), factory.clone());
    let listener = RecordingListener::default();
    let barrier = Barrier::new(CALLERS);

    thread::scope(|s| {
        for i in 0..CALLERS {
            let pool = &pool;
            let listener = &listener;
            let barrier = &barrier;
            s.spawn(move || {
                barrier.wait();
                pool.new_stream(
                    &StreamContext::new(),
                    &format!("stream-{}", i),
                    decoder(),
                    listener,
                );
            });
        }
    });

    assert_eq!(factory.created(), 1);
    assert_eq!(pool.initializations(), 1);
    assert_eq!(pool.client_state(), ClientState::Active);
    assert_eq!(listener.ready().len(), CALLERS);
    assert_eq!(factory.connection(0).streams().len(), CALLERS);
    assert_eq!(
        pool.host().host_stats().upstream_connection_total.value(),
        1
    );
}

#[test]
fn admission_never_exceeds_budget() {
    const CALLERS: usize = 32;
    const BUDGET: u64 = 10;

    let factory = MockFactory::new(Protocol::Http1);
    let pool = ConnPool::new(host("budget", BUDGET), factory.clone());
    let listener = RecordingListener::default();
    let barrier = Barrier::new(CALLERS);

    thread::scope(|s| {
        for i in 0..CALLERS {
            let pool = &pool;
            let listener = &listener;
            let barrier = &barrier;
            s.spawn(move || {
                barrier.wait();
                pool.new_stream(
                    &StreamContext::new(),
                    &format!("stream-{}", i),
                    decoder(),
                    listener,
                );
            });
        }
    });

    let requests = pool.host().cluster_info().resource_manager().requests();
    assert_eq!(listener.ready().len(), BUDGET as usize);
    assert_eq!(listener.failures().len(), CALLERS - BUDGET as usize);
    assert_eq!(requests.count(), BUDGET);
    assert_eq!(
        pool.host()
            .cluster_info()
            .stats()
            .upstream_request_pending_overflow
            .value(),
        (CALLERS as u64 - BUDGET) as i64
    );

    let conn = factory.connection(0);
    for _ in 0..BUDGET {
        conn.destroy_stream();
    }
    assert_eq!(requests.count(), 0);
}

#[test]
fn events_race_with_new_streams() {
    const ROUNDS: usize = 50;

    let factory = MockFactory::new(Protocol::Http1);
    let pool = Arc::new(ConnPool::new(host("churn", 4096), factory.clone()));
    let listener = Arc::new(RecordingListener::default());

    let opener = {
        let pool = Arc::clone(&pool);
        let listener = Arc::clone(&listener);
        thread::spawn(move || {
            for i in 0..ROUNDS {
                pool.new_stream(
                    &StreamContext::new(),
                    &format!("stream-{}", i),
                    decoder(),
                    listener.as_ref(),
                );
            }
        })
    };

    let closer = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || {
            for _ in 0..ROUNDS {
                if let Some(client) = pool.active_client() {
                    client.on_event(meshproxy::stream::ConnectionEvent::RemoteClose);
                }
                thread::yield_now();
            }
        })
    };

    opener.join().unwrap();
    closer.join().unwrap();

    assert_eq!(listener.ready().len(), ROUNDS);
    // Each close event ends exactly one connection's active count.
    let stats = pool.host().host_stats();
    let open_clients = match pool.active_client() {
        Some(client) => {
            assert_ne!(client.state(), ClientState::Closed, "closed client left cached");
            1
        }
        None => 0,
    };
    assert_eq!(stats.upstream_connection_active.value(), open_clients);
    assert_eq!(
        stats.upstream_connection_total.value(),
        factory.created() as i64
    );
}

#[test]
fn close_racing_first_init_never_leaves_closed_client_cached() {
    const ROUNDS: usize = 2000;

    for round in 0..ROUNDS {
        let factory = MockFactory::new(Protocol::Http1);
        let pool = ConnPool::new(host("init-race", 16), factory.clone());
        let listener = RecordingListener::default();

        thread::scope(|s| {
            let factory = &factory;
            s.spawn(move || {
                // Wait until the pool has wired the connection up, then close it
                // somewhere inside the caching window.
                while factory.created() == 0 || factory.connection(0).stats().is_none() {
                    std::hint::spin_loop();
                }
                for _ in 0..(round % 200) {
                    std::hint::spin_loop();
                }
                factory
                    .connection(0)
                    .raise(meshproxy::stream::ConnectionEvent::RemoteClose);
            });

            pool.new_stream(&StreamContext::new(), "s1", decoder(), &listener);
        });

        if let Some(client) = pool.active_client() {
            assert_ne!(
                client.state(),
                ClientState::Closed,
                "closed client cached in round {}",
                round
            );
        }

        // Whatever the interleaving, the next stream lands on a live client.
        pool.new_stream(&StreamContext::new(), "s2", decoder(), &listener);
        assert_eq!(pool.client_state(), ClientState::Active);
    }
}
