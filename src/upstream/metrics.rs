use super::stats::StatsScope;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use lazy_static::lazy_static;
use prometheus::{
    register_int_counter_vec, register_int_gauge_vec, IntCounterVec, IntGauge, IntGaugeVec,
};

lazy_static! {
    pub static ref UPSTREAM_COUNTERS: IntGaugeVec = register_int_gauge_vec!(
        "meshproxy_upstream_counter",
        "Upstream connection and request counters per host and cluster",
        &["scope", "owner", "counter"]
    )
    .expect("register meshproxy_upstream_counter gauge_vec");
    pub static ref ROUTE_LOOKUPS: IntCounterVec = register_int_counter_vec!(
        "meshproxy_route_lookups_total",
        "Route lookups per listener and outcome",
        &["listener", "outcome"]
    )
    .expect("register meshproxy_route_lookups_total counter_vec");
    /// Live `UpstreamStats` per label owner; the last one out removes the labels.
    static ref OWNERS: DashMap<(StatsScope, String), usize> = DashMap::new();
}

#[derive(Debug, Clone, Copy)]
pub struct UpstreamMetrics;

impl UpstreamMetrics {
    #[inline]
    pub fn gauge(scope: StatsScope, owner: &str, counter: &str) -> IntGauge {
        UPSTREAM_COUNTERS.with_label_values(&[scope.as_str(), owner, counter])
    }

    /// Register one more stats set exporting under `owner`.
    pub fn acquire(scope: StatsScope, owner: &str) {
        *OWNERS.entry((scope, owner.to_string())).or_insert(0) += 1;
    }

    /// Drop one stats set; the label sets of `counters` go with the last one.
    pub fn release(scope: StatsScope, owner: &str, counters: &[&str]) {
        if let Entry::Occupied(mut entry) = OWNERS.entry((scope, owner.to_string())) {
            *entry.get_mut() -= 1;
            if *entry.get() == 0 {
                // Removed under the entry lock so a concurrent acquire re-creates them.
                for counter in counters {
                    let _ = UPSTREAM_COUNTERS.remove_label_values(&[scope.as_str(), owner, *counter]);
                }
                entry.remove();
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RouteMetrics;

impl RouteMetrics {
    #[inline]
    pub fn record_hit(listener: &str) {
        ROUTE_LOOKUPS.with_label_values(&[listener, "hit"]).inc();
    }

    #[inline]
    pub fn record_miss(listener: &str) {
        ROUTE_LOOKUPS.with_label_values(&[listener, "miss"]).inc();
    }
}

#[inline]
pub fn init() {
    lazy_static::initialize(&UPSTREAM_COUNTERS);
    lazy_static::initialize(&ROUTE_LOOKUPS);
}
