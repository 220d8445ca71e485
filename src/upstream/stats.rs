#[cfg(feature = "metrics")]
use super::metrics::UpstreamMetrics;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

/// Granularity a set of upstream counters is kept at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatsScope {
    Host,
    Cluster,
}

impl StatsScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatsScope::Host => "host",
            StatsScope::Cluster => "cluster",
        }
    }
}

impl fmt::Display for StatsScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named signed counter.
///
/// With the `metrics` feature every adjustment is mirrored into a
/// Prometheus gauge labelled by scope, owner and counter name.
#[derive(Debug)]
pub struct Counter {
    name: &'static str,
    value: AtomicI64,
    #[cfg(feature = "metrics")]
    gauge: prometheus::IntGauge,
}

impl Counter {
    #[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
    fn new(scope: StatsScope, owner: &str, name: &'static str) -> Self {
        Self {
            name,
            value: AtomicI64::new(0),
            #[cfg(feature = "metrics")]
            gauge: UpstreamMetrics::gauge(scope, owner, name),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn inc(&self, delta: i64) {
        self.value.fetch_add(delta, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        self.gauge.add(delta);
    }

    #[inline]
    pub fn dec(&self, delta: i64) {
        self.value.fetch_sub(delta, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        self.gauge.sub(delta);
    }

    #[inline]
    pub fn value(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Take this counter's contribution back out of a shared gauge.
    #[cfg(feature = "metrics")]
    fn detach(&self) {
        self.gauge.sub(self.value());
    }
}

macro_rules! upstream_stats {
    ($($field:ident),+ $(,)?) => {
        /// Counters shared by hosts and clusters.
        ///
        /// Stats sets with the same scope and owner export into the same
        /// gauges; the labels are removed once the last of them is dropped.
        #[derive(Debug)]
        pub struct UpstreamStats {
            scope: StatsScope,
            #[cfg(feature = "metrics")]
            owner: String,
            $(pub $field: Counter,)+
        }

        impl UpstreamStats {
            const COUNTERS: &'static [&'static str] = &[$(stringify!($field),)+];

            pub fn new(scope: StatsScope, owner: &str) -> Self {
                #[cfg(feature = "metrics")]
                UpstreamMetrics::acquire(scope, owner);

                Self {
                    scope,
                    #[cfg(feature = "metrics")]
                    owner: owner.to_string(),
                    $($field: Counter::new(scope, owner, stringify!($field)),)+
                }
            }

            /// Names of every counter, in declaration order.
            pub fn counter_names() -> &'static [&'static str] {
                Self::COUNTERS
            }

            /// Current value of every counter, in declaration order.
            pub fn snapshot(&self) -> Vec<(&'static str, i64)> {
                vec![$((stringify!($field), self.$field.value()),)+]
            }
        }

        #[cfg(feature = "metrics")]
        impl Drop for UpstreamStats {
            fn drop(&mut self) {
                $(self.$field.detach();)+
                UpstreamMetrics::release(self.scope, &self.owner, Self::COUNTERS);
            }
        }
    };
}

upstream_stats! {
    upstream_connection_total,
    upstream_connection_active,
    upstream_connection_total_http1,
    upstream_connection_total_http2,
    upstream_connection_con_fail,
    upstream_connection_local_close_with_active_request,
    upstream_connection_remote_close_with_active_request,
    upstream_connection_close_notify,
    upstream_bytes_read,
    upstream_bytes_read_current,
    upstream_bytes_write,
    upstream_bytes_write_current,
    upstream_request_total,
    upstream_request_active,
    upstream_request_pending_overflow,
    upstream_request_timeout,
    upstream_request_failure_eject,
    upstream_request_local_reset,
    upstream_request_remote_reset,
}

impl UpstreamStats {
    pub fn scope(&self) -> StatsScope {
        self.scope
    }
}
