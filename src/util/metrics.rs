use std::sync::atomic::{AtomicU64, Ordering};

/// Connection lifecycle counters of one pool.
#[derive(Debug)]
pub struct PoolMetrics {
    pub created_total: AtomicU64,
    pub reused_total: AtomicU64,
    pub evicted_total: AtomicU64,
    pub discarded_total: AtomicU64,
    pub abandoned_total: AtomicU64,
}

impl PoolMetrics {
    #[inline]
    pub fn new() -> Self {
        Self {
            created_total: AtomicU64::new(0),
            reused_total: AtomicU64::new(0),
            evicted_total: AtomicU64::new(0),
            discarded_total: AtomicU64::new(0),
            abandoned_total: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn inc_created(&self) {
        self.created_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_reused(&self) {
        self.reused_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_evicted(&self) {
        self.evicted_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_discarded(&self) {
        self.discarded_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_abandoned(&self) {
        self.abandoned_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn created(&self) -> u64 {
        self.created_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn reused(&self) -> u64 {
        self.reused_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn evicted(&self) -> u64 {
        self.evicted_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn discarded(&self) -> u64 {
        self.discarded_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn abandoned(&self) -> u64 {
        self.abandoned_total.load(Ordering::Relaxed)
    }

    pub fn to_prometheus(&self) -> String {
        format!(
            "# HELP tycoon_pool_connections_total Connection lifecycle events\n\
             # TYPE tycoon_pool_connections_total counter\n\
             tycoon_pool_connections_total{{event=\"created\"}} {}\n\
             tycoon_pool_connections_total{{event=\"reused\"}} {}\n\
             tycoon_pool_connections_total{{event=\"evicted\"}} {}\n\
             tycoon_pool_connections_total{{event=\"discarded\"}} {}\n\
             # HELP tycoon_pool_abandoned_total Connections abandoned after a transport fault\n\
             # TYPE tycoon_pool_abandoned_total counter\n\
             tycoon_pool_abandoned_total {}\n",
            self.created(),
            self.reused(),
            self.evicted(),
            self.discarded(),
            self.abandoned()
        )
    }
}

impl Default for PoolMetrics {
    fn default() -> Self {
        Self::new()
    }
}
