//! # Connection Pool
//!
//! Keeps a bounded LIFO queue of idle connections so calls can reuse warm
//! transports.
//!
//! The queue holds either live connections or vacant slots. A vacant slot
//! only signals that opening a new connection is fine; the pool is seeded
//! with `min` of them. `acquire` waits up to `acquire_timeout` for an entry
//! and opens a new connection when none shows up, so callers are never
//! refused. `max` bounds how many idle connections are retained, not how many
//! may be in use.
//!
//! A transport fault on one connection purges the whole queue: every idle
//! connection is closed and the vacant slots are seeded again. The pool also
//! remembers the process that created it and starts over from its
//! configuration when used from another one, since transports inherited
//! across a fork cannot be shared.

mod connection;
mod guard;


use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::PoolConfig;
use crate::error::Result;
use crate::util::metrics::PoolMetrics;

pub use connection::{Connection, ConnectionMeta, Connector};
pub use guard::{Disposition, PooledConnection};

/// Entry of the idle queue.
enum Slot<C> {
    Vacant,
    Occupied(C),
}

struct PoolState<C> {
    /// Process that created the queue's contents.
    owner: u32,
    /// LIFO: the tail is handed out first.
    idle: Vec<Slot<C>>,
}

struct PoolInner<K: Connector> {
    config: PoolConfig,
    connector: K,
    state: Mutex<PoolState<K::Connection>>,
    released: Notify,
    metrics: PoolMetrics,
}

/// Connection pool handle.
pub struct Pool<K: Connector> {
    inner: Arc<PoolInner<K>>,
}

impl<K: Connector> Clone for Pool<K> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K: Connector> Pool<K> {
    /// Creates a pool and seeds it with `config.min` vacant slots.
    pub fn new(config: PoolConfig, connector: K) -> Self {
        let pool = Pool {
            inner: Arc::new(PoolInner {
                config,
                connector,
                state: Mutex::new(PoolState {
                    owner: std::process::id(),
                    idle: Vec::new(),
                }),
                released: Notify::new(),
                metrics: PoolMetrics::new(),
            }),
        };
        pool.diet();
        pool
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub fn connector(&self) -> &K {
        &self.inner.connector
    }

    pub fn metrics(&self) -> &PoolMetrics {
        &self.inner.metrics
    }

    /// Number of idle entries, vacant slots included.
    pub fn idle_len(&self) -> usize {
        self.lock().idle.len()
    }

    /// Number of live idle connections.
    pub fn idle_connections(&self) -> usize {
        self.lock()
            .idle
            .iter()
            .filter(|slot| matches!(slot, Slot::Occupied(_)))
            .count()
    }

    /// Acquires a guarded connection. The guard hands the connection back to
    /// the pool, or abandons it, depending on how the call went.
    pub async fn connection(&self) -> Result<PooledConnection<K>> {
        let conn = self.acquire().await?;
        Ok(PooledConnection::new(self.clone(), conn))
    }

    /// Runs `f` on a pooled connection and settles the connection from its
    /// outcome. The outcome is returned unchanged.
    pub async fn scoped<T, F>(&self, f: F) -> Result<T>
    where
        F: for<'c> FnOnce(
            &'c mut K::Connection,
        ) -> Pin<Box<dyn Future<Output = Result<T>> + Send + 'c>>,
    {
        let mut guard = self.connection().await?;
        let outcome = f(&mut *guard).await;
        guard.finish(outcome)
    }

    /// Takes a connection out of the pool, opening one if no usable idle
    /// connection turns up within `acquire_timeout`.
    pub async fn acquire(&self) -> Result<K::Connection> {
        self.check_owner();
        match self.pop_idle().await {
            Some(Slot::Occupied(mut conn)) => {
                if self.is_stale(&conn) {
                    self.inner.metrics.inc_evicted();
                    conn.close();
                } else {
                    self.inner.metrics.inc_reused();
                    return Ok(conn);
                }
            }
            Some(Slot::Vacant) => {}
            None => warn!("No idle connection, create one more"),
        }

        let conn = self.inner.connector.connect().await?;
        self.inner.metrics.inc_created();
        Ok(conn)
    }

    /// Returns a connection to the idle queue, or closes it if the queue is full.
    pub fn release(&self, mut conn: K::Connection) {
        conn.touch();
        let rejected = {
            let mut state = self.lock();
            if state.idle.len() < self.inner.config.capacity() {
                state.idle.push(Slot::Occupied(conn));
                None
            } else {
                Some(conn)
            }
        };

        match rejected {
            Some(mut conn) => {
                warn!("The pool is full, discard connection");
                self.inner.metrics.inc_discarded();
                conn.close();
            }
            None => self.inner.released.notify_one(),
        }
    }

    /// Closes `conn`, then every idle connection, then seeds vacant slots again.
    pub fn abandon(&self, mut conn: K::Connection) {
        conn.close();
        self.inner.metrics.inc_abandoned();
        let purged = self.clear();
        warn!("Connection abandoned, purged {} idle connections", purged);
        self.diet();
    }

    /// Closes every idle connection and empties the queue. Returns the number
    /// of connections closed.
    pub fn clear(&self) -> usize {
        let drained = std::mem::take(&mut self.lock().idle);
        close_all(drained)
    }

    /// Disposes of every pooled connection.
    pub fn dispose(&self) {
        self.clear();
    }

    /// Seeds vacant slots up to `min`, stopping early when the queue is full.
    fn diet(&self) {
        let capacity = self.inner.config.capacity();
        let mut seeded = 0;
        {
            let mut state = self.lock();
            for _ in 0..self.inner.config.min {
                if state.idle.len() >= capacity {
                    break;
                }
                state.idle.push(Slot::Vacant);
                seeded += 1;
            }
        }
        for _ in 0..seeded {
            self.inner.released.notify_one();
        }
    }

    /// Starts the pool over when it is used from a process other than the
    /// one that created it.
    fn check_owner(&self) {
        let current = std::process::id();
        let inherited = {
            let mut state = self.lock();
            if state.owner == current {
                return;
            }
            state.owner = current;
            std::mem::take(&mut state.idle)
        };
        info!("This pool was created by another process, reinitializing");
        close_all(inherited);
        self.diet();
    }

    async fn pop_idle(&self) -> Option<Slot<K::Connection>> {
        let deadline = Instant::now() + self.inner.config.acquire_timeout;
        loop {
            let released = self.inner.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            let slot = self.lock().idle.pop();
            if slot.is_some() {
                return slot;
            }
            if tokio::time::timeout_at(deadline, released).await.is_err() {
                return None;
            }
        }
    }

    fn is_stale(&self, conn: &K::Connection) -> bool {
        if !conn.is_reusable() {
            debug!("Discard closed connection");
            return true;
        }
        let now = Instant::now();
        let meta = conn.meta();
        let idle_time = now.saturating_duration_since(meta.last_used_at());
        let life_time = now.saturating_duration_since(meta.opened_at());
        let stale = idle_time > self.inner.config.idle_timeout
            || life_time > self.inner.config.max_lifetime;
        if stale {
            debug!(
                "Discard obsolete connection. idle: {:?}, life: {:?}",
                idle_time, life_time
            );
        }
        stale
    }

    fn lock(&self) -> MutexGuard<'_, PoolState<K::Connection>> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn close_all<C: Connection>(slots: Vec<Slot<C>>) -> usize {
    let mut closed = 0;
    for slot in slots {
        if let Slot::Occupied(mut conn) = slot {
            conn.close();
            closed += 1;
        }
    }
    closed
}
