//! Poolable connection contract

use std::future::Future;

use tokio::time::Instant;

use crate::error::{Error, FaultKind, Result};

/// Bookkeeping every pooled connection carries.
#[derive(Debug, Clone)]
pub struct ConnectionMeta {
    opened_at: Instant,
    last_used_at: Instant,
    fatal: Vec<FaultKind>,
}

impl ConnectionMeta {
    /// Starts the clock for a freshly opened connection. `fatal` lists the
    /// fault kinds after which the connection must not be reused.
    pub fn new(fatal: &[FaultKind]) -> Self {
        let now = Instant::now();
        Self {
            opened_at: now,
            last_used_at: now,
            fatal: fatal.to_vec(),
        }
    }

    #[inline]
    pub fn opened_at(&self) -> Instant {
        self.opened_at
    }

    #[inline]
    pub fn last_used_at(&self) -> Instant {
        self.last_used_at
    }

    #[inline]
    pub fn touch(&mut self) {
        self.last_used_at = Instant::now();
    }

    #[inline]
    pub fn is_fatal(&self, kind: FaultKind) -> bool {
        self.fatal.contains(&kind)
    }
}

/// A single session with the backend that a [`Pool`](super::Pool) can hold.
pub trait Connection: Send + 'static {
    fn meta(&self) -> &ConnectionMeta;

    fn meta_mut(&mut self) -> &mut ConnectionMeta;

    /// Releases the transport. The pool calls this exactly once.
    fn close(&mut self);

    /// Whether the connection can serve another call. A connection whose
    /// last exchange never completed is not.
    fn is_reusable(&self) -> bool {
        true
    }

    /// Marks the connection as used now. Only the pool calls this, on release.
    fn touch(&mut self) {
        self.meta_mut().touch();
    }

    /// Whether `err` means this connection's transport is no longer trustworthy.
    fn is_fatal(&self, err: &Error) -> bool {
        self.meta().is_fatal(err.kind())
    }
}

/// Opens new connections for a pool.
pub trait Connector: Send + Sync + 'static {
    type Connection: Connection;

    fn connect(&self) -> impl Future<Output = Result<Self::Connection>> + Send;
}
