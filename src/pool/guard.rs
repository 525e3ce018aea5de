//! Scoped acquisition of pooled connections

use std::ops::{Deref, DerefMut};

use tracing::debug;

use crate::error::Result;
use crate::pool::{Connection, Connector, Pool};

/// What happens to a connection once a call on it is over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Back to the idle queue.
    Release,
    /// Closed, and the pool purged.
    Abandon,
}

impl Disposition {
    /// Classifies a call outcome. Only failures in the connection's declared
    /// fatal set abandon it; success and every other failure release it.
    pub fn for_outcome<C: Connection, T>(conn: &C, outcome: &Result<T>) -> Self {
        match outcome {
            Err(err) if conn.is_fatal(err) => Disposition::Abandon,
            _ => Disposition::Release,
        }
    }
}

/// RAII wrapper around a connection checked out of a [`Pool`].
///
/// Call [`finish`](Self::finish) with the outcome of the work done on the
/// connection. A guard dropped without `finish` releases the connection when
/// it is still reusable and closes it otherwise.
pub struct PooledConnection<K: Connector> {
    pool: Pool<K>,
    conn: Option<K::Connection>,
}

impl<K: Connector> PooledConnection<K> {
    pub(crate) fn new(pool: Pool<K>, conn: K::Connection) -> Self {
        PooledConnection {
            pool,
            conn: Some(conn),
        }
    }

    /// Releases or abandons the connection according to `outcome`, which is
    /// handed back untouched.
    pub fn finish<T>(mut self, outcome: Result<T>) -> Result<T> {
        if let Some(conn) = self.conn.take() {
            match Disposition::for_outcome(&conn, &outcome) {
                Disposition::Release => self.pool.release(conn),
                Disposition::Abandon => self.pool.abandon(conn),
            }
        }
        outcome
    }
}

impl<K: Connector> Deref for PooledConnection<K> {
    type Target = K::Connection;

    fn deref(&self) -> &Self::Target {
        // Only `finish` and `drop` take the connection, and both consume the guard.
        self.conn.as_ref().expect("connection exists")
    }
}

impl<K: Connector> DerefMut for PooledConnection<K> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("connection exists")
    }
}

impl<K: Connector> Drop for PooledConnection<K> {
    fn drop(&mut self) {
        let mut conn = match self.conn.take() {
            Some(conn) => conn,
            None => return,
        };

        if conn.is_reusable() {
            self.pool.release(conn);
        } else {
            debug!("Guard dropped mid-call, closing connection");
            conn.close();
        }
    }
}
