//! Pooled client for TSV-RPC key-value servers

use std::collections::BTreeMap;
use std::fmt;

use crate::config::ClientConfig;
use crate::error::Result;
use crate::pool::Pool;
use crate::protocol::AssocList;
use crate::rpc::{IncrementOrigin, RpcConnector};
use crate::util::metrics::PoolMetrics;

/// Client for one database of a TSV-RPC server.
///
/// Every call checks a connection out of the client's pool, runs on it and
/// settles it: the connection goes back to the pool unless the call failed on
/// the transport, in which case the pool is purged. Errors are returned as
/// they occurred. Clones share the pool.
///
/// # Example
/// ```rust,no_run
/// use tycoon_client::Client;
///
/// #[tokio::main]
/// async fn main() -> Result<(), tycoon_client::Error> {
///     let client = Client::new("localhost", 1978);
///
///     client.set("greeting", "hello", None).await?;
///     let (value, expires) = client.get("greeting").await?;
///     assert_eq!(value, b"hello");
///     assert!(expires.is_none());
///
///     let count = client.increment("visits", 1, None, None).await?;
///     println!("visits: {}", count);
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Client {
    pool: Pool<RpcConnector>,
    db: Option<String>,
}

impl Client {
    /// Creates a client for `host:port` with default settings. No connection
    /// is opened until the first call.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self::with_config(ClientConfig::new(host, port))
    }

    /// Creates a client with custom configuration.
    ///
    /// # Example
    /// ```rust,no_run
    /// use std::time::Duration;
    /// use tycoon_client::{Client, ClientConfig, PoolConfig};
    ///
    /// let client = Client::with_config(ClientConfig {
    ///     db: Some("users.kch".to_string()),
    ///     request_timeout: Some(Duration::from_millis(500)),
    ///     pool: PoolConfig {
    ///         max: 16,
    ///         ..Default::default()
    ///     },
    ///     ..ClientConfig::new("kt.internal", 1978)
    /// });
    /// ```
    pub fn with_config(config: ClientConfig) -> Self {
        let connector = RpcConnector::from_config(&config);
        Self {
            pool: Pool::new(config.pool, connector),
            db: config.db,
        }
    }

    pub fn host(&self) -> &str {
        self.pool.connector().host()
    }

    pub fn port(&self) -> u16 {
        self.pool.connector().port()
    }

    /// Database every call is sent to; `None` means the server's default.
    pub fn db(&self) -> Option<&str> {
        self.db.as_deref()
    }

    pub fn pool(&self) -> &Pool<RpcConnector> {
        &self.pool
    }

    pub fn pool_metrics(&self) -> &PoolMetrics {
        self.pool.metrics()
    }

    /// Closes every idle connection of the pool.
    pub fn dispose(&self) {
        self.pool.dispose();
    }

    /// Does nothing on the server; useful as a ping.
    pub async fn void(&self) -> Result<()> {
        let mut conn = self.pool.connection().await?;
        let result = conn.void().await;
        conn.finish(result)
    }

    pub async fn echo<I, K, V>(&self, records: I) -> Result<BTreeMap<Vec<u8>, Vec<u8>>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Vec<u8>>,
        V: Into<Vec<u8>>,
    {
        let mut conn = self.pool.connection().await?;
        let result = conn.echo(records).await;
        conn.finish(result)
    }

    /// Server statistics such as `cnt_get` or `conf_kc_version`.
    pub async fn report(&self) -> Result<AssocList> {
        let mut conn = self.pool.connection().await?;
        let result = conn.report().await;
        conn.finish(result)
    }

    /// Status of the client's database, including `count` and `size`.
    pub async fn status(&self) -> Result<AssocList> {
        let mut conn = self.pool.connection().await?;
        let result = conn.status(self.db()).await;
        conn.finish(result)
    }

    pub async fn clear(&self) -> Result<()> {
        let mut conn = self.pool.connection().await?;
        let result = conn.clear(self.db()).await;
        conn.finish(result)
    }

    /// Stores a record. `xt` is the expiration time in seconds from now, or
    /// an absolute epoch time when negative.
    pub async fn set(
        &self,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
        xt: Option<i64>,
    ) -> Result<()> {
        let mut conn = self.pool.connection().await?;
        let result = conn.set(key, value, xt, self.db()).await;
        conn.finish(result)
    }

    /// Stores a record if the key is absent.
    ///
    /// # Errors
    /// `Error::LogicalInconsistency` if the record already exists.
    pub async fn add(
        &self,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
        xt: Option<i64>,
    ) -> Result<()> {
        let mut conn = self.pool.connection().await?;
        let result = conn.add(key, value, xt, self.db()).await;
        conn.finish(result)
    }

    /// Stores a record if the key is present.
    ///
    /// # Errors
    /// `Error::LogicalInconsistency` if there is no such record.
    pub async fn replace(
        &self,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
        xt: Option<i64>,
    ) -> Result<()> {
        let mut conn = self.pool.connection().await?;
        let result = conn.replace(key, value, xt, self.db()).await;
        conn.finish(result)
    }

    pub async fn append(
        &self,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
        xt: Option<i64>,
    ) -> Result<()> {
        let mut conn = self.pool.connection().await?;
        let result = conn.append(key, value, xt, self.db()).await;
        conn.finish(result)
    }

    /// # Errors
    /// `Error::LogicalInconsistency` if there is no such record.
    pub async fn remove(&self, key: impl AsRef<[u8]>) -> Result<()> {
        let mut conn = self.pool.connection().await?;
        let result = conn.remove(key, self.db()).await;
        conn.finish(result)
    }

    /// Adds `num` to a numeric record and returns the new value. The server
    /// stores numbers as 8-byte big-endian integers.
    ///
    /// # Errors
    /// `Error::LogicalInconsistency` if the existing record is not numeric,
    /// or if it is missing and `orig` is [`IncrementOrigin::Try`].
    pub async fn increment(
        &self,
        key: impl AsRef<[u8]>,
        num: i64,
        orig: Option<IncrementOrigin>,
        xt: Option<i64>,
    ) -> Result<i64> {
        let mut conn = self.pool.connection().await?;
        let result = conn.increment(key, num, orig, xt, self.db()).await;
        conn.finish(result)
    }

    /// Returns the value of a record and its expiration time.
    ///
    /// # Errors
    /// `Error::LogicalInconsistency` if the record is missing or expired.
    pub async fn get(&self, key: impl AsRef<[u8]>) -> Result<(Vec<u8>, Option<i64>)> {
        let mut conn = self.pool.connection().await?;
        let result = conn.get(key, self.db()).await;
        conn.finish(result)
    }

    /// Returns the value size of a record and its expiration time.
    pub async fn check(&self, key: impl AsRef<[u8]>) -> Result<(u64, Option<i64>)> {
        let mut conn = self.pool.connection().await?;
        let result = conn.check(key, self.db()).await;
        conn.finish(result)
    }

    pub async fn set_bulk<I, K, V>(&self, records: I, xt: Option<i64>, atomic: bool) -> Result<u64>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<[u8]>,
        V: Into<Vec<u8>>,
    {
        let mut conn = self.pool.connection().await?;
        let result = conn.set_bulk(records, xt, atomic, self.db()).await;
        conn.finish(result)
    }

    pub async fn remove_bulk<I, K>(&self, keys: I, atomic: bool) -> Result<u64>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<[u8]>,
    {
        let mut conn = self.pool.connection().await?;
        let result = conn.remove_bulk(keys, atomic, self.db()).await;
        conn.finish(result)
    }

    pub async fn get_bulk<I, K>(&self, keys: I, atomic: bool) -> Result<BTreeMap<Vec<u8>, Vec<u8>>>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<[u8]>,
    {
        let mut conn = self.pool.connection().await?;
        let result = conn.get_bulk(keys, atomic, self.db()).await;
        conn.finish(result)
    }

    /// Keys starting with `prefix`, at most `max` of them.
    pub async fn match_prefix(
        &self,
        prefix: impl AsRef<[u8]>,
        max: Option<usize>,
    ) -> Result<Vec<Vec<u8>>> {
        let mut conn = self.pool.connection().await?;
        let result = conn.match_prefix(prefix, max, self.db()).await;
        conn.finish(result)
    }
}

impl fmt::Display for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.host(), self.port(), self.db().unwrap_or(""))
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("host", &self.host())
            .field("port", &self.port())
            .field("db", &self.db)
            .field("idle", &self.pool.idle_connections())
            .finish()
    }
}
