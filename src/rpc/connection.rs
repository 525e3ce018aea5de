//! Remote calls of the store over one pooled HTTP connection

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{Error, FaultKind, Result};
use crate::pool::{Connection, ConnectionMeta, Connector};
use crate::protocol::{tsvrpc, AssocList, ColumnEncoding, REQUEST_ENCODING};
use crate::rpc::transport::{Exchange, HttpTransport};
use crate::rpc::{keys, STATUS_LOGICAL_INCONSISTENCY};

/// How `increment` treats a missing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncrementOrigin {
    /// Fail when the record is missing.
    Try,
    /// Store `num` as the new value, replacing any numeric record. Fails on
    /// an existing record that is not a number.
    Set,
    /// Start from this value when the record is missing.
    Value(i64),
}

impl IncrementOrigin {
    fn to_wire(self) -> Vec<u8> {
        match self {
            IncrementOrigin::Try => b"try".to_vec(),
            IncrementOrigin::Set => b"set".to_vec(),
            IncrementOrigin::Value(n) => n.to_string().into_bytes(),
        }
    }
}

/// A connection speaking TSV-RPC.
///
/// Transport faults are declared fatal: a call failing on the transport gets
/// the connection abandoned by its guard. Logical inconsistencies and other
/// error statuses leave the connection reusable.
pub struct RpcConnection {
    transport: HttpTransport,
    meta: ConnectionMeta,
    peer: String,
    /// Set while an exchange is pending. Stays set if the exchange fails or
    /// is cancelled, since the HTTP stream is then out of sync.
    in_flight: bool,
}

impl RpcConnection {
    pub async fn connect(
        host: &str,
        port: u16,
        connect_timeout: Option<Duration>,
        request_timeout: Option<Duration>,
    ) -> Result<Self> {
        let transport = HttpTransport::connect(host, port, connect_timeout, request_timeout).await?;
        Ok(Self {
            transport,
            meta: ConnectionMeta::new(&[FaultKind::Transport]),
            peer: format!("{}:{}", host, port),
            in_flight: false,
        })
    }

    /// Performs `POST /rpc/<name>` with `input` and returns the decoded result.
    ///
    /// # Errors
    /// - `Error::LogicalInconsistency` on status 450
    /// - `Error::Rpc` on any other status but 200
    /// - `Error::Protocol` if a 200 response cannot be decoded
    /// - transport errors if the exchange itself fails
    pub async fn call(&mut self, name: &str, input: &AssocList) -> Result<AssocList> {
        let body = tsvrpc::write(input.records(), REQUEST_ENCODING);
        let path = format!("/rpc/{}", name);
        debug!("RPC {} to {} ({} bytes)", name, self.peer, body.len());

        let request = self
            .transport
            .request(&path, REQUEST_ENCODING.content_type(), body)?;

        self.in_flight = true;
        let exchange = self.transport.exchange(request).await?;
        self.in_flight = false;

        into_result(exchange)
    }

    pub async fn void(&mut self) -> Result<()> {
        self.call("void", &AssocList::new()).await?;
        Ok(())
    }

    /// Sends `records` and returns what the server echoes back.
    pub async fn echo<I, K, V>(&mut self, records: I) -> Result<BTreeMap<Vec<u8>, Vec<u8>>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Vec<u8>>,
        V: Into<Vec<u8>>,
    {
        let input: AssocList = records.into_iter().collect();
        let output = self.call("echo", &input).await?;
        Ok(output.into_iter().collect())
    }

    /// Server statistics.
    pub async fn report(&mut self) -> Result<AssocList> {
        self.call("report", &AssocList::new()).await
    }

    /// Status of one database: record count, size and so on.
    pub async fn status(&mut self, db: Option<&str>) -> Result<AssocList> {
        let mut input = AssocList::new();
        input.append_opt(keys::DB, db);
        self.call("status", &input).await
    }

    /// Removes every record of the database.
    pub async fn clear(&mut self, db: Option<&str>) -> Result<()> {
        let mut input = AssocList::new();
        input.append_opt(keys::DB, db);
        self.call("clear", &input).await?;
        Ok(())
    }

    /// Stores a record, replacing any existing one.
    pub async fn set(
        &mut self,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
        xt: Option<i64>,
        db: Option<&str>,
    ) -> Result<()> {
        let input = record_input(key.as_ref(), value.as_ref(), xt, db);
        self.call("set", &input).await?;
        Ok(())
    }

    /// Stores a record only if the key is absent.
    pub async fn add(
        &mut self,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
        xt: Option<i64>,
        db: Option<&str>,
    ) -> Result<()> {
        let input = record_input(key.as_ref(), value.as_ref(), xt, db);
        self.call("add", &input).await?;
        Ok(())
    }

    /// Stores a record only if the key is present.
    pub async fn replace(
        &mut self,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
        xt: Option<i64>,
        db: Option<&str>,
    ) -> Result<()> {
        let input = record_input(key.as_ref(), value.as_ref(), xt, db);
        self.call("replace", &input).await?;
        Ok(())
    }

    /// Appends `value` to the record, creating it if absent.
    pub async fn append(
        &mut self,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
        xt: Option<i64>,
        db: Option<&str>,
    ) -> Result<()> {
        let input = record_input(key.as_ref(), value.as_ref(), xt, db);
        self.call("append", &input).await?;
        Ok(())
    }

    pub async fn remove(&mut self, key: impl AsRef<[u8]>, db: Option<&str>) -> Result<()> {
        let mut input = AssocList::with_capacity(2);
        input.append(keys::KEY, key.as_ref());
        input.append_opt(keys::DB, db);
        self.call("remove", &input).await?;
        Ok(())
    }

    /// Adds `num` to a numeric record and returns the new value.
    pub async fn increment(
        &mut self,
        key: impl AsRef<[u8]>,
        num: i64,
        orig: Option<IncrementOrigin>,
        xt: Option<i64>,
        db: Option<&str>,
    ) -> Result<i64> {
        let mut input = AssocList::with_capacity(5);
        input.append(keys::KEY, key.as_ref());
        input.append(keys::NUM, num.to_string());
        input.append_opt(keys::ORIG, orig.map(IncrementOrigin::to_wire));
        input.append_opt(keys::XT, xt.map(|xt| xt.to_string()));
        input.append_opt(keys::DB, db);
        let output = self.call("increment", &input).await?;
        parse_int(keys::NUM, output.get(keys::NUM)?)
    }

    /// Returns the value of a record and its expiration time, if any.
    pub async fn get(
        &mut self,
        key: impl AsRef<[u8]>,
        db: Option<&str>,
    ) -> Result<(Vec<u8>, Option<i64>)> {
        let input = key_input(key.as_ref(), db);
        let output = self.call("get", &input).await?;
        let value = output.get(keys::VALUE)?.to_vec();
        Ok((value, find_int(&output, keys::XT)?))
    }

    /// Returns the value size of a record and its expiration time, if any.
    pub async fn check(
        &mut self,
        key: impl AsRef<[u8]>,
        db: Option<&str>,
    ) -> Result<(u64, Option<i64>)> {
        let input = key_input(key.as_ref(), db);
        let output = self.call("check", &input).await?;
        let size = parse_int(keys::VSIZ, output.get(keys::VSIZ)?)?;
        Ok((size, find_int(&output, keys::XT)?))
    }

    /// Stores several records at once. Returns the number stored.
    pub async fn set_bulk<I, K, V>(
        &mut self,
        records: I,
        xt: Option<i64>,
        atomic: bool,
        db: Option<&str>,
    ) -> Result<u64>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<[u8]>,
        V: Into<Vec<u8>>,
    {
        let mut input = AssocList::new();
        input.append_opt(keys::XT, xt.map(|xt| xt.to_string()));
        bulk_header(&mut input, atomic, db);
        for (key, value) in records {
            input.append(bulk_key(key.as_ref()), value);
        }
        let output = self.call("set_bulk", &input).await?;
        parse_int(keys::NUM, output.get(keys::NUM)?)
    }

    /// Removes several records at once. Returns the number removed.
    pub async fn remove_bulk<I, K>(&mut self, keys: I, atomic: bool, db: Option<&str>) -> Result<u64>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<[u8]>,
    {
        let input = bulk_input(keys, atomic, db);
        let output = self.call("remove_bulk", &input).await?;
        parse_int(keys::NUM, output.get(keys::NUM)?)
    }

    /// Fetches several records at once. Missing keys are absent from the map.
    pub async fn get_bulk<I, K>(
        &mut self,
        keys: I,
        atomic: bool,
        db: Option<&str>,
    ) -> Result<BTreeMap<Vec<u8>, Vec<u8>>>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<[u8]>,
    {
        let input = bulk_input(keys, atomic, db);
        let output = self.call("get_bulk", &input).await?;
        Ok(output
            .into_iter()
            .filter_map(|(key, value)| strip_bulk_key(&key).map(|key| (key.to_vec(), value)))
            .collect())
    }

    /// Keys starting with `prefix`, in server order, at most `max` of them.
    pub async fn match_prefix(
        &mut self,
        prefix: impl AsRef<[u8]>,
        max: Option<usize>,
        db: Option<&str>,
    ) -> Result<Vec<Vec<u8>>> {
        let mut input = AssocList::with_capacity(3);
        input.append(keys::PREFIX, prefix.as_ref());
        input.append_opt(keys::MAX, max.map(|max| max.to_string()));
        input.append_opt(keys::DB, db);
        let output = self.call("match_prefix", &input).await?;
        Ok(output
            .iter()
            .filter_map(|(key, _)| strip_bulk_key(key).map(<[u8]>::to_vec))
            .take(max.unwrap_or(usize::MAX))
            .collect())
    }
}

impl Connection for RpcConnection {
    fn meta(&self) -> &ConnectionMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ConnectionMeta {
        &mut self.meta
    }

    fn close(&mut self) {
        debug!("Closing connection to {}", self.peer);
        self.transport.close();
    }

    fn is_reusable(&self) -> bool {
        !self.in_flight && self.transport.is_open()
    }
}

impl fmt::Display for RpcConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RpcConnection({})", self.peer)
    }
}

/// Opens [`RpcConnection`]s to one server.
#[derive(Debug, Clone)]
pub struct RpcConnector {
    host: String,
    port: u16,
    connect_timeout: Option<Duration>,
    request_timeout: Option<Duration>,
}

impl RpcConnector {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        connect_timeout: Option<Duration>,
        request_timeout: Option<Duration>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout,
            request_timeout,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(
            config.host.clone(),
            config.port,
            config.connect_timeout,
            config.request_timeout,
        )
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Connector for RpcConnector {
    type Connection = RpcConnection;

    fn connect(&self) -> impl Future<Output = Result<RpcConnection>> + Send {
        RpcConnection::connect(
            &self.host,
            self.port,
            self.connect_timeout,
            self.request_timeout,
        )
    }
}

/// Maps a response onto the call result.
fn into_result(exchange: Exchange) -> Result<AssocList> {
    let output = decode_body(exchange.content_type.as_deref(), &exchange.body);
    let status = exchange.status.as_u16();
    if status == 200 {
        return output;
    }

    let message = output
        .ok()
        .and_then(|list| {
            list.find(keys::ERROR)
                .map(|m| String::from_utf8_lossy(m).into_owned())
        })
        .unwrap_or(exchange.reason);
    if status == STATUS_LOGICAL_INCONSISTENCY {
        Err(Error::LogicalInconsistency(message))
    } else {
        Err(Error::Rpc { status, message })
    }
}

fn decode_body(content_type: Option<&str>, body: &[u8]) -> Result<AssocList> {
    let encoding = match content_type {
        Some(content_type) => ColumnEncoding::from_content_type(content_type)?,
        None if body.is_empty() => return Ok(AssocList::new()),
        None => return Err(Error::Protocol("Response body without Content-Type".to_string())),
    };
    AssocList::from_records(tsvrpc::read(body, encoding)?)
}

fn key_input(key: &[u8], db: Option<&str>) -> AssocList {
    let mut input = AssocList::with_capacity(2);
    input.append(keys::KEY, key);
    input.append_opt(keys::DB, db);
    input
}

fn record_input(key: &[u8], value: &[u8], xt: Option<i64>, db: Option<&str>) -> AssocList {
    let mut input = AssocList::with_capacity(4);
    input.append(keys::KEY, key);
    input.append(keys::VALUE, value);
    input.append_opt(keys::XT, xt.map(|xt| xt.to_string()));
    input.append_opt(keys::DB, db);
    input
}

fn bulk_header(input: &mut AssocList, atomic: bool, db: Option<&str>) {
    if atomic {
        input.append(keys::ATOMIC, Vec::new());
    }
    input.append_opt(keys::DB, db);
}

fn bulk_input<I, K>(keys: I, atomic: bool, db: Option<&str>) -> AssocList
where
    I: IntoIterator<Item = K>,
    K: AsRef<[u8]>,
{
    let mut input = AssocList::new();
    bulk_header(&mut input, atomic, db);
    for key in keys {
        input.append(bulk_key(key.as_ref()), Vec::new());
    }
    input
}

fn bulk_key(key: &[u8]) -> Vec<u8> {
    let mut wire = Vec::with_capacity(key.len() + 1);
    wire.push(keys::BULK_PREFIX);
    wire.extend_from_slice(key);
    wire
}

fn strip_bulk_key(key: &[u8]) -> Option<&[u8]> {
    key.strip_prefix(&[keys::BULK_PREFIX])
}

fn parse_int<T: FromStr>(field: &[u8], raw: &[u8]) -> Result<T> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| {
            Error::Protocol(format!(
                "Invalid integer in field '{}': '{}'",
                String::from_utf8_lossy(field),
                String::from_utf8_lossy(raw)
            ))
        })
}

fn find_int(output: &AssocList, field: &[u8]) -> Result<Option<i64>> {
    output.find(field).map(|raw| parse_int(field, raw)).transpose()
}
