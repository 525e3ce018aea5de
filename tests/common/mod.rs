//! In-process TSV-RPC server for integration tests.
//!
//! Emulates the record calls of the store on in-memory maps, one per `DB`
//! value, and exposes hooks to break connections or slow responses down.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::ext::ReasonPhrase;
use hyper::header::CONTENT_TYPE;
use hyper::server::conn::http1;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use tycoon_client::protocol::{tsvrpc, AssocList, ColumnEncoding};
use tycoon_client::{Client, ClientConfig, PoolConfig};

type BoxError = Box<dyn std::error::Error + Send + Sync>;
type Rejection = (u16, String);

#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub value: Vec<u8>,
    pub xt: Option<i64>,
}

/// Observable server state.
pub struct MockState {
    pub dbs: Mutex<HashMap<Vec<u8>, BTreeMap<Vec<u8>, StoredRecord>>>,
    /// TCP connections accepted so far.
    pub connections: AtomicUsize,
    pub requests: AtomicUsize,
    /// Name and arguments of the last call.
    pub last_call: Mutex<Option<(String, AssocList)>>,
    /// Column encoding of response bodies.
    pub response_encoding: Mutex<ColumnEncoding>,
    /// When set, the next request kills its connection without answering.
    pub fail_next: AtomicBool,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            dbs: Mutex::new(HashMap::new()),
            connections: AtomicUsize::new(0),
            requests: AtomicUsize::new(0),
            last_call: Mutex::new(None),
            response_encoding: Mutex::new(ColumnEncoding::Url),
            fail_next: AtomicBool::new(false),
        }
    }
}

impl MockState {
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn set_response_encoding(&self, encoding: ColumnEncoding) {
        *self.response_encoding.lock().unwrap() = encoding;
    }

    pub fn fail_next_request(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn last_call(&self) -> Option<(String, AssocList)> {
        self.last_call.lock().unwrap().clone()
    }

    pub fn record(&self, db: &[u8], key: &[u8]) -> Option<StoredRecord> {
        self.dbs.lock().unwrap().get(db)?.get(key).cloned()
    }
}

#[derive(Clone)]
struct MockHandler {
    state: Arc<MockState>,
}

impl MockHandler {
    async fn handle(&self, req: Request<Incoming>) -> Result<Response<Full<Bytes>>, BoxError> {
        self.state.requests.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_next.swap(false, Ordering::SeqCst) {
            return Err("connection killed by test".into());
        }

        let name = req
            .uri()
            .path()
            .strip_prefix("/rpc/")
            .unwrap_or_default()
            .to_string();
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = req.into_body().collect().await?.to_bytes();

        let encoding = ColumnEncoding::from_content_type(&content_type)?;
        let input = AssocList::from_records(tsvrpc::read(&body, encoding)?)?;
        *self.state.last_call.lock().unwrap() = Some((name.clone(), input.clone()));

        match name.as_str() {
            "slow" => tokio::time::sleep(Duration::from_millis(500)).await,
            "broken" => {
                return Ok(Response::builder()
                    .status(500)
                    .header(CONTENT_TYPE, "text/html")
                    .body(Full::new(Bytes::from_static(b"<h1>broken</h1>")))?)
            }
            _ => {}
        }

        let response_encoding = *self.state.response_encoding.lock().unwrap();
        let (status, output) = match self.dispatch(&name, &input) {
            Ok(output) => (200, output),
            Err((status, message)) => {
                let mut output = AssocList::new();
                if !message.is_empty() {
                    output.append("ERROR", message);
                }
                (status, output)
            }
        };

        let mut response = Response::builder()
            .status(status)
            .header(CONTENT_TYPE, response_encoding.content_type())
            .body(Full::new(tsvrpc::write(output.records(), response_encoding)))?;
        if status == 450 {
            response
                .extensions_mut()
                .insert(ReasonPhrase::from_static(b"Logical Inconsistency"));
        }
        Ok(response)
    }

    fn dispatch(&self, name: &str, input: &AssocList) -> Result<AssocList, Rejection> {
        let db_name = input.find(b"DB").unwrap_or_default().to_vec();
        let mut dbs = self.state.dbs.lock().unwrap();
        let db = dbs.entry(db_name).or_default();
        let mut output = AssocList::new();

        match name {
            "void" | "slow" => {}
            "echo" => output = input.clone(),
            "report" => {
                output.append("cnt_get", "0");
                output.append("conf_kc_version", "mock");
            }
            "status" => {
                let size: usize = db.values().map(|r| r.value.len()).sum();
                output.append("count", db.len().to_string());
                output.append("size", size.to_string());
            }
            "clear" => db.clear(),
            "set" | "add" | "replace" | "append" => {
                let key = field(input, b"key")?.to_vec();
                let mut value = field(input, b"value")?.to_vec();
                let xt = int_field(input, b"xt")?;
                match (name, db.get(&key)) {
                    ("add", Some(_)) => return Err(logical("DB: 6: record duplication")),
                    ("replace", None) => return Err(logical("DB: 7: no record was found")),
                    ("append", Some(existing)) => {
                        let mut joined = existing.value.clone();
                        joined.extend_from_slice(&value);
                        value = joined;
                    }
                    _ => {}
                }
                db.insert(key, StoredRecord { value, xt });
            }
            "remove" => {
                let key = field(input, b"key")?;
                if db.remove(key).is_none() {
                    return Err(logical("DB: 7: no record was found"));
                }
            }
            "increment" => {
                let key = field(input, b"key")?.to_vec();
                let num = int_field(input, b"num")?.ok_or_else(|| missing(b"num"))?;
                let current = match db.get(&key) {
                    Some(record) => match <[u8; 8]>::try_from(record.value.as_slice()) {
                        Ok(bytes) => Some(i64::from_be_bytes(bytes)),
                        Err(_) => {
                            return Err(logical("DB: 8: the existing record was not compatible"))
                        }
                    },
                    None => None,
                };
                let next = match (current, input.find(b"orig")) {
                    (_, Some(b"set")) => num,
                    (Some(current), _) => current + num,
                    (None, Some(b"try")) => return Err(logical("DB: 7: no record was found")),
                    (None, None) => num,
                    (None, Some(orig)) => parse_int(orig)? + num,
                };
                db.insert(
                    key,
                    StoredRecord {
                        value: next.to_be_bytes().to_vec(),
                        xt: int_field(input, b"xt")?,
                    },
                );
                output.append("num", next.to_string());
            }
            "get" | "check" => {
                let key = field(input, b"key")?;
                let record = db
                    .get(key)
                    .ok_or_else(|| logical("DB: 7: no record was found"))?;
                if name == "get" {
                    output.append("value", record.value.clone());
                } else {
                    output.append("vsiz", record.value.len().to_string());
                }
                output.append_opt("xt", record.xt.map(|xt| xt.to_string()));
            }
            "set_bulk" => {
                let xt = int_field(input, b"xt")?;
                let mut stored = 0;
                for (key, value) in bulk_pairs(input) {
                    db.insert(key.to_vec(), StoredRecord { value: value.to_vec(), xt });
                    stored += 1;
                }
                output.append("num", stored.to_string());
            }
            "remove_bulk" => {
                let removed = bulk_pairs(input)
                    .filter(|(key, _)| db.remove(*key).is_some())
                    .count();
                output.append("num", removed.to_string());
            }
            "get_bulk" => {
                let mut found = 0;
                for (key, _) in bulk_pairs(input) {
                    if let Some(record) = db.get(key) {
                        output.append(bulk_key(key), record.value.clone());
                        found += 1;
                    }
                }
                output.append("num", found.to_string());
            }
            "match_prefix" => {
                let prefix = field(input, b"prefix")?;
                let max = int_field(input, b"max")?.map(|max| max as usize);
                let mut matched = 0;
                for key in db.keys().filter(|key| key.starts_with(prefix)) {
                    if max.map_or(false, |max| matched >= max) {
                        break;
                    }
                    output.append(bulk_key(key), Vec::new());
                    matched += 1;
                }
                output.append("num", matched.to_string());
            }
            _ => return Err((501, "not implemented".to_string())),
        }
        Ok(output)
    }
}

impl hyper::service::Service<Request<Incoming>> for MockHandler {
    type Response = Response<Full<Bytes>>;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let handler = self.clone();
        Box::pin(async move { handler.handle(req).await })
    }
}

fn logical(message: &str) -> Rejection {
    (450, message.to_string())
}

fn missing(name: &[u8]) -> Rejection {
    (400, format!("missing {}", String::from_utf8_lossy(name)))
}

fn field<'a>(input: &'a AssocList, name: &[u8]) -> Result<&'a [u8], Rejection> {
    input.find(name).ok_or_else(|| missing(name))
}

fn parse_int(raw: &[u8]) -> Result<i64, Rejection> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| (400, "invalid number".to_string()))
}

fn int_field(input: &AssocList, name: &[u8]) -> Result<Option<i64>, Rejection> {
    input.find(name).map(parse_int).transpose()
}

fn bulk_pairs(input: &AssocList) -> impl Iterator<Item = (&[u8], &[u8])> {
    input
        .iter()
        .filter_map(|(key, value)| key.strip_prefix(b"_").map(|key| (key, value)))
}

fn bulk_key(key: &[u8]) -> Vec<u8> {
    let mut wire = b"_".to_vec();
    wire.extend_from_slice(key);
    wire
}

/// Running mock server; stops accepting when dropped.
pub struct MockServer {
    pub addr: SocketAddr,
    pub state: Arc<MockState>,
    task: JoinHandle<()>,
}

impl MockServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(MockState::default());
        let handler = MockHandler {
            state: state.clone(),
        };

        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                handler.state.connections.fetch_add(1, Ordering::SeqCst);
                let handler = handler.clone();
                tokio::spawn(async move {
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), handler)
                        .await;
                });
            }
        });

        Self { addr, state, task }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig {
            pool: PoolConfig {
                acquire_timeout: Duration::from_millis(20),
                ..Default::default()
            },
            ..ClientConfig::new("127.0.0.1", self.port())
        }
    }

    pub fn client(&self) -> Client {
        Client::with_config(self.config())
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Status code helper for assertions.
pub fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap()
}
