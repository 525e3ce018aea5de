//! # tycoon-client
//!
//! Async client for key-value servers speaking the TSV-RPC protocol of Kyoto
//! Tycoon: calls are HTTP `POST /rpc/<name>` requests whose bodies are
//! tab-separated key/value records.
//!
//! The [`Client`] keeps a pool of keep-alive connections. A call that fails
//! on the transport purges the pool; any other failure, such as a
//! [`Error::LogicalInconsistency`] for a missing record, leaves the
//! connection in service.
//!
//! ```rust,no_run
//! use tycoon_client::{Client, Error};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let client = Client::new("localhost", 1978);
//!     client.set("k", "v", None).await?;
//!     match client.add("k", "w", None).await {
//!         Err(Error::LogicalInconsistency(msg)) => println!("already there: {}", msg),
//!         other => other?,
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod pool;
pub mod protocol;
pub mod rpc;
pub mod util;

pub use client::Client;
pub use config::{ClientConfig, PoolConfig};
pub use error::{Error, FaultKind, Result};
pub use protocol::{AssocList, ColumnEncoding};
pub use rpc::{IncrementOrigin, RpcConnection};
pub use util::{BytesSerializer, PoolMetrics, Serializer, TextSerializer};
