//! # RPC Connection
//!
//! Builds the store's remote calls on top of the TSV-RPC codec. Each call is
//! `POST /rpc/<name>` with a URL-encoded association list as the body; the
//! response body is decoded with the column encoding its `Content-Type`
//! declares.

mod connection;
mod transport;

pub use connection::{IncrementOrigin, RpcConnection, RpcConnector};
pub use transport::{Exchange, HttpTransport};

/// Fixed column names of the wire protocol.
pub mod keys {
    pub const KEY: &[u8] = b"key";
    pub const VALUE: &[u8] = b"value";
    pub const DB: &[u8] = b"DB";
    pub const XT: &[u8] = b"xt";
    pub const ORIG: &[u8] = b"orig";
    pub const ATOMIC: &[u8] = b"atomic";
    pub const NUM: &[u8] = b"num";
    pub const PREFIX: &[u8] = b"prefix";
    pub const MAX: &[u8] = b"max";
    pub const VSIZ: &[u8] = b"vsiz";
    /// Prefix of every record key in bulk calls.
    pub const BULK_PREFIX: u8 = b'_';
    pub const ERROR: &[u8] = b"ERROR";
}

/// HTTP status of a logical inconsistency.
pub const STATUS_LOGICAL_INCONSISTENCY: u16 = 450;
