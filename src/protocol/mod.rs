pub mod assoc;
pub mod encoding;
pub mod tsvrpc;


pub use assoc::AssocList;
pub use encoding::{ColumnEncoding, TSV_MEDIA_TYPE};
pub use tsvrpc::Record;

/// Encoding used for every request body. Request values may contain the
/// record and column separators, so they are always escaped.
pub const REQUEST_ENCODING: ColumnEncoding = ColumnEncoding::Url;
