//! TSV-RPC payload codec
//!
//! A payload is a sequence of records, each terminated by `\n`. Columns
//! inside a record are separated by `\t` and individually passed through the
//! active [`ColumnEncoding`].

use bytes::Bytes;

use crate::error::Result;
use crate::protocol::encoding::ColumnEncoding;

pub const RECORD_SEPARATOR: u8 = b'\n';
pub const COLUMN_SEPARATOR: u8 = b'\t';

/// One decoded record: one or two columns in practice.
pub type Record = Vec<Vec<u8>>;

/// Serializes records into a payload.
///
/// An empty record sequence produces an empty payload; otherwise every
/// record, the last one included, is terminated by the record separator.
pub fn write<I, R, C>(records: I, encoding: ColumnEncoding) -> Bytes
where
    I: IntoIterator<Item = R>,
    R: IntoIterator<Item = C>,
    C: AsRef<[u8]>,
{
    let mut out = Vec::new();
    for record in records {
        for (idx, column) in record.into_iter().enumerate() {
            if idx > 0 {
                out.push(COLUMN_SEPARATOR);
            }
            out.extend_from_slice(&encoding.encode(column.as_ref()));
        }
        out.push(RECORD_SEPARATOR);
    }
    Bytes::from(out)
}

/// Parses a payload into records.
///
/// Empty segments, including the one after the trailing separator, carry no
/// record and are skipped.
///
/// # Errors
/// Returns `Error::Protocol` if a column cannot be decoded.
pub fn read(payload: &[u8], encoding: ColumnEncoding) -> Result<Vec<Record>> {
    payload
        .split(|b| *b == RECORD_SEPARATOR)
        .filter(|row| !row.is_empty())
        .map(|row| {
            row.split(|b| *b == COLUMN_SEPARATOR)
                .map(|column| encoding.decode(column))
                .collect::<Result<Record>>()
        })
        .collect()
}
