//! Column encodings of the TSV-RPC wire format
//!
//! Every column of a TSV-RPC payload is passed through one of these
//! transforms. The encoding in use is announced by the `colenc` parameter of
//! the `Content-Type` header.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use percent_encoding::{percent_decode, percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::error::{Error, Result};

/// Media type shared by every TSV-RPC payload.
pub const TSV_MEDIA_TYPE: &str = "text/tab-separated-values";

/// RFC 3986 unreserved characters stay as they are, everything else is escaped.
const UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Byte transform applied to each TSV column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnEncoding {
    /// Identity. Only safe for values free of tabs and newlines.
    Raw,
    /// Percent-escapes every byte outside the unreserved set.
    Url,
    /// Standard base64 with `=` padding.
    Base64,
}

impl ColumnEncoding {
    /// Short name used in the `colenc` parameter (`""`, `"U"`, `"B"`).
    pub fn name(self) -> &'static str {
        match self {
            ColumnEncoding::Raw => "",
            ColumnEncoding::Url => "U",
            ColumnEncoding::Base64 => "B",
        }
    }

    /// Looks an encoding up by its `colenc` name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "" => Some(ColumnEncoding::Raw),
            "U" => Some(ColumnEncoding::Url),
            "B" => Some(ColumnEncoding::Base64),
            _ => None,
        }
    }

    /// Wire `Content-Type` announcing this encoding.
    pub fn content_type(self) -> &'static str {
        match self {
            ColumnEncoding::Raw => "text/tab-separated-values",
            ColumnEncoding::Url => "text/tab-separated-values; colenc=U",
            ColumnEncoding::Base64 => "text/tab-separated-values; colenc=B",
        }
    }

    /// Resolves the encoding announced by a `Content-Type` header value.
    ///
    /// # Errors
    /// Returns `Error::Protocol` for any media type other than
    /// `text/tab-separated-values` and for unknown parameters or encodings.
    pub fn from_content_type(value: &str) -> Result<Self> {
        let unsupported = || Error::Protocol(format!("Unsupported content type: {:?}", value));

        let mut parts = value.split(';').map(str::trim);
        let media_type = parts.next().unwrap_or_default();
        if !media_type.eq_ignore_ascii_case(TSV_MEDIA_TYPE) {
            return Err(unsupported());
        }

        let mut encoding = ColumnEncoding::Raw;
        for param in parts {
            match param.split_once('=') {
                Some((name, colenc)) if name.trim().eq_ignore_ascii_case("colenc") => {
                    encoding = Self::from_name(colenc.trim()).ok_or_else(unsupported)?;
                }
                _ => return Err(unsupported()),
            }
        }
        Ok(encoding)
    }

    /// Encodes one column value.
    pub fn encode(self, column: &[u8]) -> Vec<u8> {
        match self {
            ColumnEncoding::Raw => column.to_vec(),
            ColumnEncoding::Url => percent_encode(column, UNRESERVED).to_string().into_bytes(),
            ColumnEncoding::Base64 => STANDARD.encode(column).into_bytes(),
        }
    }

    /// Decodes one column value.
    ///
    /// # Errors
    /// Returns `Error::Protocol` if a base64 column is malformed.
    pub fn decode(self, column: &[u8]) -> Result<Vec<u8>> {
        match self {
            ColumnEncoding::Raw => Ok(column.to_vec()),
            ColumnEncoding::Url => Ok(percent_decode(column).collect()),
            ColumnEncoding::Base64 => STANDARD
                .decode(column)
                .map_err(|e| Error::Protocol(format!("Invalid base64 column: {}", e))),
        }
    }
}

impl fmt::Display for ColumnEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.content_type())
    }
}
