//! Ordered key/value argument lists
//!
//! RPC arguments and results travel as an ordered list of byte pairs. Keys
//! may repeat; lookups return the first match.

use crate::error::{Error, Result};

/// Ordered sequence of `(key, value)` byte pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssocList {
    pairs: Vec<(Vec<u8>, Vec<u8>)>,
}

impl AssocList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty list with room for `capacity` pairs.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pairs: Vec::with_capacity(capacity),
        }
    }

    /// Appends a pair at the end of the list.
    pub fn append(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.pairs.push((key.into(), value.into()));
    }

    /// Appends a pair only if `value` is set. Unset optional arguments are
    /// left out of the request entirely.
    pub fn append_opt<V: Into<Vec<u8>>>(&mut self, key: impl Into<Vec<u8>>, value: Option<V>) {
        if let Some(value) = value {
            self.append(key, value);
        }
    }

    /// Returns the value of the first pair with `key`.
    ///
    /// # Errors
    /// Returns `Error::Protocol` if no pair has that key; a result list
    /// lacking a field the call promises is a malformed response.
    pub fn get(&self, key: &[u8]) -> Result<&[u8]> {
        self.find(key).ok_or_else(|| {
            Error::Protocol(format!(
                "Missing field '{}' in response",
                String::from_utf8_lossy(key)
            ))
        })
    }

    /// Returns the value of the first pair with `key`, if any.
    pub fn find(&self, key: &[u8]) -> Option<&[u8]> {
        self.pairs
            .iter()
            .find(|(k, _)| k.as_slice() == key)
            .map(|(_, v)| v.as_slice())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.pairs.iter().map(|(k, v)| (k.as_slice(), v.as_slice()))
    }

    /// Wire records of the list: every pair becomes a two-column record.
    pub fn records(&self) -> impl Iterator<Item = [&[u8]; 2]> {
        self.pairs.iter().map(|(k, v)| [k.as_slice(), v.as_slice()])
    }

    /// Builds a list from decoded wire records.
    ///
    /// A single-column record is a key-only pair and gets an empty value.
    ///
    /// # Errors
    /// Returns `Error::Protocol` for records with more than two columns.
    pub fn from_records(records: Vec<Vec<Vec<u8>>>) -> Result<Self> {
        let mut list = Self::with_capacity(records.len());
        for record in records {
            let mut columns = record.into_iter();
            match (columns.next(), columns.next(), columns.next()) {
                (Some(key), value, None) => list.append(key, value.unwrap_or_default()),
                (key, _, _) => {
                    return Err(Error::Protocol(format!(
                        "Malformed record starting with '{}'",
                        String::from_utf8_lossy(&key.unwrap_or_default())
                    )))
                }
            }
        }
        Ok(list)
    }
}

impl<K, V> FromIterator<(K, V)> for AssocList
where
    K: Into<Vec<u8>>,
    V: Into<Vec<u8>>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut list = Self::new();
        for (key, value) in iter {
            list.append(key, value);
        }
        list
    }
}

impl IntoIterator for AssocList {
    type Item = (Vec<u8>, Vec<u8>);
    type IntoIter = std::vec::IntoIter<(Vec<u8>, Vec<u8>)>;

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.into_iter()
    }
}
