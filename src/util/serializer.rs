use crate::error::Error;

/// Converts application values to and from the bytes stored on the server.
///
/// Serializers sit above the wire codec: their output is what `set` stores
/// and what `get` hands back, before any column encoding.
pub trait Serializer {
    type Value;

    fn serialize(&self, value: &Self::Value) -> Result<Vec<u8>, Error>;

    fn deserialize(&self, data: &[u8]) -> Result<Self::Value, Error>;
}

/// Stores values as the bytes they are.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesSerializer;

impl Serializer for BytesSerializer {
    type Value = Vec<u8>;

    #[inline]
    fn serialize(&self, value: &Vec<u8>) -> Result<Vec<u8>, Error> {
        Ok(value.clone())
    }

    #[inline]
    fn deserialize(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        Ok(data.to_vec())
    }
}

/// Stores strings as UTF-8.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextSerializer;

impl Serializer for TextSerializer {
    type Value = String;

    #[inline]
    fn serialize(&self, value: &String) -> Result<Vec<u8>, Error> {
        Ok(value.as_bytes().to_vec())
    }

    fn deserialize(&self, data: &[u8]) -> Result<String, Error> {
        String::from_utf8(data.to_vec())
            .map_err(|e| Error::Serialization(format!("Invalid UTF-8 text: {}", e)))
    }
}
