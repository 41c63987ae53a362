//! Canonical byte encoding
//!
//! Every hash preimage and every size measurement goes through these
//! helpers, so the encoding is part of the protocol: bincode with its
//! default options (little-endian fixed-width integers, u64 length
//! prefixes, struct fields in declaration order). Reordering fields on any
//! encoded type changes every hash.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Encoding errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Encoding error: {0}")]
    Encode(#[source] bincode::Error),
    #[error("Decoding error: {0}")]
    Decode(#[source] bincode::Error),
}

/// Encode a value into its canonical bytes
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CodecError> {
    bincode::serialize(value).map_err(CodecError::Encode)
}

/// Decode a value from canonical bytes
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    bincode::deserialize(bytes).map_err(CodecError::Decode)
}

/// Size in bytes of the canonical encoding, without allocating it
pub fn encoded_size<T: Serialize + ?Sized>(value: &T) -> Result<u64, CodecError> {
    bincode::serialized_size(value).map_err(CodecError::Encode)
}
