// Copyright (c) 2025 Rill Contributors
// SPDX-License-Identifier: MIT

//! Value codecs for bridge boundaries.
//!
//! The contract at both bridge boundaries is bytes in, bytes out; the
//! serialization scheme is pluggable. [`BincodeCodec`] is the default;
//! [`JsonCodec`] exists for interop with non-Rust peers on the same broker.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::CodecError;

pub trait Codec<T>: Send + Sync {
    fn encode(&self, value: &T) -> Result<Vec<u8>, CodecError>;
    fn decode(&self, bytes: &[u8]) -> Result<T, CodecError>;
}

/// Compact binary framing. The default for both bridges.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl<T: Serialize + DeserializeOwned> Codec<T> for BincodeCodec {
    fn encode(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        bincode::serialize(value).map_err(|e| CodecError::new(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<T, CodecError> {
        bincode::deserialize(bytes).map_err(|e| CodecError::new(e.to_string()))
    }
}

/// JSON framing for channels shared with non-Rust subscribers.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl<T: Serialize + DeserializeOwned> Codec<T> for JsonCodec {
    fn encode(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(|e| CodecError::new(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::new(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bincode_round_trip() {
        let codec = BincodeCodec;
        let bytes = Codec::<f64>::encode(&codec, &3.25).unwrap();
        let back: f64 = codec.decode(&bytes).unwrap();
        assert_eq!(back, 3.25);
    }

    #[test]
    fn json_decode_rejects_garbage() {
        let codec = JsonCodec;
        assert!(Codec::<f64>::decode(&codec, b"not json").is_err());
    }
}
