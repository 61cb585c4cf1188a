//! Versioned JSON envelope for persisted collections.
//!
//! Every value written through [`encode`] is wrapped as
//! `{"version": N, "data": ...}` so a later schema can be detected and
//! migrated instead of being misread.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::repository::StorageError;

/// Version written by this build.
pub const PAYLOAD_VERSION: u32 = 1;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PayloadError {
    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("unsupported payload version {found}")]
    UnsupportedVersion { found: u32 },

    #[error("failed to encode payload: {0}")]
    Encode(String),
}

impl From<PayloadError> for StorageError {
    fn from(err: PayloadError) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

#[derive(Serialize)]
struct Envelope<'a, T> {
    version: u32,
    data: &'a T,
}

#[derive(Deserialize)]
struct Header {
    version: u32,
}

#[derive(Deserialize)]
struct OwnedEnvelope<T> {
    data: T,
}

/// Serialize `data` inside a versioned envelope.
///
/// # Errors
///
/// Returns `PayloadError::Encode` if `data` cannot be represented as JSON.
pub fn encode<T: Serialize>(data: &T) -> Result<Vec<u8>, PayloadError> {
    serde_json::to_vec(&Envelope {
        version: PAYLOAD_VERSION,
        data,
    })
    .map_err(|e| PayloadError::Encode(e.to_string()))
}

/// Deserialize a value written by [`encode`].
///
/// # Errors
///
/// Returns `PayloadError::Malformed` for bytes that are not a valid envelope
/// and `PayloadError::UnsupportedVersion` for envelopes from another schema.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, PayloadError> {
    let header: Header =
        serde_json::from_slice(bytes).map_err(|e| PayloadError::Malformed(e.to_string()))?;
    if header.version != PAYLOAD_VERSION {
        return Err(PayloadError::UnsupportedVersion {
            found: header.version,
        });
    }
    let envelope: OwnedEnvelope<T> =
        serde_json::from_slice(bytes).map_err(|e| PayloadError::Malformed(e.to_string()))?;
    Ok(envelope.data)
}
