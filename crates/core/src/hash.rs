//! Content identifiers for stored objects

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Length of an [`Id`] in bytes
pub const ID_LEN: usize = 32;

/// BLAKE3 digest identifying an immutable object by its content
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Id([u8; ID_LEN]);

/// Failure to parse an [`Id`] from its hex form
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseIdError {
    #[error("invalid id length: expected {expected} hex characters, got {actual}")]
    Length { expected: usize, actual: usize },

    #[error("invalid id '{input}': {reason}")]
    Hex { input: String, reason: String },
}

impl Id {
    /// Create an id from raw digest bytes
    pub const fn from_bytes(bytes: [u8; ID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }

    /// Lower-case hex encoding (64 characters)
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First eight hex characters, for log output
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a 64 character hex string
    pub fn from_hex(input: &str) -> Result<Self, ParseIdError> {
        if input.len() != ID_LEN * 2 {
            return Err(ParseIdError::Length {
                expected: ID_LEN * 2,
                actual: input.len(),
            });
        }

        let mut bytes = [0u8; ID_LEN];
        hex::decode_to_slice(input, &mut bytes).map_err(|e| ParseIdError::Hex {
            input: input.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self(bytes))
    }
}

impl std::str::FromStr for Id {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.to_hex())
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Hash bytes using BLAKE3
pub fn hash_bytes(data: &[u8]) -> Id {
    Id::from_bytes(*blake3::hash(data).as_bytes())
}
