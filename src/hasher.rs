//! Hashing arbitrary bytes into the proof system's scalar field.
//!
//! The digest is Keccak-256 read as a big-endian integer and shifted right by
//! [`TRUNCATION_BITS`]. The 248-bit result is always below the Pallas modulus,
//! so the conversion into the field never reduces.
//!
//! [`TypedEncoder`] produces the tagged, length-prefixed byte strings that are
//! fed to the hasher when more than one value has to be bound together.

use crate::error::{ProtocolError, Result};
use crate::utils::{bytes_to_field, field_to_be_bytes, FieldElement, FIELD_BYTES};
use sha3::{Digest, Keccak256};

/// Number of low bits dropped from the digest.
pub const TRUNCATION_BITS: u32 = 8;

const TAG_FIELD: u8 = 0x01;
const TAG_STRING: u8 = 0x02;
const TAG_BYTES: u8 = 0x03;

/// Hashes bytes into the field: `keccak256(bytes) >> 8`.
///
/// # Examples
///
/// ```
/// use zkp_uniqueness::hasher::hash_to_field;
///
/// assert_eq!(hash_to_field(b"signal"), hash_to_field(b"signal"));
/// assert_ne!(hash_to_field(b"signal"), hash_to_field(b"signal2"));
/// ```
#[must_use]
pub fn hash_to_field(bytes: &[u8]) -> FieldElement {
    let digest: [u8; FIELD_BYTES] = Keccak256::digest(bytes).into();
    bytes_to_field(&shift_right_bytes(&digest))
}

/// Checks that an externally supplied identifier is UTF-8 before it is hashed
/// as a string item.
///
/// # Errors
/// Returns [`ProtocolError::Encoding`] naming `what` on invalid UTF-8.
pub fn require_utf8<'a>(bytes: &'a [u8], what: &str) -> Result<&'a str> {
    std::str::from_utf8(bytes)
        .map_err(|e| ProtocolError::Encoding(format!("{what} is not valid UTF-8: {e}")))
}

/// Shifts a big-endian 256-bit integer right by one byte.
fn shift_right_bytes(digest: &[u8; FIELD_BYTES]) -> [u8; FIELD_BYTES] {
    let shift = (TRUNCATION_BITS / 8) as usize;
    let mut out = [0u8; FIELD_BYTES];
    out[shift..].copy_from_slice(&digest[..FIELD_BYTES - shift]);
    out
}

/// Order-preserving, type-tagged concatenation.
///
/// Each item is written as `tag || len (u32, big-endian) || payload`, so two
/// different item sequences can never produce the same byte string.
#[derive(Debug, Default, Clone)]
pub struct TypedEncoder {
    buf: Vec<u8>,
}

impl TypedEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, tag: u8, payload: &[u8]) -> Result<Self> {
        let len = u32::try_from(payload.len()).map_err(|_| {
            ProtocolError::Encoding(format!("item of {} bytes is too long", payload.len()))
        })?;
        self.buf.push(tag);
        self.buf.extend_from_slice(&len.to_be_bytes());
        self.buf.extend_from_slice(payload);
        Ok(self)
    }

    pub fn field(self, value: FieldElement) -> Result<Self> {
        self.push(TAG_FIELD, &field_to_be_bytes(value))
    }

    pub fn string(self, value: &str) -> Result<Self> {
        self.push(TAG_STRING, value.as_bytes())
    }

    pub fn bytes(self, value: &[u8]) -> Result<Self> {
        self.push(TAG_BYTES, value)
    }

    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }

    /// Convenience for `hash_to_field(self.finish())`.
    #[must_use]
    pub fn hash(self) -> FieldElement {
        hash_to_field(&self.buf)
    }
}
