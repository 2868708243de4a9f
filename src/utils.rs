//! Hex validation, byte/field conversion and Poseidon helpers.

use crate::error::{ProtocolError, Result};
use halo2_gadgets::poseidon::primitives::{
    self as poseidon, ConstantLength, P128Pow5T3 as PoseidonSpec,
};
use pasta_curves::group::ff::PrimeField;
use pasta_curves::pallas;

/// Scalar field every protocol value lives in.
pub type FieldElement = pallas::Base;

pub const FIELD_BYTES: usize = 32;

fn is_valid_hex_string(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_hexdigit())
}

fn strip_hex_prefix(input: &str) -> &str {
    input
        .trim()
        .strip_prefix("0x")
        .or_else(|| input.trim().strip_prefix("0X"))
        .unwrap_or_else(|| input.trim())
}

/// Validates and strips hex prefix from a string.
///
/// # Errors
/// Returns [`ProtocolError::Encoding`] if the stripped string has the wrong
/// length or contains non-hex characters.
///
/// # Examples
///
/// ```
/// use zkp_uniqueness::utils::validate_and_strip_hex;
///
/// let result = validate_and_strip_hex("0x1234abcd", 8).unwrap();
/// assert_eq!(result, "1234abcd");
/// ```
pub fn validate_and_strip_hex(input: &str, expected_len: usize) -> Result<String> {
    let stripped = strip_hex_prefix(input);

    if stripped.len() != expected_len {
        return Err(ProtocolError::Encoding(format!(
            "Invalid hex string: must be {} characters (got {})",
            expected_len,
            stripped.len()
        )));
    }

    if !is_valid_hex_string(stripped) {
        return Err(ProtocolError::Encoding(
            "Invalid hex string: contains non-hex characters".to_string(),
        ));
    }

    Ok(stripped.to_string())
}

/// Decodes an arbitrary-length hex string (optional `0x` prefix).
pub fn decode_hex(input: &str) -> Result<Vec<u8>> {
    hex::decode(strip_hex_prefix(input))
        .map_err(|e| ProtocolError::Encoding(format!("Invalid hex '{input}': {e}")))
}

const BASE_U64: u64 = 256;

/// Interprets 32 bytes as a big-endian integer and reduces it into the field.
///
/// Values below the modulus (every FieldHasher output) map exactly.
#[inline]
#[must_use]
pub fn bytes_to_field(bytes: &[u8; FIELD_BYTES]) -> FieldElement {
    let mut value = pallas::Base::zero();
    let base = pallas::Base::from(BASE_U64);

    for &byte in bytes.iter() {
        value = value * base + pallas::Base::from(byte as u64);
    }

    value
}

/// Canonical little-endian representation of a field element.
#[inline]
#[must_use]
pub fn field_to_bytes(field: FieldElement) -> [u8; FIELD_BYTES] {
    let mut bytes = [0u8; FIELD_BYTES];
    let repr = field.to_repr();
    bytes.copy_from_slice(repr.as_ref());
    bytes
}

/// Big-endian representation, used wherever a field element is hashed as bytes.
#[inline]
#[must_use]
pub fn field_to_be_bytes(field: FieldElement) -> [u8; FIELD_BYTES] {
    let mut bytes = field_to_bytes(field);
    bytes.reverse();
    bytes
}

/// Parses a canonical little-endian representation. Non-canonical encodings
/// (values at or above the modulus) are rejected.
pub fn field_from_bytes(bytes: &[u8; FIELD_BYTES]) -> Result<FieldElement> {
    Option::from(pallas::Base::from_repr(*bytes))
        .ok_or_else(|| ProtocolError::Encoding("non-canonical field element".to_string()))
}

/// Hex form of [`field_to_bytes`].
#[must_use]
pub fn field_to_hex(field: FieldElement) -> String {
    hex::encode(field_to_bytes(field))
}

/// Inverse of [`field_to_hex`].
pub fn field_from_hex(input: &str) -> Result<FieldElement> {
    let stripped = validate_and_strip_hex(input, FIELD_BYTES * 2)?;
    let bytes = decode_hex(&stripped)?;
    let mut arr = [0u8; FIELD_BYTES];
    arr.copy_from_slice(&bytes);
    field_from_bytes(&arr)
}

/// Poseidon hash of two field elements with the `P128Pow5T3` parameters.
///
/// Width 3, rate 2, constant input length 2. The same parameters are used by
/// the in-circuit gadget, so native and circuit values agree.
///
/// # Example
///
/// ```
/// use zkp_uniqueness::utils::poseidon_hash;
/// use pasta_curves::pallas;
///
/// let left = pallas::Base::from(1);
/// let right = pallas::Base::from(2);
/// assert_ne!(poseidon_hash(left, right), poseidon_hash(right, left));
/// ```
#[inline]
#[must_use]
pub fn poseidon_hash(left: FieldElement, right: FieldElement) -> FieldElement {
    let inputs = [left, right];
    poseidon::Hash::<_, PoseidonSpec, ConstantLength<2>, 3, 2>::init().hash(inputs)
}
