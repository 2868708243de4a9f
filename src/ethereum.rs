//! Ethereum addresses as signals.
//!
//! The usual signal is the address that should benefit from the action. It is
//! hashed as its 20 raw bytes, never as the hex text.

use crate::error::{ProtocolError, Result};
use crate::utils::validate_and_strip_hex;
use ethers::types::Address;
use std::str::FromStr;

/// Expected length of an Ethereum address in hex characters (excluding 0x prefix)
pub const ADDRESS_HEX_LENGTH: usize = 40;

/// Returns a lowercase hex string without the 0x prefix.
///
/// # Examples
///
/// ```
/// use zkp_uniqueness::ethereum::normalize_address;
///
/// let normalized = normalize_address("0x742d35Cc6634C0532925a3b844Bc454e4438f44e").unwrap();
/// assert_eq!(normalized, "742d35cc6634c0532925a3b844bc454e4438f44e");
/// ```
pub fn normalize_address(address: &str) -> Result<String> {
    validate_and_strip_hex(address, ADDRESS_HEX_LENGTH).map(|s| s.to_lowercase())
}

/// Parses an address into its 20 signal bytes.
///
/// # Errors
/// [`ProtocolError::Encoding`] for malformed input or the zero address.
pub fn address_to_signal(address: &str) -> Result<[u8; 20]> {
    let normalized = normalize_address(address)?;
    let parsed = Address::from_str(&normalized)
        .map_err(|e| ProtocolError::Encoding(format!("Invalid address '{address}': {e}")))?;
    if parsed == Address::zero() {
        return Err(ProtocolError::Encoding(
            "The zero address cannot be used as a signal".to_string(),
        ));
    }
    Ok(parsed.to_fixed_bytes())
}

/// Signal bytes for CLI input: addresses become 20 raw bytes, anything else
/// is taken as UTF-8 text.
pub fn parse_signal(input: &str) -> Result<Vec<u8>> {
    let trimmed = input.trim();
    if trimmed.starts_with("0x") && trimmed.len() == ADDRESS_HEX_LENGTH + 2 {
        return address_to_signal(trimmed).map(|a| a.to_vec());
    }
    Ok(trimmed.as_bytes().to_vec())
}
