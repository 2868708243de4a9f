//! External nullifier and nullifier hash derivation.
//!
//! The external nullifier scopes a proof to one `(application, action)` pair:
//!
//! ```text
//! app_hash           = H(enc(string app_id))
//! external_nullifier = H(enc(field app_hash, string action))
//! ```
//!
//! where `H` is [`hash_to_field`](crate::hasher::hash_to_field) and `enc` is the
//! tagged encoding of [`TypedEncoder`]. The nullifier hash binds an identity to
//! that scope: `Poseidon(external_nullifier, identity_nullifier)`. Equal inputs
//! give equal hashes, any change in scope gives an unrelated value.

use crate::error::Result;
use crate::hasher::TypedEncoder;
use crate::utils::{poseidon_hash, FieldElement};
use log::debug;

/// Hash of the application id alone.
pub fn app_id_hash(app_id: &str) -> Result<FieldElement> {
    Ok(TypedEncoder::new().string(app_id)?.hash())
}

/// Derives the external nullifier for `(app_id, action)`.
///
/// # Examples
///
/// ```
/// use zkp_uniqueness::nullifier::build_external_nullifier;
///
/// let a = build_external_nullifier("app_1234", "wid_test_1234").unwrap();
/// let b = build_external_nullifier("app_1234", "wid_test_1234").unwrap();
/// let c = build_external_nullifier("app_1234", "wid_test_5678").unwrap();
/// assert_eq!(a, b);
/// assert_ne!(a, c);
/// ```
pub fn build_external_nullifier(app_id: &str, action: &str) -> Result<FieldElement> {
    let app_hash = app_id_hash(app_id)?;
    let scoped = TypedEncoder::new().field(app_hash)?.string(action)?.hash();
    debug!("Derived external nullifier for app '{app_id}', action '{action}'");
    Ok(scoped)
}

/// Per-(identity, scope) anti-replay token.
#[must_use]
#[inline]
pub fn compute_nullifier_hash(
    identity_nullifier: FieldElement,
    external_nullifier: FieldElement,
) -> FieldElement {
    poseidon_hash(external_nullifier, identity_nullifier)
}
