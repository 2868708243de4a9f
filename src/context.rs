//! Verification contexts: the fixed `(application, action)` scope a gateway
//! is deployed for.

use crate::error::Result;
use crate::hasher::{require_utf8, TypedEncoder};
use crate::nullifier::build_external_nullifier;
use crate::utils::{field_to_bytes, FieldElement, FIELD_BYTES};
use serde::{Deserialize, Serialize};
use std::fmt;

const CONTEXT_DOMAIN: &str = "verification_context";

/// Key under which spent nullifiers of one context are recorded.
///
/// Holds the canonical bytes of a field element so it can key hash maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(pub [u8; FIELD_BYTES]);

impl ContextId {
    pub fn from_field(value: FieldElement) -> Self {
        Self(field_to_bytes(value))
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// An application and action, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationContext {
    app_id: String,
    action: String,
}

impl VerificationContext {
    pub fn new(app_id: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            action: action.into(),
        }
    }

    /// Builds a context from raw identifiers, such as command-line arguments.
    ///
    /// # Errors
    /// [`ProtocolError::Encoding`](crate::error::ProtocolError::Encoding) if
    /// either identifier is not UTF-8.
    pub fn from_bytes(app_id: &[u8], action: &[u8]) -> Result<Self> {
        Ok(Self::new(
            require_utf8(app_id, "application id")?,
            require_utf8(action, "action")?,
        ))
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    /// Always re-derived from the stored pair.
    pub fn external_nullifier(&self) -> Result<FieldElement> {
        build_external_nullifier(&self.app_id, &self.action)
    }

    pub fn id(&self) -> Result<ContextId> {
        let id = TypedEncoder::new()
            .string(CONTEXT_DOMAIN)?
            .string(&self.app_id)?
            .string(&self.action)?
            .hash();
        Ok(ContextId::from_field(id))
    }
}

impl fmt::Display for VerificationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.app_id, self.action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtocolError;

    #[test]
    fn test_context_id_is_stable_and_scoped() {
        let a = VerificationContext::new("app_1234", "wid_test_1234");
        let b = VerificationContext::new("app_1234", "wid_test_1234");
        let c = VerificationContext::new("app_1234", "other");
        assert_eq!(a.id().unwrap(), b.id().unwrap());
        assert_ne!(a.id().unwrap(), c.id().unwrap());
    }

    #[test]
    fn test_context_id_is_not_the_external_nullifier() {
        let ctx = VerificationContext::new("app", "act");
        assert_ne!(
            ctx.id().unwrap(),
            ContextId::from_field(ctx.external_nullifier().unwrap())
        );
    }

    #[test]
    fn test_from_bytes_requires_utf8() {
        let err = VerificationContext::from_bytes(&[0xff, 0xfe], b"act").unwrap_err();
        assert!(matches!(err, ProtocolError::Encoding(_)));
        let err = VerificationContext::from_bytes(b"app", &[0xc3, 0x28]).unwrap_err();
        assert!(matches!(err, ProtocolError::Encoding(_)));

        let ctx = VerificationContext::from_bytes(b"app", b"act").unwrap();
        assert_eq!(ctx, VerificationContext::new("app", "act"));
        assert_eq!(
            ctx.external_nullifier().unwrap(),
            crate::nullifier::build_external_nullifier("app", "act").unwrap()
        );
    }
}
