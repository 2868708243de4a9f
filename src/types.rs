//! Wire types shared by the prover and verifier binaries.

use crate::error::{ProtocolError, Result};
use crate::gateway::Accepted;
use crate::group::GroupId;
use crate::oracle::Proof;
use crate::utils::{decode_hex, field_from_hex, field_to_hex, FieldElement, FIELD_BYTES};
use log::debug;
use serde::{Deserialize, Serialize};

/// Serde adapter storing a field element as its canonical hex encoding.
pub mod field_hex {
    use crate::utils::{field_from_hex, field_to_hex, FieldElement};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &FieldElement, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&field_to_hex(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<FieldElement, D::Error> {
        let s = String::deserialize(d)?;
        field_from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Everything a verifier needs to check one proof, as written by the prover.
///
/// Field elements are hex strings of their canonical 32-byte encoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofEnvelope {
    /// Application the proof was scoped to.
    pub app_id: String,
    /// Action within the application.
    pub action: String,
    /// Group whose root the proof was built against.
    pub group_id: GroupId,
    /// Tree depth of that group.
    pub depth: u32,
    /// Merkle root at proof time.
    pub merkle_root: String,
    /// Nullifier hash for `(identity, app_id, action)`.
    pub nullifier_hash: String,
    /// Signal bytes, hex encoded.
    pub signal: String,
    /// Opaque proof bytes.
    pub proof: Proof,
    /// Unix timestamp when proof was generated
    pub timestamp: u64,
}

/// Decoded, validated public part of a [`ProofEnvelope`].
#[derive(Debug, Clone)]
pub struct DecodedEnvelope {
    pub root: FieldElement,
    pub nullifier_hash: FieldElement,
    pub signal: Vec<u8>,
}

/// Limits applied by [`ProofEnvelope::validate`].
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeLimits {
    pub max_proof_size: usize,
    pub timestamp_tolerance_secs: u64,
    pub timestamp_max_age_secs: u64,
}

impl ProofEnvelope {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        app_id: &str,
        action: &str,
        group_id: GroupId,
        depth: u32,
        root: FieldElement,
        nullifier_hash: FieldElement,
        signal: &[u8],
        proof: Proof,
        timestamp: u64,
    ) -> Self {
        Self {
            app_id: app_id.to_string(),
            action: action.to_string(),
            group_id,
            depth,
            merkle_root: field_to_hex(root),
            nullifier_hash: field_to_hex(nullifier_hash),
            signal: hex::encode(signal),
            proof,
            timestamp,
        }
    }

    /// Checks structure, encodings, size and age, then decodes the public values.
    ///
    /// # Errors
    /// [`ProtocolError::Encoding`] for malformed fields and
    /// [`ProtocolError::MalformedWitness`] for empty/oversized proofs or
    /// timestamps outside the accepted window.
    pub fn validate(&self, limits: &EnvelopeLimits, now: u64) -> Result<DecodedEnvelope> {
        debug!("Starting proof envelope validation");
        debug!("Context: {}/{}", self.app_id, self.action);
        debug!("Proof size: {} bytes", self.proof.len());
        debug!("Timestamp: {} (now {})", self.timestamp, now);

        if self.app_id.is_empty() || self.action.is_empty() {
            return Err(ProtocolError::Encoding(
                "app_id and action cannot be empty".to_string(),
            ));
        }
        if self.proof.is_empty() {
            return Err(ProtocolError::MalformedWitness(
                "ZK proof cannot be empty. The proof data is missing.".to_string(),
            ));
        }
        if self.proof.len() > limits.max_proof_size {
            return Err(ProtocolError::MalformedWitness(format!(
                "ZK proof size exceeds limit: {} bytes (max {} bytes)",
                self.proof.len(),
                limits.max_proof_size
            )));
        }

        if self.timestamp > now + limits.timestamp_tolerance_secs {
            return Err(ProtocolError::MalformedWitness(format!(
                "Timestamp is too far in the future: {} (current: {}, tolerance: {}s)",
                self.timestamp, now, limits.timestamp_tolerance_secs
            )));
        }
        if now > self.timestamp + limits.timestamp_max_age_secs {
            return Err(ProtocolError::MalformedWitness(format!(
                "Timestamp is too old: {} (current: {}, max age: {}s). Please generate a fresh proof.",
                self.timestamp, now, limits.timestamp_max_age_secs
            )));
        }

        let root = field_from_hex(&self.merkle_root).map_err(|e| {
            ProtocolError::Encoding(format!(
                "Invalid merkle root '{}': {e}. Expected {FIELD_BYTES}-byte hex string.",
                self.merkle_root
            ))
        })?;
        let nullifier_hash = field_from_hex(&self.nullifier_hash).map_err(|e| {
            ProtocolError::Encoding(format!(
                "Invalid nullifier hash '{}': {e}. Expected {FIELD_BYTES}-byte hex string.",
                self.nullifier_hash
            ))
        })?;
        let signal = decode_hex(&self.signal)?;

        Ok(DecodedEnvelope {
            root,
            nullifier_hash,
            signal,
        })
    }
}

/// Verifier's report for one envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerificationReport {
    pub accepted: bool,
    /// Rejection kind, e.g. `DuplicateNullifier`; absent when accepted.
    pub reason: Option<String>,
    pub nullifier_hash: String,
}

impl VerificationReport {
    pub fn from_outcome(nullifier_hash: FieldElement, outcome: &Result<Accepted>) -> Self {
        match outcome {
            Ok(_) => Self {
                accepted: true,
                reason: None,
                nullifier_hash: field_to_hex(nullifier_hash),
            },
            Err(e) => Self {
                accepted: false,
                reason: Some(e.kind().to_string()),
                nullifier_hash: field_to_hex(nullifier_hash),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pasta_curves::pallas;

    const NOW: u64 = 1_700_000_000;

    fn limits() -> EnvelopeLimits {
        EnvelopeLimits {
            max_proof_size: 1024,
            timestamp_tolerance_secs: 30,
            timestamp_max_age_secs: 86400,
        }
    }

    fn envelope() -> ProofEnvelope {
        ProofEnvelope::new(
            "app_1234",
            "wid_test_1234",
            1,
            20,
            pallas::Base::from(10),
            pallas::Base::from(20),
            &[0xab; 20],
            Proof::from_bytes(vec![1, 2, 3]),
            NOW,
        )
    }

    #[test]
    fn test_valid_envelope_decodes() {
        let decoded = envelope().validate(&limits(), NOW).unwrap();
        assert_eq!(decoded.root, pallas::Base::from(10));
        assert_eq!(decoded.nullifier_hash, pallas::Base::from(20));
        assert_eq!(decoded.signal, vec![0xab; 20]);
    }

    #[test]
    fn test_json_round_trip_keeps_proof_bytes() {
        let json = serde_json::to_string(&envelope()).unwrap();
        assert!(json.contains("\"proof\":\"010203\""));
        let parsed: ProofEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.proof.as_bytes(), &[1, 2, 3]);
    }

    #[test]
    fn test_rejects_stale_and_future_timestamps() {
        let mut env = envelope();
        env.timestamp = NOW - 86401;
        assert!(env.validate(&limits(), NOW).is_err());
        env.timestamp = NOW + 31;
        assert!(env.validate(&limits(), NOW).is_err());
    }

    #[test]
    fn test_rejects_bad_hex_and_sizes() {
        let mut env = envelope();
        env.merkle_root = "zz".to_string();
        assert!(matches!(
            env.validate(&limits(), NOW),
            Err(ProtocolError::Encoding(_))
        ));

        let mut env = envelope();
        env.proof = Proof::from_bytes(vec![0u8; 2048]);
        assert!(env.validate(&limits(), NOW).is_err());

        let mut env = envelope();
        env.proof = Proof::from_bytes(Vec::new());
        assert!(env.validate(&limits(), NOW).is_err());
    }

    #[test]
    fn test_report_names_rejection_kind() {
        let report = VerificationReport::from_outcome(
            pallas::Base::from(1),
            &Err(ProtocolError::DuplicateNullifier),
        );
        assert!(!report.accepted);
        assert_eq!(report.reason.as_deref(), Some("DuplicateNullifier"));
    }
}
