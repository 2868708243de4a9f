//! The proof-system boundary.
//!
//! [`ProofOracle`] is the only contract the protocol relies on: `prove` turns a
//! [`Witness`] into a nullifier hash and an opaque proof, `verify` accepts a
//! proof iff some member of the tree under `root` produced it for exactly these
//! public inputs. Soundness and zero knowledge are the backend's job.
//!
//! Backends:
//! - [`Halo2Oracle`](crate::circuit::Halo2Oracle): real Halo2 proofs.
//! - [`MockProofOracle`]: keyed-hash fake for fast tests.
//! - [`TimeoutOracle`]: deadline wrapper around any backend.

use crate::deadline::Deadline;
use crate::error::Result;
use crate::utils::{field_to_be_bytes, FieldElement};
use crate::witness::Witness;
use log::debug;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::sync::Arc;
use std::time::Duration;

/// Opaque proof bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof(#[serde(with = "hex::serde")] Vec<u8>);

impl Proof {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Values a proof is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicInputs {
    pub root: FieldElement,
    pub nullifier_hash: FieldElement,
    pub external_nullifier: FieldElement,
    pub signal_hash: FieldElement,
}

impl PublicInputs {
    /// Instance column layout: root, nullifier hash, external nullifier, signal hash.
    #[must_use]
    pub fn to_instance(&self) -> Vec<FieldElement> {
        vec![
            self.root,
            self.nullifier_hash,
            self.external_nullifier,
            self.signal_hash,
        ]
    }
}

/// Opaque prover/verifier.
pub trait ProofOracle: Send + Sync {
    /// Produces `(nullifier_hash, proof)`. The hash is a pure function of the
    /// identity nullifier and external nullifier; proof bytes may be randomized.
    fn prove(&self, witness: &Witness) -> Result<(FieldElement, Proof)>;

    /// `Ok(false)` for any proof that does not match `inputs`. `Err` is kept
    /// for collaborator failures.
    fn verify(&self, inputs: &PublicInputs, proof: &Proof) -> Result<bool>;
}

impl<O: ProofOracle + ?Sized> ProofOracle for Arc<O> {
    fn prove(&self, witness: &Witness) -> Result<(FieldElement, Proof)> {
        (**self).prove(witness)
    }

    fn verify(&self, inputs: &PublicInputs, proof: &Proof) -> Result<bool> {
        (**self).verify(inputs, proof)
    }
}

const MOCK_NONCE_LEN: usize = 32;
const MOCK_TAG_LEN: usize = 32;

/// Test double: a proof is `nonce || Keccak256(key || nonce || inputs)`.
///
/// Accepts iff the tag was produced by an oracle holding the same key for the
/// same public inputs, which is exactly when the proving witness was
/// structurally valid and reconstructs the claimed root. Provides no privacy.
#[derive(Debug, Clone)]
pub struct MockProofOracle {
    key: [u8; 32],
}

impl Default for MockProofOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProofOracle {
    /// Oracle with a fresh random key.
    pub fn new() -> Self {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        Self { key }
    }

    pub fn with_key(key: [u8; 32]) -> Self {
        Self { key }
    }

    fn tag(&self, nonce: &[u8], inputs: &PublicInputs) -> [u8; MOCK_TAG_LEN] {
        let mut hasher = Keccak256::new();
        hasher.update(self.key);
        hasher.update(nonce);
        for value in inputs.to_instance() {
            hasher.update(field_to_be_bytes(value));
        }
        hasher.finalize().into()
    }
}

impl ProofOracle for MockProofOracle {
    fn prove(&self, witness: &Witness) -> Result<(FieldElement, Proof)> {
        let inputs = witness.public_inputs()?;

        let mut bytes = vec![0u8; MOCK_NONCE_LEN];
        OsRng.fill_bytes(&mut bytes);
        let tag = self.tag(&bytes, &inputs);
        bytes.extend_from_slice(&tag);

        Ok((inputs.nullifier_hash, Proof(bytes)))
    }

    fn verify(&self, inputs: &PublicInputs, proof: &Proof) -> Result<bool> {
        if proof.len() != MOCK_NONCE_LEN + MOCK_TAG_LEN {
            debug!("Mock proof has unexpected length {}", proof.len());
            return Ok(false);
        }
        let (nonce, tag) = proof.as_bytes().split_at(MOCK_NONCE_LEN);
        Ok(self.tag(nonce, inputs)[..] == *tag)
    }
}

/// Bounds every oracle call by a [`Deadline`].
///
/// A missed deadline returns
/// [`ProtocolError::ExternalServiceUnavailable`](crate::error::ProtocolError::ExternalServiceUnavailable).
/// The abandoned call keeps its worker thread until the backend returns; at
/// most [`Deadline::max_in_flight`] such workers exist, further calls are
/// refused as unavailable until one finishes.
#[derive(Debug)]
pub struct TimeoutOracle<O> {
    inner: Arc<O>,
    deadline: Deadline,
}

impl<O> Clone for TimeoutOracle<O> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            deadline: self.deadline.clone(),
        }
    }
}

impl<O: ProofOracle + 'static> TimeoutOracle<O> {
    pub fn new(inner: O, timeout: Duration) -> Self {
        Self::from_arc(Arc::new(inner), timeout)
    }

    pub fn from_arc(inner: Arc<O>, timeout: Duration) -> Self {
        Self {
            inner,
            deadline: Deadline::new(timeout),
        }
    }

    #[must_use]
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.deadline = self.deadline.with_max_in_flight(max_in_flight);
        self
    }

    pub fn deadline(&self) -> &Deadline {
        &self.deadline
    }
}

impl<O: ProofOracle + 'static> ProofOracle for TimeoutOracle<O> {
    fn prove(&self, witness: &Witness) -> Result<(FieldElement, Proof)> {
        let witness = witness.clone();
        self.deadline
            .run(&self.inner, "oracle-prove", move |oracle| oracle.prove(&witness))
    }

    fn verify(&self, inputs: &PublicInputs, proof: &Proof) -> Result<bool> {
        let inputs = *inputs;
        let proof = proof.clone();
        self.deadline
            .run(&self.inner, "oracle-verify", move |oracle| {
                oracle.verify(&inputs, &proof)
            })
    }
}
