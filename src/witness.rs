//! Assembly of the full prover input.

use crate::error::{ProtocolError, Result};
use crate::hasher::hash_to_field;
use crate::identity::Identity;
use crate::merkle::MembershipWitness;
use crate::nullifier::compute_nullifier_hash;
use crate::oracle::PublicInputs;
use crate::utils::{poseidon_hash, FieldElement};
use log::debug;

/// Structured input consumed by a [`ProofOracle`](crate::oracle::ProofOracle).
///
/// Field order mirrors the prover's input layout.
#[derive(Clone, PartialEq, Eq)]
pub struct Witness {
    pub identity_nullifier: FieldElement,
    pub identity_trapdoor: FieldElement,
    pub tree_path_indices: Vec<bool>,
    pub tree_siblings: Vec<FieldElement>,
    pub external_nullifier: FieldElement,
    pub signal_hash: FieldElement,
}

impl Witness {
    #[must_use]
    pub fn depth(&self) -> usize {
        self.tree_siblings.len()
    }

    pub fn is_well_formed(&self) -> bool {
        self.tree_path_indices.len() == self.tree_siblings.len() && !self.tree_siblings.is_empty()
    }

    /// Public values implied by this witness, computed natively.
    pub fn public_inputs(&self) -> Result<PublicInputs> {
        if !self.is_well_formed() {
            return Err(ProtocolError::MalformedWitness(format!(
                "path has {} indices but {} siblings",
                self.tree_path_indices.len(),
                self.tree_siblings.len()
            )));
        }

        let commitment = poseidon_hash(self.identity_nullifier, self.identity_trapdoor);
        let path = MembershipWitness {
            path_indices: self.tree_path_indices.clone(),
            siblings: self.tree_siblings.clone(),
        };

        Ok(PublicInputs {
            root: path.compute_root(commitment)?,
            nullifier_hash: compute_nullifier_hash(
                self.identity_nullifier,
                self.external_nullifier,
            ),
            external_nullifier: self.external_nullifier,
            signal_hash: self.signal_hash,
        })
    }
}

impl std::fmt::Debug for Witness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Witness")
            .field("depth", &self.depth())
            .field("external_nullifier", &self.external_nullifier)
            .field("signal_hash", &self.signal_hash)
            .finish_non_exhaustive()
    }
}

/// Combines identity secrets, the membership path, the scope and the signal.
///
/// # Errors
/// [`ProtocolError::MalformedWitness`] unless both path sequences have exactly
/// `depth` entries.
pub fn assemble(
    identity: &Identity,
    membership: &MembershipWitness,
    depth: u32,
    external_nullifier: FieldElement,
    signal: &[u8],
) -> Result<Witness> {
    let depth = depth as usize;
    if membership.path_indices.len() != depth || membership.siblings.len() != depth {
        return Err(ProtocolError::MalformedWitness(format!(
            "expected {} path indices and siblings, got {} and {}",
            depth,
            membership.path_indices.len(),
            membership.siblings.len()
        )));
    }

    debug!("Assembling witness of depth {depth} for a {}-byte signal", signal.len());

    Ok(Witness {
        identity_nullifier: identity.nullifier(),
        identity_trapdoor: identity.trapdoor(),
        tree_path_indices: membership.path_indices.clone(),
        tree_siblings: membership.siblings.clone(),
        external_nullifier,
        signal_hash: hash_to_field(signal),
    })
}
