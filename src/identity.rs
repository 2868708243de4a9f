//! Identity secrets and the public commitment derived from them.

use crate::error::Result;
use crate::hasher::TypedEncoder;
use crate::utils::{field_to_hex, poseidon_hash, FieldElement};
use pasta_curves::group::ff::Field;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

const TRAPDOOR_DOMAIN: &str = "identity_trapdoor";
const NULLIFIER_DOMAIN: &str = "identity_nullifier";

/// An identity's two secrets. Never leaves the holder.
///
/// The only public derivative is [`Identity::commitment`], which is what gets
/// inserted into a group.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(with = "crate::types::field_hex")]
    trapdoor: FieldElement,
    #[serde(with = "crate::types::field_hex")]
    nullifier: FieldElement,
}

impl Identity {
    pub fn new(trapdoor: FieldElement, nullifier: FieldElement) -> Self {
        Self {
            trapdoor,
            nullifier,
        }
    }

    /// Samples both secrets uniformly from the field.
    pub fn random(mut rng: impl RngCore) -> Self {
        Self {
            trapdoor: FieldElement::random(&mut rng),
            nullifier: FieldElement::random(&mut rng),
        }
    }

    /// Deterministically derives an identity from a secret message.
    ///
    /// The same message always yields the same identity. The message must
    /// carry enough entropy to be unguessable.
    pub fn from_message(message: &str) -> Result<Self> {
        let seed = TypedEncoder::new().string(message)?.hash();
        let trapdoor = TypedEncoder::new()
            .field(seed)?
            .string(TRAPDOOR_DOMAIN)?
            .hash();
        let nullifier = TypedEncoder::new()
            .field(seed)?
            .string(NULLIFIER_DOMAIN)?
            .hash();
        Ok(Self {
            trapdoor,
            nullifier,
        })
    }

    #[must_use]
    pub fn trapdoor(&self) -> FieldElement {
        self.trapdoor
    }

    #[must_use]
    pub fn nullifier(&self) -> FieldElement {
        self.nullifier
    }

    /// `Poseidon(nullifier, trapdoor)`, the leaf stored in the group tree.
    #[must_use]
    pub fn commitment(&self) -> FieldElement {
        poseidon_hash(self.nullifier, self.trapdoor)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("commitment", &field_to_hex(self.commitment()))
            .finish_non_exhaustive()
    }
}
