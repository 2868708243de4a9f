//! Verification gateway: the on-chain-facing entry point.
//!
//! A gateway is bound to one [`VerificationContext`] and one group at
//! construction. For every request it re-derives the external nullifier from
//! that context, rejects already-spent nullifiers before touching the oracle,
//! rejects any root other than the group's current root, verifies the proof,
//! and finally records the nullifier with a single compare-and-insert.
//!
//! ```text
//! Idle -> Verifying -> Accepted
//!                   \-> Rejected
//! ```

use crate::context::{ContextId, VerificationContext};
use crate::error::{ProtocolError, Result};
use crate::group::{GroupId, MembershipWitnessProvider};
use crate::hasher::hash_to_field;
use crate::oracle::{Proof, ProofOracle, PublicInputs};
use crate::store::NullifierStore;
use crate::utils::{field_to_hex, FieldElement};
use log::{debug, info, warn};

/// Lifecycle of a single verification request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationState {
    Idle,
    Verifying,
    Accepted,
    Rejected,
}

impl VerificationState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, VerificationState::Accepted | VerificationState::Rejected)
    }
}

/// Successful verification. `nullifier_hash` doubles as the caller's
/// idempotence key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accepted {
    pub nullifier_hash: FieldElement,
}

/// Verifies proofs for one context and group and keeps the context's spent set.
#[derive(Debug)]
pub struct VerificationGateway<P, O, S> {
    context: VerificationContext,
    context_id: ContextId,
    group_id: GroupId,
    roots: P,
    oracle: O,
    store: S,
}

impl<P, O, S> VerificationGateway<P, O, S>
where
    P: MembershipWitnessProvider,
    O: ProofOracle,
    S: NullifierStore,
{
    /// Binds a gateway to `context` and to group `group_id`, whose current
    /// root is read from `roots` on every request.
    ///
    /// # Errors
    /// [`ProtocolError::Encoding`] if the context cannot be encoded.
    pub fn new(
        context: VerificationContext,
        group_id: GroupId,
        roots: P,
        oracle: O,
        store: S,
    ) -> Result<Self> {
        let context_id = context.id()?;
        info!(
            "Verification gateway bound to context {context} ({context_id}), group {group_id}"
        );
        Ok(Self {
            context,
            context_id,
            group_id,
            roots,
            oracle,
            store,
        })
    }

    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    pub fn roots(&self) -> &P {
        &self.roots
    }

    pub fn context(&self) -> &VerificationContext {
        &self.context
    }

    pub fn context_id(&self) -> ContextId {
        self.context_id
    }

    pub fn external_nullifier(&self) -> Result<FieldElement> {
        self.context.external_nullifier()
    }

    pub fn is_spent(&self, nullifier_hash: FieldElement) -> Result<bool> {
        self.store.contains(self.context_id, nullifier_hash)
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn transition(&self, from: VerificationState, to: VerificationState, nullifier: &str) {
        debug!("[{}] {nullifier}: {from:?} -> {to:?}", self.context);
    }

    fn reject(&self, nullifier: &str, err: ProtocolError) -> Result<Accepted> {
        if err.is_retryable() {
            warn!("[{}] {nullifier}: {err}", self.context);
        } else {
            info!("[{}] {nullifier} rejected: {}", self.context, err.kind());
        }
        self.transition(VerificationState::Verifying, VerificationState::Rejected, nullifier);
        Err(err)
    }

    /// Verifies `proof` and records `nullifier_hash` as spent.
    ///
    /// # Errors
    /// - [`ProtocolError::DuplicateNullifier`] if already spent in this context.
    /// - [`ProtocolError::InvalidProof`] if `claimed_root` is not the group's
    ///   current root or the oracle rejects the proof.
    /// - [`ProtocolError::ExternalServiceUnavailable`] if the root source or
    ///   the oracle failed; nothing was recorded.
    /// - [`ProtocolError::UnknownGroup`] if the bound group does not exist.
    pub fn verify_and_record(
        &self,
        claimed_root: FieldElement,
        nullifier_hash: FieldElement,
        signal: &[u8],
        proof: &Proof,
    ) -> Result<Accepted> {
        let nullifier = field_to_hex(nullifier_hash);
        self.transition(VerificationState::Idle, VerificationState::Verifying, &nullifier);

        let external_nullifier = match self.context.external_nullifier() {
            Ok(value) => value,
            Err(e) => return self.reject(&nullifier, e),
        };

        match self.store.contains(self.context_id, nullifier_hash) {
            Ok(true) => return self.reject(&nullifier, ProtocolError::DuplicateNullifier),
            Ok(false) => {}
            Err(e) => return self.reject(&nullifier, e),
        }

        match self.roots.root(self.group_id) {
            Ok(current) if current == claimed_root => {}
            Ok(_) => {
                debug!(
                    "[{}] {nullifier}: claimed root is not the current root of group {}",
                    self.context, self.group_id
                );
                return self.reject(&nullifier, ProtocolError::InvalidProof);
            }
            Err(e) => return self.reject(&nullifier, e),
        }

        let inputs = PublicInputs {
            root: claimed_root,
            nullifier_hash,
            external_nullifier,
            signal_hash: hash_to_field(signal),
        };

        match self.oracle.verify(&inputs, proof) {
            Ok(true) => {}
            Ok(false) => return self.reject(&nullifier, ProtocolError::InvalidProof),
            Err(ProtocolError::ExternalServiceUnavailable(reason)) => {
                return self.reject(&nullifier, ProtocolError::ExternalServiceUnavailable(reason))
            }
            // Anything else from the backend is reported without its cause.
            Err(e) => {
                debug!("Oracle error treated as invalid proof: {}", e.kind());
                return self.reject(&nullifier, ProtocolError::InvalidProof);
            }
        }

        match self.store.insert_if_absent(self.context_id, nullifier_hash) {
            Ok(true) => {
                self.transition(
                    VerificationState::Verifying,
                    VerificationState::Accepted,
                    &nullifier,
                );
                info!("[{}] accepted nullifier {nullifier}", self.context);
                Ok(Accepted { nullifier_hash })
            }
            // Lost the race to a concurrent request with the same nullifier.
            Ok(false) => self.reject(&nullifier, ProtocolError::DuplicateNullifier),
            Err(e) => self.reject(&nullifier, e),
        }
    }
}
