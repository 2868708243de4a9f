//! Anonymous proof-of-uniqueness.
//!
//! A member of a group proves, without revealing which member they are, that
//! they belong to the group (identified by a Merkle root) and that they act at
//! most once per application-scoped action.
//!
//! # Components
//!
//! - [`hasher`]: bytes into the scalar field (`keccak256 >> 8`)
//! - [`nullifier`]: external nullifier and nullifier hash derivation
//! - [`identity`]: identity secrets and commitment
//! - [`group`]: membership-witness provider interface and in-memory groups
//! - [`witness`]: prover input assembly
//! - [`oracle`] / [`circuit`]: the proof-system boundary and its Halo2 backend
//! - [`gateway`]: replay-safe verification over a [`store::NullifierStore`],
//!   bound to one group's current root
//! - [`deadline`]: timeout bounds for the external collaborators
//!
//! # Example
//!
//! ```no_run
//! use zkp_uniqueness::{
//!     gateway::VerificationGateway, group::{GroupStore, MembershipWitnessProvider},
//!     identity::Identity, oracle::{MockProofOracle, ProofOracle},
//!     store::MemoryNullifierStore, witness::assemble, VerificationContext,
//! };
//! use pasta_curves::pallas;
//! use std::sync::Arc;
//!
//! let identity = Identity::from_message("my secret").unwrap();
//! let groups = Arc::new(GroupStore::new());
//! groups.create_group(1, 20, pallas::Base::zero()).unwrap();
//! groups.add_member(1, identity.commitment()).unwrap();
//!
//! let context = VerificationContext::new("app_1234", "wid_test_1234");
//! let oracle = MockProofOracle::new();
//! let membership = groups.prove(1, identity.commitment()).unwrap();
//! let witness = assemble(
//!     &identity, &membership, 20, context.external_nullifier().unwrap(), b"signal",
//! ).unwrap();
//! let (nullifier_hash, proof) = oracle.prove(&witness).unwrap();
//!
//! let gateway = VerificationGateway::new(
//!     context, 1, Arc::clone(&groups), oracle, MemoryNullifierStore::new(),
//! ).unwrap();
//! gateway
//!     .verify_and_record(groups.root(1).unwrap(), nullifier_hash, b"signal", &proof)
//!     .unwrap();
//! ```

pub mod circuit;
pub mod config;
pub mod context;
pub mod deadline;
pub mod error;
pub mod ethereum;
pub mod gateway;
pub mod group;
pub mod hasher;
pub mod identity;
pub mod merkle;
pub mod nullifier;
pub mod oracle;
pub mod store;
pub mod types;
pub mod utils;
pub mod witness;


pub use circuit::{Halo2Oracle, UniquenessCircuit};
pub use context::{ContextId, VerificationContext};
pub use error::ProtocolError;
pub use gateway::{Accepted, VerificationGateway, VerificationState};
pub use group::{GroupStore, MembershipWitnessProvider, TimeoutProvider};
pub use identity::Identity;
pub use merkle::{IncrementalMerkleTree, MembershipWitness};
pub use oracle::{MockProofOracle, Proof, ProofOracle, PublicInputs, TimeoutOracle};
pub use types::ProofEnvelope;
pub use utils::{bytes_to_field, field_to_bytes, poseidon_hash, FieldElement};
