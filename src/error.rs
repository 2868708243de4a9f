//! Error kinds surfaced by the protocol core.
//!
//! Every rejection is a distinct variant so callers can tell a replay from a
//! bad proof from an unavailable collaborator without parsing strings.

use thiserror::Error;

/// Errors produced while building witnesses, talking to collaborators, or
/// verifying proofs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Input could not be canonically serialized before hashing.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Structural precondition violated by the caller.
    #[error("malformed witness: {0}")]
    MalformedWitness(String),

    /// The commitment is not present in the group.
    #[error("commitment is not a member of group {0}")]
    NotAMember(u64),

    /// The group id does not exist.
    #[error("unknown group {0}")]
    UnknownGroup(u64),

    /// A group with this id was already created.
    #[error("group {0} already exists")]
    GroupExists(u64),

    /// Requested tree depth is outside the supported range.
    #[error("invalid tree depth {0}")]
    InvalidDepth(u32),

    /// No free leaves remain in the group's tree.
    #[error("group {0} is full")]
    TreeFull(u64),

    /// The nullifier hash was already spent in this context.
    #[error("duplicate nullifier")]
    DuplicateNullifier,

    /// Cryptographic verification failed. Carries no cause.
    #[error("invalid proof")]
    InvalidProof,

    /// Timeout or connection failure in an external collaborator.
    #[error("external service unavailable: {0}")]
    ExternalServiceUnavailable(String),

    /// The spent-set backend failed to read or persist.
    #[error("nullifier store failure: {0}")]
    Storage(String),
}

impl ProtocolError {
    /// Only collaborator outages may be retried; nothing was mutated.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProtocolError::ExternalServiceUnavailable(_))
    }

    /// Short stable name of the rejection kind, used by the CLI and logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ProtocolError::Encoding(_) => "EncodingError",
            ProtocolError::MalformedWitness(_) => "MalformedWitness",
            ProtocolError::NotAMember(_) => "NotAMember",
            ProtocolError::UnknownGroup(_) => "UnknownGroup",
            ProtocolError::GroupExists(_) => "GroupExists",
            ProtocolError::InvalidDepth(_) => "InvalidDepth",
            ProtocolError::TreeFull(_) => "TreeFull",
            ProtocolError::DuplicateNullifier => "DuplicateNullifier",
            ProtocolError::InvalidProof => "InvalidProof",
            ProtocolError::ExternalServiceUnavailable(_) => "ExternalServiceUnavailable",
            ProtocolError::Storage(_) => "StorageError",
        }
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
