//! Group membership: the witness-provider interface and an in-memory registry.
//!
//! Production deployments keep groups in an external service that owns tree
//! mutation. [`GroupStore`] implements the same interface in process.

use crate::deadline::Deadline;
use crate::error::{ProtocolError, Result};
use crate::merkle::{IncrementalMerkleTree, MembershipWitness};
use crate::utils::{field_from_hex, field_to_hex, FieldElement};
use log::{debug, info};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub type GroupId = u64;

/// Source of Merkle inclusion paths for commitments.
pub trait MembershipWitnessProvider: Send + Sync {
    /// Inclusion path of `commitment` under the group's current root.
    ///
    /// # Errors
    /// [`ProtocolError::UnknownGroup`], [`ProtocolError::NotAMember`], or
    /// [`ProtocolError::ExternalServiceUnavailable`] for a remote outage.
    fn prove(&self, group_id: GroupId, commitment: FieldElement) -> Result<MembershipWitness>;

    /// Current root of the group.
    fn root(&self, group_id: GroupId) -> Result<FieldElement>;
}

impl<P: MembershipWitnessProvider + ?Sized> MembershipWitnessProvider for Arc<P> {
    fn prove(&self, group_id: GroupId, commitment: FieldElement) -> Result<MembershipWitness> {
        (**self).prove(group_id, commitment)
    }

    fn root(&self, group_id: GroupId) -> Result<FieldElement> {
        (**self).root(group_id)
    }
}

/// Bounds every provider call by a [`Deadline`].
///
/// Same semantics as [`TimeoutOracle`](crate::oracle::TimeoutOracle): a missed
/// deadline is [`ProtocolError::ExternalServiceUnavailable`] and abandoned
/// calls count against the in-flight bound until they return.
#[derive(Debug)]
pub struct TimeoutProvider<P> {
    inner: Arc<P>,
    deadline: Deadline,
}

impl<P> Clone for TimeoutProvider<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            deadline: self.deadline.clone(),
        }
    }
}

impl<P: MembershipWitnessProvider + 'static> TimeoutProvider<P> {
    pub fn new(inner: P, timeout: Duration) -> Self {
        Self::from_arc(Arc::new(inner), timeout)
    }

    pub fn from_arc(inner: Arc<P>, timeout: Duration) -> Self {
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

impl<P: MembershipWitnessProvider + 'static> MembershipWitnessProvider for TimeoutProvider<P> {
    fn prove(&self, group_id: GroupId, commitment: FieldElement) -> Result<MembershipWitness> {
        self.deadline.run(&self.inner, "provider-prove", move |provider| {
            provider.prove(group_id, commitment)
        })
    }

    fn root(&self, group_id: GroupId) -> Result<FieldElement> {
        self.deadline
            .run(&self.inner, "provider-root", move |provider| provider.root(group_id))
    }
}

/// Reads a commitments file: one hex commitment per line, blank lines ignored,
/// in insertion order.
///
/// # Errors
/// [`ProtocolError::Storage`] if the file is unreadable or larger than
/// `max_size` bytes, [`ProtocolError::Encoding`] for a malformed line.
pub fn read_commitments(path: &Path, max_size: u64) -> Result<Vec<FieldElement>> {
    let metadata = fs::metadata(path).map_err(|e| {
        ProtocolError::Storage(format!("cannot stat {}: {e}", path.display()))
    })?;
    if metadata.len() > max_size {
        return Err(ProtocolError::Storage(format!(
            "commitments file too large: {} bytes (max {max_size} bytes)",
            metadata.len()
        )));
    }

    let content = fs::read_to_string(path).map_err(|e| {
        ProtocolError::Storage(format!("cannot read {}: {e}", path.display()))
    })?;
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            field_from_hex(line.trim()).map_err(|e| {
                ProtocolError::Encoding(format!("invalid commitment at line {}: {e}", i + 1))
            })
        })
        .collect()
}

/// Public view of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Group {
    pub id: GroupId,
    pub depth: u32,
    pub root: FieldElement,
}

/// Thread-safe registry of groups, each backed by an incremental tree.
#[derive(Debug, Default)]
pub struct GroupStore {
    groups: RwLock<HashMap<GroupId, IncrementalMerkleTree>>,
}

impl GroupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store holding a single group filled with `members` in order.
    pub fn with_members(
        group_id: GroupId,
        depth: u32,
        zero_value: FieldElement,
        members: &[FieldElement],
    ) -> Result<Self> {
        let store = Self::new();
        store.create_group(group_id, depth, zero_value)?;
        for member in members {
            store.add_member(group_id, *member)?;
        }
        Ok(store)
    }

    /// Creates an empty group.
    pub fn create_group(&self, group_id: GroupId, depth: u32, zero_value: FieldElement) -> Result<()> {
        let mut groups = self.groups.write();
        if groups.contains_key(&group_id) {
            return Err(ProtocolError::GroupExists(group_id));
        }
        groups.insert(group_id, IncrementalMerkleTree::new(depth, zero_value)?);
        info!("Created group {group_id} with depth {depth}");
        Ok(())
    }

    /// Appends a commitment and returns its leaf index.
    pub fn add_member(&self, group_id: GroupId, commitment: FieldElement) -> Result<usize> {
        let mut groups = self.groups.write();
        let tree = groups
            .get_mut(&group_id)
            .ok_or(ProtocolError::UnknownGroup(group_id))?;
        let index = tree
            .insert(commitment)
            .ok_or(ProtocolError::TreeFull(group_id))?;
        debug!(
            "Added member {} to group {group_id} at index {index}, new root {}",
            field_to_hex(commitment),
            field_to_hex(tree.root())
        );
        Ok(index)
    }

    pub fn group(&self, group_id: GroupId) -> Result<Group> {
        let groups = self.groups.read();
        let tree = groups
            .get(&group_id)
            .ok_or(ProtocolError::UnknownGroup(group_id))?;
        Ok(Group {
            id: group_id,
            depth: tree.depth(),
            root: tree.root(),
        })
    }

    pub fn depth(&self, group_id: GroupId) -> Result<u32> {
        self.group(group_id).map(|g| g.depth)
    }

    pub fn size(&self, group_id: GroupId) -> Result<usize> {
        let groups = self.groups.read();
        groups
            .get(&group_id)
            .map(IncrementalMerkleTree::len)
            .ok_or(ProtocolError::UnknownGroup(group_id))
    }
}

impl MembershipWitnessProvider for GroupStore {
    fn prove(&self, group_id: GroupId, commitment: FieldElement) -> Result<MembershipWitness> {
        let groups = self.groups.read();
        let tree = groups
            .get(&group_id)
            .ok_or(ProtocolError::UnknownGroup(group_id))?;
        let index = tree
            .index_of(commitment)
            .ok_or(ProtocolError::NotAMember(group_id))?;
        tree.witness(index)
            .ok_or(ProtocolError::NotAMember(group_id))
    }

    fn root(&self, group_id: GroupId) -> Result<FieldElement> {
        self.group(group_id).map(|g| g.root)
    }
}
