//! Fixed-depth incremental Merkle tree over Poseidon.
//!
//! Leaves are appended left to right. Empty positions hold a per-level zero
//! node derived from the tree's zero value, so the root is defined for every
//! fill level and only changes on insertion.

use crate::error::{ProtocolError, Result};
use crate::utils::{field_to_hex, poseidon_hash, FieldElement};
use std::fmt;

/// Largest supported depth.
pub const MAX_TREE_DEPTH: u32 = 32;

/// Inclusion path for one leaf.
///
/// `path_indices[i]` is `true` when the node at level `i` is a right child, in
/// which case `siblings[i]` is hashed on the left.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipWitness {
    pub path_indices: Vec<bool>,
    pub siblings: Vec<FieldElement>,
}

impl MembershipWitness {
    #[must_use]
    pub fn depth(&self) -> usize {
        self.siblings.len()
    }

    /// Replays the path from `leaf` up to a root.
    ///
    /// # Errors
    /// [`ProtocolError::MalformedWitness`] if the two sequences differ in length.
    pub fn compute_root(&self, leaf: FieldElement) -> Result<FieldElement> {
        if self.path_indices.len() != self.siblings.len() {
            return Err(ProtocolError::MalformedWitness(format!(
                "path has {} indices but {} siblings",
                self.path_indices.len(),
                self.siblings.len()
            )));
        }

        let mut current = leaf;
        for (is_right, sibling) in self.path_indices.iter().zip(&self.siblings) {
            current = if *is_right {
                poseidon_hash(*sibling, current)
            } else {
                poseidon_hash(current, *sibling)
            };
        }
        Ok(current)
    }
}

impl fmt::Display for MembershipWitness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let index: u64 = self
            .path_indices
            .iter()
            .enumerate()
            .filter(|(_, bit)| **bit)
            .map(|(level, _)| 1u64 << level)
            .sum();
        write!(
            f,
            "MembershipWitness:\n  Leaf index: {}\n  Depth: {}\n  First sibling: {}",
            index,
            self.depth(),
            self.siblings
                .first()
                .map(|s| field_to_hex(*s))
                .unwrap_or_default()
        )
    }
}

/// An append-only binary Merkle tree of fixed depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncrementalMerkleTree {
    depth: u32,
    /// `zeros[l]` is the root of an empty subtree of height `l`.
    zeros: Vec<FieldElement>,
    /// `levels[0]` are the leaves, `levels[depth]` holds at most the root.
    levels: Vec<Vec<FieldElement>>,
}

impl IncrementalMerkleTree {
    /// Creates an empty tree.
    ///
    /// # Errors
    /// [`ProtocolError::InvalidDepth`] unless `1 <= depth <= MAX_TREE_DEPTH`.
    pub fn new(depth: u32, zero_value: FieldElement) -> Result<Self> {
        if depth == 0 || depth > MAX_TREE_DEPTH {
            return Err(ProtocolError::InvalidDepth(depth));
        }

        let mut zeros = Vec::with_capacity(depth as usize + 1);
        zeros.push(zero_value);
        for level in 0..depth as usize {
            let z = zeros[level];
            zeros.push(poseidon_hash(z, z));
        }

        Ok(Self {
            depth,
            zeros,
            levels: vec![Vec::new(); depth as usize + 1],
        })
    }

    #[must_use]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.levels[0].len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.levels[0].is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> u64 {
        1u64 << self.depth
    }

    #[must_use]
    pub fn root(&self) -> FieldElement {
        self.levels[self.depth as usize]
            .first()
            .copied()
            .unwrap_or(self.zeros[self.depth as usize])
    }

    #[must_use]
    pub fn leaves(&self) -> &[FieldElement] {
        &self.levels[0]
    }

    fn node(&self, level: usize, index: usize) -> FieldElement {
        self.levels[level]
            .get(index)
            .copied()
            .unwrap_or(self.zeros[level])
    }

    /// Appends a leaf and returns its index.
    ///
    /// Returns `None` when the tree is full.
    pub fn insert(&mut self, leaf: FieldElement) -> Option<usize> {
        let leaf_index = self.len();
        if leaf_index as u64 >= self.capacity() {
            return None;
        }
        self.levels[0].push(leaf);

        let mut index = leaf_index;
        for level in 0..self.depth as usize {
            let left = self.node(level, index & !1);
            let right = self.node(level, index | 1);
            let parent = poseidon_hash(left, right);
            index >>= 1;

            let upper = &mut self.levels[level + 1];
            if index < upper.len() {
                upper[index] = parent;
            } else {
                upper.push(parent);
            }
        }

        Some(leaf_index)
    }

    /// Position of the first occurrence of `leaf`.
    #[must_use]
    pub fn index_of(&self, leaf: FieldElement) -> Option<usize> {
        self.levels[0].iter().position(|l| *l == leaf)
    }

    /// Builds the inclusion path for the leaf at `leaf_index`.
    #[must_use]
    pub fn witness(&self, leaf_index: usize) -> Option<MembershipWitness> {
        if leaf_index >= self.len() {
            return None;
        }

        let mut path_indices = Vec::with_capacity(self.depth as usize);
        let mut siblings = Vec::with_capacity(self.depth as usize);
        let mut index = leaf_index;

        for level in 0..self.depth as usize {
            path_indices.push(index % 2 == 1);
            siblings.push(self.node(level, index ^ 1));
            index >>= 1;
        }

        Some(MembershipWitness {
            path_indices,
            siblings,
        })
    }

    /// Checks a witness for `leaf` against this tree's current root.
    #[must_use]
    pub fn verify(&self, leaf: FieldElement, witness: &MembershipWitness) -> bool {
        witness.depth() == self.depth as usize
            && witness
                .compute_root(leaf)
                .map(|root| root == self.root())
                .unwrap_or(false)
    }
}
