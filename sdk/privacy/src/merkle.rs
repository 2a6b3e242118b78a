//! Merkle Tree for Note Commitments
//!
//! Incremental Poseidon Merkle tree matching the pool's on-chain
//! accumulator. Wallets use [`MerklePath::verify`] to check the path a
//! ledger hands back before spending proving time on it.
//!
//! ```text
//!                    Root
//!                   /    \
//!                 H01    H23
//!                /  \   /   \
//!               H0  H1 H2   H3
//!               |   |   |    |
//!              C0  C1  C2   C3  (Note Commitments)
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

use ark_bn254::Fr;

use crate::commitment::Commitment;
use crate::field::{field_to_bytes, to_field_element};
use crate::poseidon;

/// Tree depth (supports 2^20 notes)
pub const TREE_DEPTH: usize = 20;

/// A Merkle path proving inclusion of a note
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerklePath {
    /// Sibling hashes from leaf to root
    pub siblings: Vec<[u8; 32]>,
    /// Direction bits from leaf to root (false = current node is left, true = right)
    pub indices: Vec<bool>,
}

impl MerklePath {
    /// Verify that this path proves inclusion of `leaf` in `root`
    pub fn verify(&self, leaf: &Commitment, root: &[u8; 32]) -> bool {
        if self.siblings.len() != self.indices.len() {
            return false;
        }
        &self.compute_root(leaf) == root
    }

    /// Fold the leaf up the path
    pub fn compute_root(&self, leaf: &Commitment) -> [u8; 32] {
        let mut current = leaf.0;

        for (sibling, is_right) in self.siblings.iter().zip(self.indices.iter()) {
            current = if *is_right {
                hash_pair(sibling, &current)
            } else {
                hash_pair(&current, sibling)
            };
        }

        current
    }

    /// Leaf position encoded by the direction bits
    pub fn position(&self) -> u64 {
        self.indices
            .iter()
            .enumerate()
            .fold(0u64, |acc, (level, bit)| acc | ((*bit as u64) << level))
    }
}

/// Hash two children to get parent
pub fn hash_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let result = poseidon::hash(&[to_field_element(left), to_field_element(right)]);
    field_to_bytes(&result)
}

/// Precomputed empty subtree roots at each level
struct EmptyRoots(Vec<[u8; 32]>);

impl EmptyRoots {
    fn new() -> Self {
        let empty_leaf = field_to_bytes(&poseidon::hash(&[Fr::from(0u64)]));
        let mut roots = Vec::with_capacity(TREE_DEPTH + 1);
        roots.push(empty_leaf);

        let mut prev = empty_leaf;
        for _ in 0..TREE_DEPTH {
            prev = hash_pair(&prev, &prev);
            roots.push(prev);
        }

        Self(roots)
    }

    fn at(&self, level: usize) -> [u8; 32] {
        self.0[level]
    }
}

/// Sparse Merkle tree of note commitments
///
/// Only non-empty nodes are stored.
pub struct MerkleTree {
    /// Non-empty nodes: (level, index) -> hash
    nodes: HashMap<(usize, u64), [u8; 32]>,
    /// Leaf positions by commitment
    positions: HashMap<Commitment, u64>,
    /// Next available leaf position
    next_index: u64,
    empty: EmptyRoots,
    root: [u8; 32],
}

impl MerkleTree {
    /// Create a new empty tree
    pub fn new() -> Self {
        let empty = EmptyRoots::new();
        let root = empty.at(TREE_DEPTH);

        Self {
            nodes: HashMap::new(),
            positions: HashMap::new(),
            next_index: 0,
            empty,
            root,
        }
    }

    /// Get current root
    pub fn root(&self) -> [u8; 32] {
        self.root
    }

    /// Get next available position
    pub fn next_position(&self) -> u64 {
        self.next_index
    }

    /// Whether the tree has room for another leaf
    pub fn is_full(&self) -> bool {
        self.next_index >= 1u64 << TREE_DEPTH
    }

    /// Insert a commitment and return its position, or `None` when full
    pub fn insert(&mut self, commitment: &Commitment) -> Option<u64> {
        if self.is_full() {
            return None;
        }

        let position = self.next_index;
        self.nodes.insert((0, position), commitment.0);
        self.positions.insert(*commitment, position);

        let mut current_index = position;
        let mut current_hash = commitment.0;

        for level in 0..TREE_DEPTH {
            let sibling = self.sibling(level, current_index);
            current_hash = if current_index & 1 == 1 {
                hash_pair(&sibling, &current_hash)
            } else {
                hash_pair(&current_hash, &sibling)
            };

            current_index /= 2;
            self.nodes.insert((level + 1, current_index), current_hash);
        }

        self.root = current_hash;
        self.next_index += 1;
        Some(position)
    }

    /// Get Merkle path for a position
    pub fn path(&self, position: u64) -> Option<MerklePath> {
        if position >= self.next_index {
            return None;
        }

        let mut siblings = Vec::with_capacity(TREE_DEPTH);
        let mut indices = Vec::with_capacity(TREE_DEPTH);
        let mut current_index = position;

        for level in 0..TREE_DEPTH {
            indices.push(current_index & 1 == 1);
            siblings.push(self.sibling(level, current_index));
            current_index /= 2;
        }

        Some(MerklePath { siblings, indices })
    }

    /// Get Merkle path for a commitment
    pub fn path_for(&self, commitment: &Commitment) -> Option<MerklePath> {
        self.position_of(commitment).and_then(|p| self.path(p))
    }

    /// Leaf position of a commitment
    pub fn position_of(&self, commitment: &Commitment) -> Option<u64> {
        self.positions.get(commitment).copied()
    }

    /// Get commitment at position
    pub fn get(&self, position: u64) -> Option<Commitment> {
        if position >= self.next_index {
            return None;
        }
        self.nodes.get(&(0, position)).map(|h| Commitment(*h))
    }

    fn sibling(&self, level: usize, index: u64) -> [u8; 32] {
        let sibling_index = index ^ 1;
        self.nodes
            .get(&(level, sibling_index))
            .copied()
            .unwrap_or_else(|| self.empty.at(level))
    }
}

impl Default for MerkleTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Root history for Merkle tree
///
/// Stores recent roots so proofs built against a slightly stale root
/// are still accepted.
#[derive(Debug, Default)]
pub struct RootHistory {
    /// Recent roots (most recent first)
    roots: VecDeque<[u8; 32]>,
    /// Maximum history size
    max_size: usize,
}

impl RootHistory {
    pub fn new(max_size: usize) -> Self {
        Self {
            roots: VecDeque::with_capacity(max_size),
            max_size,
        }
    }

    /// Add a new root
    pub fn push(&mut self, root: [u8; 32]) {
        self.roots.push_front(root);
        if self.roots.len() > self.max_size {
            self.roots.pop_back();
        }
    }

    /// Check if a root is valid (current or recent)
    pub fn is_valid(&self, root: &[u8; 32]) -> bool {
        self.roots.contains(root)
    }

    /// Get the most recent root
    pub fn current(&self) -> Option<&[u8; 32]> {
        self.roots.front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_tree() {
        let tree = MerkleTree::new();
        assert_eq!(tree.next_position(), 0);
        assert_eq!(tree.root(), EmptyRoots::new().at(TREE_DEPTH));
        assert!(tree.path(0).is_none());
    }

    #[test]
    fn test_insert_and_path() {
        let mut tree = MerkleTree::new();

        let c1 = Commitment([1u8; 32]);
        let c2 = Commitment([2u8; 32]);

        assert_eq!(tree.insert(&c1), Some(0));
        assert_eq!(tree.insert(&c2), Some(1));

        let path1 = tree.path(0).unwrap();
        assert!(path1.verify(&c1, &tree.root()));
        assert_eq!(path1.position(), 0);

        let path2 = tree.path_for(&c2).unwrap();
        assert!(path2.verify(&c2, &tree.root()));
        assert_eq!(path2.position(), 1);
        assert_eq!(path2.siblings.len(), TREE_DEPTH);
    }

    #[test]
    fn test_path_invalid_commitment() {
        let mut tree = MerkleTree::new();
        let c1 = Commitment([1u8; 32]);
        tree.insert(&c1);

        let path = tree.path(0).unwrap();
        let wrong_commitment = Commitment([99u8; 32]);

        assert!(!path.verify(&wrong_commitment, &tree.root()));
    }

    #[test]
    fn test_old_path_fails_against_new_root() {
        let mut tree = MerkleTree::new();
        let c1 = Commitment([1u8; 32]);
        tree.insert(&c1);
        let stale = tree.path(0).unwrap();

        tree.insert(&Commitment([2u8; 32]));

        assert!(!stale.verify(&c1, &tree.root()));
        assert!(tree.path(0).unwrap().verify(&c1, &tree.root()));
    }

    #[test]
    fn test_truncated_path_rejected() {
        let mut tree = MerkleTree::new();
        let c1 = Commitment([1u8; 32]);
        tree.insert(&c1);

        let mut path = tree.path(0).unwrap();
        path.indices.pop();
        assert!(!path.verify(&c1, &tree.root()));
    }

    #[test]
    fn test_root_changes() {
        let mut tree = MerkleTree::new();
        let root0 = tree.root();

        tree.insert(&Commitment([1u8; 32]));
        let root1 = tree.root();
        assert_ne!(root0, root1, "root should change after insert");

        tree.insert(&Commitment([2u8; 32]));
        assert_ne!(root1, tree.root(), "root should change after each insert");
    }

    #[test]
    fn test_root_history() {
        let mut history = RootHistory::new(2);

        let r1 = [1u8; 32];
        let r2 = [2u8; 32];
        let r3 = [3u8; 32];

        history.push(r1);
        history.push(r2);
        history.push(r3);

        assert!(!history.is_valid(&r1), "oldest root should be evicted");
        assert!(history.is_valid(&r2));
        assert!(history.is_valid(&r3));
        assert!(!history.is_valid(&[4u8; 32]));

        assert_eq!(history.current(), Some(&r3));
    }
}
