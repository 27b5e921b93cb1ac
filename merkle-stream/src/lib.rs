//! Streaming Merkle tree (RFC 6962 layout) in O(log n) memory.
//!
//! Leaves are pushed one at a time; the tree only retains a stack of
//! complete subtrees, one per set bit of the leaf count, with strictly
//! increasing heights from the most recent to the oldest. Two stack
//! neighbours of equal height are merged on the spot, so a stream of n
//! leaves never holds more than ⌈log₂ n⌉ + 1 digests.
//!
//! Calling [`Tree::set_index`] before the first push additionally threads a
//! single-leaf inclusion proof through the same merges: every time the
//! subtree containing the chosen leaf is joined with a neighbour, the
//! neighbour's digest is recorded as the next proof sibling.
//!
//! Hashing convention: leaves hash to `H(data)` and interior nodes to
//! `H(left ∥ right)`, without the RFC 6962 domain-separation prefixes, for
//! interoperability with peers that omit them. [`verify_proof`] implements
//! the matching audit-path check.
//!
//! ```
//! use merkle_stream::{verify_proof, Tree};
//! use sha2::Sha256;
//!
//! let mut tree = Tree::<Sha256>::new();
//! tree.set_index(1).unwrap();
//! for leaf in [b"a", b"b", b"c"] {
//!     tree.push(leaf);
//! }
//! let proof = tree.prove();
//! let root = proof.root.unwrap();
//! assert!(verify_proof::<Sha256>(&root, &proof.siblings, 1, 3, b"b"));
//! ```

use digest::{Digest, Output};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MerkleError {
    /// A pushed subtree must not be taller than the smallest cached subtree,
    /// otherwise the stack's height ordering breaks.
    #[error("subtree of height {pushed} exceeds the smallest cached subtree (height {smallest})")]
    SubtreeTooLarge { pushed: u32, smallest: u32 },
    /// A precomputed subtree may not span the leaf selected for proving;
    /// its interior digests were never seen, so no proof could be built.
    #[error("pushed subtree spans the proof target")]
    ContainsProofTarget,
    /// The proof target can only be chosen before any leaf is inserted.
    #[error("set_index requires an empty tree")]
    SetIndexOnNonEmpty,
}

/// Root of a complete subtree covering `2^height` consecutive leaves.
struct SubTree<D: Digest> {
    height: u32,
    sum: Output<D>,
}

/// Inclusion proof for the leaf fixed with [`Tree::set_index`].
pub struct Proof<D: Digest> {
    /// Root of the whole tree; `None` when the tree is empty.
    pub root: Option<Output<D>>,
    /// Sibling digests, innermost first. Empty when the target leaf has not
    /// been pushed yet.
    pub siblings: Vec<Output<D>>,
    /// The proven leaf index.
    pub index: u64,
    /// Number of leaves in the tree.
    pub leaves: u64,
}

pub struct Tree<D: Digest> {
    /// Subtree stack; the last entry is the most recent (smallest) subtree,
    /// heights strictly increase towards the front.
    stack: Vec<SubTree<D>>,
    current_index: u64,
    proving: bool,
    proof_index: u64,
    /// True once the leaf at `proof_index` has been inserted; sibling
    /// collection starts here.
    target_seen: bool,
    proof_set: Vec<Output<D>>,
}

impl<D: Digest> Default for Tree<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Digest> Tree<D> {
    pub fn new() -> Self {
        Self {
            stack: Vec::new(),
            current_index: 0,
            proving: false,
            proof_index: 0,
            target_seen: false,
            proof_set: Vec::new(),
        }
    }

    /// Selects the leaf whose inclusion proof [`Tree::prove`] will return.
    /// Must be called on an empty tree.
    pub fn set_index(&mut self, index: u64) -> Result<(), MerkleError> {
        if !self.stack.is_empty() || self.current_index != 0 {
            return Err(MerkleError::SetIndexOnNonEmpty);
        }
        self.proving = true;
        self.proof_index = index;
        Ok(())
    }

    /// Appends one leaf.
    pub fn push(&mut self, data: &[u8]) {
        if self.proving && self.current_index == self.proof_index {
            self.target_seen = true;
        }
        self.stack.push(SubTree {
            height: 0,
            sum: D::digest(data),
        });
        self.join_all();
        self.current_index += 1;
    }

    /// Appends a precomputed complete subtree spanning `2^height` leaves
    /// starting at the current index, skipping their hashing.
    pub fn push_subtree(&mut self, height: u32, sum: Output<D>) -> Result<(), MerkleError> {
        let new_index = self.current_index + (1u64 << height);
        if self.proving
            && (self.current_index == self.proof_index
                || (self.current_index < self.proof_index && self.proof_index < new_index))
        {
            return Err(MerkleError::ContainsProofTarget);
        }
        if let Some(head) = self.stack.last() {
            if height > head.height {
                return Err(MerkleError::SubtreeTooLarge {
                    pushed: height,
                    smallest: head.height,
                });
            }
        }
        self.stack.push(SubTree { height, sum });
        self.join_all();
        self.current_index = new_index;
        Ok(())
    }

    /// Merges equal-height stack neighbours until heights strictly increase
    /// again, collecting proof siblings along the way.
    fn join_all(&mut self) {
        while let Some([left, right]) = self.stack.last_chunk::<2>() {
            if left.height != right.height {
                break;
            }
            let height = right.height;

            // The join involves the target's subtree exactly when that
            // subtree has grown to the current height, which equals the
            // number of siblings collected so far. The sibling is whichever
            // side does not contain the target, decided against the
            // boundary between the two subtrees.
            if self.proving && self.target_seen && height == self.proof_set.len() as u32 {
                let leaves = 1u64 << height;
                let mid = (self.current_index / leaves) * leaves;
                let sibling = if self.proof_index < mid { right } else { left };
                self.proof_set.push(sibling.sum.clone());
            }

            let sum = node_sum::<D>(&left.sum, &right.sum);
            self.stack.truncate(self.stack.len() - 2);
            self.stack.push(SubTree {
                height: height + 1,
                sum,
            });
        }
    }

    /// Merkle root of everything pushed so far; `None` for the empty tree.
    ///
    /// Folds the stack smallest-subtree-first, each taller subtree joining
    /// as the left sibling. The stack itself is not modified.
    pub fn root(&self) -> Option<Output<D>> {
        let mut subtrees = self.stack.iter().rev();
        let mut sum = subtrees.next()?.sum.clone();
        for taller in subtrees {
            sum = node_sum::<D>(&taller.sum, &sum);
        }
        Some(sum)
    }

    /// Number of leaves inserted so far.
    pub fn leaves(&self) -> u64 {
        self.current_index
    }

    /// Builds the inclusion proof for the leaf chosen with
    /// [`Tree::set_index`].
    ///
    /// # Panics
    ///
    /// Panics if `set_index` was never called; proving without a target is a
    /// programming error.
    pub fn prove(&self) -> Proof<D> {
        assert!(
            self.proving,
            "prove requires set_index on an empty tree before the first push"
        );

        // Nothing useful yet: empty tree, or the target leaf still pending.
        if self.stack.is_empty() || !self.target_seen {
            return Proof {
                root: self.root(),
                siblings: Vec::new(),
                index: self.proof_index,
                leaves: self.current_index,
            };
        }

        let mut siblings = self.proof_set.clone();
        let k = siblings.len() as u32;

        // Collapse every subtree smaller than the one containing the target
        // (recognisable by height k) into a single aggregate; if such an
        // aggregate exists it joins the proof as one right-hand sibling.
        let mut pos = self.stack.len() - 1;
        let mut aggregate = self.stack[pos].sum.clone();
        while pos > 0 && self.stack[pos - 1].height < k {
            aggregate = node_sum::<D>(&self.stack[pos - 1].sum, &aggregate);
            pos -= 1;
        }
        if pos > 0 && self.stack[pos - 1].height == k {
            siblings.push(aggregate);
            pos -= 1;
        }

        // stack[pos] is the subtree containing the target; every taller
        // subtree joins as a left-hand sibling.
        for subtree in self.stack[..pos].iter().rev() {
            siblings.push(subtree.sum.clone());
        }

        Proof {
            root: self.root(),
            siblings,
            index: self.proof_index,
            leaves: self.current_index,
        }
    }

    #[cfg(test)]
    fn heights(&self) -> Vec<u32> {
        self.stack.iter().map(|s| s.height).collect()
    }
}

fn node_sum<D: Digest>(left: &Output<D>, right: &Output<D>) -> Output<D> {
    D::new().chain_update(left).chain_update(right).finalize()
}

/// Audit-path check for a proof produced by [`Tree::prove`]: folds the
/// sibling list over the leaf hash and compares against the root.
pub fn verify_proof<D: Digest>(
    root: &Output<D>,
    siblings: &[Output<D>],
    index: u64,
    leaves: u64,
    leaf_data: &[u8],
) -> bool {
    if leaves == 0 || index >= leaves {
        return false;
    }

    let mut acc = D::digest(leaf_data);
    let mut fnode = index;
    let mut snode = leaves - 1;
    for sibling in siblings {
        if snode == 0 {
            return false;
        }
        if fnode & 1 == 1 || fnode == snode {
            acc = node_sum::<D>(sibling, &acc);
            if fnode & 1 == 0 {
                // lone right-edge node: skip levels it was promoted through
                loop {
                    fnode >>= 1;
                    snode >>= 1;
                    if fnode & 1 == 1 || fnode == 0 {
                        break;
                    }
                }
            }
        } else {
            acc = node_sum::<D>(&acc, sibling);
        }
        fnode >>= 1;
        snode >>= 1;
    }
    snode == 0 && acc == *root
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::Sha256;

    type TestTree = Tree<Sha256>;

    fn h0(data: &[u8]) -> Output<Sha256> {
        Sha256::digest(data)
    }

    fn h1(left: &Output<Sha256>, right: &Output<Sha256>) -> Output<Sha256> {
        node_sum::<Sha256>(left, right)
    }

    /// RFC 6962 tree hash, computed recursively: split at the largest power
    /// of two strictly below n.
    fn reference_root(leaves: &[Vec<u8>]) -> Output<Sha256> {
        match leaves.len() {
            0 => panic!("reference_root needs at least one leaf"),
            1 => h0(&leaves[0]),
            n => {
                // split at the largest power of two strictly below n
                let split = if n.is_power_of_two() {
                    n / 2
                } else {
                    n.next_power_of_two() / 2
                };
                h1(
                    &reference_root(&leaves[..split]),
                    &reference_root(&leaves[split..]),
                )
            }
        }
    }

    fn leaf_data(n: usize) -> Vec<Vec<u8>> {
        (0..n).map(|i| format!("leaf-{i}").into_bytes()).collect()
    }

    #[test]
    fn three_leaf_root_matches_hand_computation() {
        let mut tree = TestTree::new();
        tree.push(b"a");
        tree.push(b"b");
        tree.push(b"c");

        let expected = h1(&h1(&h0(b"a"), &h0(b"b")), &h0(b"c"));
        assert_eq!(tree.root().unwrap(), expected);
    }

    #[test]
    fn roots_match_recursive_reference() {
        for n in 1..=16 {
            let leaves = leaf_data(n);
            let mut tree = TestTree::new();
            for leaf in &leaves {
                tree.push(leaf);
            }
            assert_eq!(tree.root().unwrap(), reference_root(&leaves), "n = {n}");
            assert_eq!(tree.leaves(), n as u64);
        }
    }

    #[test]
    fn empty_tree_has_no_root() {
        assert!(TestTree::new().root().is_none());
    }

    #[test]
    fn proof_for_index_one_of_five() {
        let leaves = leaf_data(5);
        let mut tree = TestTree::new();
        tree.set_index(1).unwrap();
        for leaf in &leaves {
            tree.push(leaf);
        }

        let proof = tree.prove();
        assert_eq!(proof.index, 1);
        assert_eq!(proof.leaves, 5);
        // audit path: leaf 0, the node over leaves 2-3, then leaf 4
        assert_eq!(
            proof.siblings,
            vec![
                h0(&leaves[0]),
                h1(&h0(&leaves[2]), &h0(&leaves[3])),
                h0(&leaves[4]),
            ]
        );

        let root = proof.root.unwrap();
        assert_eq!(root, tree.root().unwrap());
        assert!(verify_proof::<Sha256>(
            &root,
            &proof.siblings,
            1,
            5,
            &leaves[1]
        ));
    }

    #[test]
    fn every_index_of_every_size_verifies() {
        for n in 1..=16usize {
            let leaves = leaf_data(n);
            for index in 0..n {
                let mut tree = TestTree::new();
                tree.set_index(index as u64).unwrap();
                for leaf in &leaves {
                    tree.push(leaf);
                }
                let proof = tree.prove();
                let root = proof.root.unwrap();
                assert!(
                    verify_proof::<Sha256>(
                        &root,
                        &proof.siblings,
                        index as u64,
                        n as u64,
                        &leaves[index]
                    ),
                    "n = {n}, index = {index}"
                );
                // the proof is bound to its leaf
                assert!(!verify_proof::<Sha256>(
                    &root,
                    &proof.siblings,
                    index as u64,
                    n as u64,
                    b"some other leaf"
                ));
            }
        }
    }

    #[test]
    fn proof_is_empty_until_target_is_pushed() {
        let mut tree = TestTree::new();
        tree.set_index(5).unwrap();
        for leaf in &leaf_data(3) {
            tree.push(leaf);
        }
        let proof = tree.prove();
        assert!(proof.siblings.is_empty());
        assert!(proof.root.is_some());
        assert_eq!(proof.leaves, 3);
    }

    #[test]
    fn single_leaf_proof_has_no_siblings() {
        let mut tree = TestTree::new();
        tree.set_index(0).unwrap();
        tree.push(b"only");
        let proof = tree.prove();
        assert!(proof.siblings.is_empty());
        assert!(verify_proof::<Sha256>(
            &proof.root.unwrap(),
            &proof.siblings,
            0,
            1,
            b"only"
        ));
    }

    #[test]
    #[should_panic(expected = "prove requires set_index")]
    fn prove_without_set_index_panics() {
        let mut tree = TestTree::new();
        tree.push(b"a");
        tree.prove();
    }

    #[test]
    fn set_index_rejected_after_push() {
        let mut tree = TestTree::new();
        tree.push(b"a");
        assert_eq!(tree.set_index(0), Err(MerkleError::SetIndexOnNonEmpty));
    }

    #[test]
    fn heights_strictly_increase() {
        let mut tree = TestTree::new();
        for (i, leaf) in leaf_data(100).iter().enumerate() {
            tree.push(leaf);
            let heights = tree.heights();
            for pair in heights.windows(2) {
                assert!(pair[0] > pair[1], "after push {i}: {heights:?}");
            }
        }
    }

    #[test]
    fn push_subtree_equals_pushing_its_leaves() {
        let leaves = leaf_data(8);

        // precompute the root of leaves 4..8
        let mut sub = TestTree::new();
        for leaf in &leaves[4..] {
            sub.push(leaf);
        }
        let sub_root = sub.root().unwrap();

        let mut tree = TestTree::new();
        for leaf in &leaves[..4] {
            tree.push(leaf);
        }
        tree.push_subtree(2, sub_root).unwrap();
        assert_eq!(tree.leaves(), 8);
        assert_eq!(tree.root().unwrap(), reference_root(&leaves));
    }

    #[test]
    fn push_subtree_collects_proof_siblings() {
        let leaves = leaf_data(4);

        let mut sub = TestTree::new();
        sub.push(&leaves[2]);
        sub.push(&leaves[3]);
        let sub_root = sub.root().unwrap();

        let mut tree = TestTree::new();
        tree.set_index(1).unwrap();
        tree.push(&leaves[0]);
        tree.push(&leaves[1]);
        tree.push_subtree(1, sub_root.clone()).unwrap();

        let proof = tree.prove();
        assert_eq!(proof.siblings, vec![h0(&leaves[0]), sub_root]);
        assert!(verify_proof::<Sha256>(
            &proof.root.unwrap(),
            &proof.siblings,
            1,
            4,
            &leaves[1]
        ));
    }

    #[test]
    fn push_subtree_too_large_is_rejected() {
        let mut tree = TestTree::new();
        tree.push(b"a");
        let err = tree.push_subtree(3, h0(b"whatever"));
        assert_eq!(
            err,
            Err(MerkleError::SubtreeTooLarge {
                pushed: 3,
                smallest: 0
            })
        );
        // any height goes into an empty tree
        let mut empty = TestTree::new();
        assert!(empty.push_subtree(3, h0(b"whatever")).is_ok());
        assert_eq!(empty.leaves(), 8);
    }

    #[test]
    fn push_subtree_may_not_span_the_target() {
        let mut tree = TestTree::new();
        tree.set_index(2).unwrap();
        tree.push(b"a");
        tree.push(b"b");
        assert_eq!(
            tree.push_subtree(1, h0(b"cd")),
            Err(MerkleError::ContainsProofTarget)
        );
        // a subtree strictly before or after the target is fine
        tree.push(b"c");
        tree.push(b"d");
        assert!(tree.push_subtree(2, h0(b"efgh")).is_ok());
    }
}
