//! Sparse authenticated map keyed by [`Scalar`].
//!
//! The 255 low bits of a key's canonical representation select a leaf;
//! internal nodes are `Poseidon(left, right)`. Only nodes that differ from
//! the empty subtree at their level are stored.

use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::WitnessError;
use crate::field::{Scalar, EMPTY};
use crate::poseidon::hash_two;

/// Number of levels between a leaf and the root.
pub const MAP_HEIGHT: usize = 255;

static DEFAULT_NODES: OnceLock<Vec<Scalar>> = OnceLock::new();

/// Digest of an empty subtree whose leaves sit `level` levels below it.
fn default_node(level: usize) -> Scalar {
    DEFAULT_NODES.get_or_init(|| {
        let mut nodes = Vec::with_capacity(MAP_HEIGHT + 1);
        let mut node = EMPTY;
        nodes.push(node);
        for _ in 0..MAP_HEIGHT {
            node = hash_two(node, node);
            nodes.push(node);
        }
        nodes
    })[level]
}

/// Position of a node within its level, as four little-endian limbs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct NodeIndex([u64; 4]);

impl NodeIndex {
    fn leaf(key: &Scalar) -> Self {
        let repr = key.to_repr();
        let mut limbs = [0u64; 4];
        for (limb, bytes) in limbs.iter_mut().zip(repr.chunks_exact(8)) {
            let mut word = [0u8; 8];
            word.copy_from_slice(bytes);
            *limb = u64::from_le_bytes(word);
        }
        Self(limbs)
    }

    fn is_right(&self) -> bool {
        self.0[0] & 1 == 1
    }

    fn sibling(self) -> Self {
        let mut limbs = self.0;
        limbs[0] ^= 1;
        Self(limbs)
    }

    fn parent(self) -> Self {
        let mut limbs = self.0;
        for i in 0..4 {
            let carry = if i < 3 { self.0[i + 1] << 63 } else { 0 };
            limbs[i] = (self.0[i] >> 1) | carry;
        }
        Self(limbs)
    }
}

#[derive(Clone, Debug)]
pub struct MerkleMap {
    root: Scalar,
    nodes: HashMap<(u8, NodeIndex), Scalar>,
    entries: BTreeMap<Scalar, Scalar>,
}

impl MerkleMap {
    pub fn new() -> Self {
        Self {
            root: Self::empty_root(),
            nodes: HashMap::new(),
            entries: BTreeMap::new(),
        }
    }

    /// Root of a map with no entries.
    pub fn empty_root() -> Scalar {
        default_node(MAP_HEIGHT)
    }

    /// Rebuilds a map from its entries.
    pub fn from_entries(entries: impl IntoIterator<Item = (Scalar, Scalar)>) -> Self {
        let mut map = Self::new();
        for (key, value) in entries {
            map.set(key, value);
        }
        map
    }

    pub fn root(&self) -> Scalar {
        self.root
    }

    /// Value under `key`, `EMPTY` when absent.
    pub fn get(&self, key: &Scalar) -> Scalar {
        self.entries.get(key).copied().unwrap_or(EMPTY)
    }

    /// Sets `key` to `value`. Setting `EMPTY` removes the entry.
    pub fn set(&mut self, key: Scalar, value: Scalar) {
        if value.is_empty() {
            self.entries.remove(&key);
        } else {
            self.entries.insert(key, value);
        }

        let mut index = NodeIndex::leaf(&key);
        let mut node = value;
        for level in 0..MAP_HEIGHT {
            self.store_node(level, index, node);
            let sibling = self.node(level, index.sibling());
            node = if index.is_right() {
                hash_two(sibling, node)
            } else {
                hash_two(node, sibling)
            };
            index = index.parent();
        }
        self.root = node;
    }

    pub fn witness(&self, key: &Scalar) -> MerkleMapWitness {
        let mut index = NodeIndex::leaf(key);
        let mut path = Vec::with_capacity(MAP_HEIGHT);
        let mut siblings = Vec::with_capacity(MAP_HEIGHT);
        for level in 0..MAP_HEIGHT {
            path.push(index.is_right());
            siblings.push(self.node(level, index.sibling()));
            index = index.parent();
        }
        MerkleMapWitness {
            path,
            siblings,
            key: *key,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = (&Scalar, &Scalar)> {
        self.entries.iter()
    }

    fn node(&self, level: usize, index: NodeIndex) -> Scalar {
        self.nodes
            .get(&(level as u8, index))
            .copied()
            .unwrap_or_else(|| default_node(level))
    }

    fn store_node(&mut self, level: usize, index: NodeIndex, node: Scalar) {
        if node == default_node(level) {
            self.nodes.remove(&(level as u8, index));
        } else {
            self.nodes.insert((level as u8, index), node);
        }
    }
}

impl Default for MerkleMap {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for MerkleMap {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root && self.entries == other.entries
    }
}

impl Eq for MerkleMap {}

/// Authentication path from a leaf to the root, leaf level first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WitnessParts", into = "WitnessParts")]
pub struct MerkleMapWitness {
    path: Vec<bool>,
    siblings: Vec<Scalar>,
    key: Scalar,
}

#[derive(Serialize, Deserialize)]
struct WitnessParts {
    path: Vec<bool>,
    siblings: Vec<Scalar>,
}

impl MerkleMapWitness {
    /// `path[i]` is true when the node at level `i` is a right child.
    pub fn new(path: Vec<bool>, siblings: Vec<Scalar>) -> Result<Self, WitnessError> {
        if path.len() != MAP_HEIGHT {
            return Err(WitnessError::PathLength {
                expected: MAP_HEIGHT,
                actual: path.len(),
            });
        }
        if siblings.len() != MAP_HEIGHT {
            return Err(WitnessError::SiblingsLength {
                expected: MAP_HEIGHT,
                actual: siblings.len(),
            });
        }
        let mut repr = [0u8; 32];
        for (i, bit) in path.iter().enumerate() {
            if *bit {
                repr[i / 8] |= 1 << (i % 8);
            }
        }
        let key = Scalar::from_repr(repr).ok_or(WitnessError::NonCanonicalKey)?;
        Ok(Self {
            path,
            siblings,
            key,
        })
    }

    /// Key this witness addresses.
    pub fn key(&self) -> Scalar {
        self.key
    }

    pub fn path(&self) -> &[bool] {
        &self.path
    }

    pub fn siblings(&self) -> &[Scalar] {
        &self.siblings
    }

    /// Root of the map obtained by placing `value` at the addressed leaf.
    pub fn compute_root_and_key(&self, value: Scalar) -> (Scalar, Scalar) {
        let root = self
            .path
            .iter()
            .zip(&self.siblings)
            .fold(value, |node, (is_right, sibling)| {
                if *is_right {
                    hash_two(*sibling, node)
                } else {
                    hash_two(node, *sibling)
                }
            });
        (root, self.key)
    }
}

impl TryFrom<WitnessParts> for MerkleMapWitness {
    type Error = WitnessError;

    fn try_from(parts: WitnessParts) -> Result<Self, Self::Error> {
        Self::new(parts.path, parts.siblings)
    }
}

impl From<MerkleMapWitness> for WitnessParts {
    fn from(witness: MerkleMapWitness) -> Self {
        Self {
            path: witness.path,
            siblings: witness.siblings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn random_key() -> Scalar {
        Scalar::from_u64(rand::thread_rng().gen())
    }

    #[test]
    fn test_empty_map() {
        let map = MerkleMap::new();
        assert_eq!(map.root(), MerkleMap::empty_root());
        assert!(map.is_empty());
        assert_eq!(map.get(&Scalar::from_u64(5)), EMPTY);
    }

    #[test]
    fn test_witness_reproduces_root() {
        let mut map = MerkleMap::new();
        let key = random_key();
        let value = Scalar::from_u64(99);
        map.set(key, value);
        map.set(Scalar::from_u64(1), Scalar::from_u64(2));

        let witness = map.witness(&key);
        assert_eq!(witness.compute_root_and_key(value), (map.root(), key));
    }

    #[test]
    fn test_witness_predicts_update() {
        let mut map = MerkleMap::new();
        let key = Scalar::from_u64(12);
        map.set(Scalar::from_u64(13), Scalar::from_u64(1));

        let witness = map.witness(&key);
        let (predicted, _) = witness.compute_root_and_key(Scalar::from_u64(77));
        map.set(key, Scalar::from_u64(77));
        assert_eq!(predicted, map.root());
    }

    #[test]
    fn test_non_membership_and_removal() {
        let mut map = MerkleMap::new();
        map.set(Scalar::from_u64(3), Scalar::from_u64(30));
        let before = map.root();

        let absent = Scalar::from_u64(4);
        let (root, key) = map.witness(&absent).compute_root_and_key(EMPTY);
        assert_eq!(root, before);
        assert_eq!(key, absent);

        map.set(absent, Scalar::from_u64(40));
        assert_ne!(map.root(), before);
        map.set(absent, EMPTY);
        assert_eq!(map.root(), before);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_removal_prunes_nodes() {
        let mut map = MerkleMap::new();
        map.set(Scalar::from_u64(8), Scalar::from_u64(1));
        map.set(Scalar::from_u64(8), EMPTY);
        assert!(map.nodes.is_empty());
        assert_eq!(map.root(), MerkleMap::empty_root());
    }

    #[test]
    fn test_order_independent_rebuild() {
        let entries: Vec<_> = (1..20u64)
            .map(|i| (Scalar::from_u64(i * 7919), Scalar::from_u64(i)))
            .collect();
        let forward = MerkleMap::from_entries(entries.clone());
        let backward = MerkleMap::from_entries(entries.into_iter().rev());
        assert_eq!(forward, backward);
        assert_eq!(forward.len(), 19);
    }

    #[test]
    fn test_large_keys() {
        let mut map = MerkleMap::new();
        let key = Scalar::from_label("a key long enough to fill the high limbs of the index");
        map.set(key, Scalar::ONE);
        let witness = map.witness(&key);
        assert_eq!(witness.key(), key);
        assert_eq!(witness.compute_root_and_key(Scalar::ONE).0, map.root());
    }

    #[test]
    fn test_stale_witness_does_not_match() {
        let mut map = MerkleMap::new();
        let key = Scalar::from_u64(1);
        let witness = map.witness(&key);
        map.set(Scalar::from_u64(2), Scalar::from_u64(2));
        assert_ne!(witness.compute_root_and_key(EMPTY).0, map.root());
    }

    #[test]
    fn test_witness_validation() {
        assert_eq!(
            MerkleMapWitness::new(vec![false; 3], vec![EMPTY; MAP_HEIGHT]),
            Err(WitnessError::PathLength {
                expected: MAP_HEIGHT,
                actual: 3
            })
        );
        assert_eq!(
            MerkleMapWitness::new(vec![true; MAP_HEIGHT], vec![EMPTY; MAP_HEIGHT]),
            Err(WitnessError::NonCanonicalKey)
        );
    }

    #[test]
    fn test_witness_serde() {
        let mut map = MerkleMap::new();
        map.set(Scalar::from_u64(21), Scalar::from_u64(1));
        let witness = map.witness(&Scalar::from_u64(21));

        let json = serde_json::to_string(&witness).unwrap();
        let decoded: MerkleMapWitness = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, witness);

        let bytes = bincode::serialize(&witness).unwrap();
        let decoded: MerkleMapWitness = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded.key(), Scalar::from_u64(21));
    }
}
