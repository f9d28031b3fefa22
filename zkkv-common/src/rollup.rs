//! Statements proven by the rollup program.
//!
//! A one-step proof attests to a single authenticated write `root0 -> root1`.
//! A merge proof attests to two chained proofs produced under the same
//! verification key and yields the composed transition.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RollupError;
use crate::field::Scalar;
use crate::merkle_map::MerkleMapWitness;

/// A transition of the manager commitment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RollupState {
    pub root0: Scalar,
    pub root1: Scalar,
}

impl RollupState {
    pub fn new(root0: Scalar, root1: Scalar) -> Self {
        Self { root0, root1 }
    }
}

/// Digest of the rollup program's verification key, as the zkVM exposes it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VerifyingKeyDigest(#[serde(with = "crate::hex_words")] pub [u32; 8]);

impl VerifyingKeyDigest {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        let mut words = [0u32; 8];
        for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(4)) {
            let mut be = [0u8; 4];
            be.copy_from_slice(chunk);
            *word = u32::from_be_bytes(be);
        }
        Self(words)
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        for (chunk, word) in bytes.chunks_exact_mut(4).zip(self.0) {
            chunk.copy_from_slice(&word.to_be_bytes());
        }
        bytes
    }
}

impl fmt::Display for VerifyingKeyDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.to_bytes()))
    }
}

/// Everything a rollup proof commits to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollupPublicValues {
    pub state: RollupState,
    pub vkey: VerifyingKeyDigest,
}

impl RollupPublicValues {
    pub fn root0(&self) -> Scalar {
        self.state.root0
    }

    pub fn root1(&self) -> Scalar {
        self.state.root1
    }
}

/// Authentication of one write, against the manager map alone or through a
/// store map nested inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepWitness {
    Manager(MerkleMapWitness),
    Store {
        store_id: Scalar,
        witness_store: MerkleMapWitness,
        witness_manager: MerkleMapWitness,
    },
}

impl StepWitness {
    /// Manager root and addressed key after placing `value` at the leaf.
    pub fn compute_root_and_key(&self, value: Scalar) -> Result<(Scalar, Scalar), RollupError> {
        match self {
            StepWitness::Manager(witness) => Ok(witness.compute_root_and_key(value)),
            StepWitness::Store {
                store_id,
                witness_store,
                witness_manager,
            } => {
                let (store_root, key) = witness_store.compute_root_and_key(value);
                let (root, addressed_store) = witness_manager.compute_root_and_key(store_root);
                if addressed_store != *store_id {
                    return Err(RollupError::KeyMismatch {
                        expected: *store_id,
                        actual: addressed_store,
                    });
                }
                Ok((root, key))
            }
        }
    }
}

/// Private input of a one-step proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneStepInput {
    pub root0: Scalar,
    pub root1: Scalar,
    pub key: Scalar,
    pub value0: Scalar,
    pub value1: Scalar,
    pub witness: StepWitness,
}

impl OneStepInput {
    pub fn state(&self) -> RollupState {
        RollupState::new(self.root0, self.root1)
    }
}

pub fn one_step(input: &OneStepInput) -> Result<RollupState, RollupError> {
    let (root0, key) = input.witness.compute_root_and_key(input.value0)?;
    if root0 != input.root0 {
        return Err(RollupError::StaleWitness {
            expected: input.root0,
            computed: root0,
        });
    }
    if key != input.key {
        return Err(RollupError::KeyMismatch {
            expected: input.key,
            actual: key,
        });
    }

    let (root1, _) = input.witness.compute_root_and_key(input.value1)?;
    if root1 != input.root1 {
        return Err(RollupError::RootMismatch {
            declared: input.root1,
            computed: root1,
        });
    }

    Ok(input.state())
}

pub fn merge(
    left: &RollupPublicValues,
    right: &RollupPublicValues,
) -> Result<RollupPublicValues, RollupError> {
    if left.vkey != right.vkey {
        return Err(RollupError::VerifyingKeyMismatch);
    }
    if left.state.root1 != right.state.root0 {
        return Err(RollupError::ChainMismatch {
            left_root1: left.state.root1,
            right_root0: right.state.root0,
        });
    }
    Ok(RollupPublicValues {
        state: RollupState::new(left.state.root0, right.state.root1),
        vkey: left.vkey,
    })
}

/// Input of the rollup program: one node of the proof tree.
///
/// `vkey` is the key the proof is produced under. For `Merge`, both children
/// must carry it too; their proofs travel next to this value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RollupCircuit {
    OneStep {
        vkey: VerifyingKeyDigest,
        input: OneStepInput,
    },
    Merge {
        vkey: VerifyingKeyDigest,
        left: RollupPublicValues,
        right: RollupPublicValues,
    },
}

impl RollupCircuit {
    pub fn vkey(&self) -> VerifyingKeyDigest {
        match self {
            RollupCircuit::OneStep { vkey, .. } | RollupCircuit::Merge { vkey, .. } => *vkey,
        }
    }

    /// Runs the statement. Child proofs of a merge are not checked here.
    pub fn execute(&self) -> Result<RollupPublicValues, RollupError> {
        match self {
            RollupCircuit::OneStep { vkey, input } => Ok(RollupPublicValues {
                state: one_step(input)?,
                vkey: *vkey,
            }),
            RollupCircuit::Merge { vkey, left, right } => {
                if left.vkey != *vkey {
                    return Err(RollupError::VerifyingKeyMismatch);
                }
                merge(left, right)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::EMPTY;
    use crate::merkle_map::MerkleMap;

    fn vkey() -> VerifyingKeyDigest {
        VerifyingKeyDigest([1, 2, 3, 4, 5, 6, 7, 8])
    }

    fn manager_step(map: &mut MerkleMap, key: u64, value: u64) -> OneStepInput {
        let key = Scalar::from_u64(key);
        let root0 = map.root();
        let value0 = map.get(&key);
        let witness = map.witness(&key);
        map.set(key, Scalar::from_u64(value));
        OneStepInput {
            root0,
            root1: map.root(),
            key,
            value0,
            value1: Scalar::from_u64(value),
            witness: StepWitness::Manager(witness),
        }
    }

    #[test]
    fn test_one_step() {
        let mut map = MerkleMap::new();
        let input = manager_step(&mut map, 1, 10);
        let state = one_step(&input).unwrap();
        assert_eq!(state.root0, MerkleMap::empty_root());
        assert_eq!(state.root1, map.root());
    }

    #[test]
    fn test_one_step_rejects_stale_witness() {
        let mut map = MerkleMap::new();
        let mut input = manager_step(&mut map, 1, 10);
        input.value0 = Scalar::from_u64(3);
        assert!(matches!(one_step(&input), Err(RollupError::StaleWitness { .. })));
    }

    #[test]
    fn test_one_step_rejects_wrong_key_and_root() {
        let mut map = MerkleMap::new();
        let input = manager_step(&mut map, 1, 10);

        let mut wrong_key = input.clone();
        wrong_key.key = Scalar::from_u64(2);
        assert!(matches!(one_step(&wrong_key), Err(RollupError::KeyMismatch { .. })));

        let mut wrong_root = input;
        wrong_root.root1 = EMPTY;
        assert!(matches!(one_step(&wrong_root), Err(RollupError::RootMismatch { .. })));
    }

    #[test]
    fn test_two_level_step() {
        let store_id = Scalar::from_u64(100);
        let key = Scalar::from_u64(7);
        let mut store = MerkleMap::new();
        let mut manager = MerkleMap::new();
        manager.set(store_id, store.root());

        let witness_store = store.witness(&key);
        let witness_manager = manager.witness(&store_id);
        let root0 = manager.root();
        store.set(key, Scalar::from_u64(70));
        manager.set(store_id, store.root());

        let input = OneStepInput {
            root0,
            root1: manager.root(),
            key,
            value0: EMPTY,
            value1: Scalar::from_u64(70),
            witness: StepWitness::Store {
                store_id,
                witness_store,
                witness_manager,
            },
        };
        assert_eq!(one_step(&input).unwrap(), RollupState::new(root0, manager.root()));

        let mut other_store = input.clone();
        if let StepWitness::Store { store_id, .. } = &mut other_store.witness {
            *store_id = Scalar::from_u64(101);
        }
        assert!(matches!(one_step(&other_store), Err(RollupError::KeyMismatch { .. })));
    }

    #[test]
    fn test_merge() {
        let a = Scalar::from_u64(1);
        let b = Scalar::from_u64(2);
        let c = Scalar::from_u64(3);
        let left = RollupPublicValues { state: RollupState::new(a, b), vkey: vkey() };
        let right = RollupPublicValues { state: RollupState::new(b, c), vkey: vkey() };

        let merged = merge(&left, &right).unwrap();
        assert_eq!(merged.state, RollupState::new(a, c));

        assert_eq!(
            merge(&right, &left),
            Err(RollupError::ChainMismatch { left_root1: c, right_root0: a })
        );

        let foreign = RollupPublicValues { vkey: VerifyingKeyDigest::default(), ..right };
        assert_eq!(merge(&left, &foreign), Err(RollupError::VerifyingKeyMismatch));
    }

    #[test]
    fn test_merge_circuit_checks_own_key() {
        let state = RollupState::new(Scalar::ONE, Scalar::ONE);
        let child = RollupPublicValues { state, vkey: vkey() };
        let circuit = RollupCircuit::Merge {
            vkey: VerifyingKeyDigest::default(),
            left: child,
            right: child,
        };
        assert_eq!(circuit.execute(), Err(RollupError::VerifyingKeyMismatch));
    }

    #[test]
    fn test_vkey_digest_bytes() {
        let digest = vkey();
        assert_eq!(VerifyingKeyDigest::from_bytes(digest.to_bytes()), digest);
        let json = serde_json::to_string(&digest).unwrap();
        assert_eq!(serde_json::from_str::<VerifyingKeyDigest>(&json).unwrap(), digest);
    }
}
