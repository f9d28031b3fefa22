use thiserror::Error;

use crate::field::Scalar;

/// Errors decoding a [`Scalar`] from text or bytes.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScalarError {
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
    #[error("scalar encoding is {0} bytes, at most 32 allowed")]
    TooLong(usize),
    #[error("not a canonical field element")]
    NonCanonical,
}

/// Errors building a [`crate::MerkleMapWitness`] from raw parts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WitnessError {
    #[error("witness path has {actual} levels, expected {expected}")]
    PathLength { expected: usize, actual: usize },
    #[error("witness has {actual} siblings, expected {expected}")]
    SiblingsLength { expected: usize, actual: usize },
    #[error("witness path does not address a canonical field element")]
    NonCanonicalKey,
}

/// Assertion failures of the rollup statements.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RollupError {
    /// The witness does not reproduce the asserted starting root.
    #[error("current StoreData assertion failed: witness computes {computed}, expected {expected}")]
    StaleWitness { expected: Scalar, computed: Scalar },

    /// The witness addresses a different key than the one claimed.
    #[error("witness addresses key {actual}, expected {expected}")]
    KeyMismatch { expected: Scalar, actual: Scalar },

    /// The declared resulting root is not the one the witness produces.
    #[error("latest root {declared} does not match computed root {computed}")]
    RootMismatch { declared: Scalar, computed: Scalar },

    /// Two proofs do not chain: the left end state is not the right start state.
    #[error("chain mismatch: left proof ends at {left_root1}, right proof starts at {right_root0}")]
    ChainMismatch { left_root1: Scalar, right_root0: Scalar },

    #[error("proofs were produced under different verification keys")]
    VerifyingKeyMismatch,
}
