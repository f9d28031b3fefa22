use thiserror::Error;
use zkkv_common::{RollupError, Scalar, VerifyingKeyDigest};
use zkkv_script::ProverError;

/// Coarse classification of a rejected state-machine operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The witness computes a root other than the live commitment.
    StaleWitness,
    /// A merge of proofs whose roots do not chain.
    ChainMismatch,
    /// A settlement proof that does not start at the live commitment.
    StaleBase,
    VerificationFailure,
    InvalidInput,
}

#[derive(Debug, Error)]
pub enum ContractError {
    #[error("Store already added")]
    StoreAlreadyAdded,
    #[error("Store not added")]
    StoreNotAdded,
    #[error("current StoreData assertion failed")]
    StoreDataAssertion,
    #[error("Store keys do not match")]
    StoreKeysMismatch,
    #[error("StoreData keys do not match")]
    StoreDataKeysMismatch,
    #[error("witness addresses key {actual}, expected {expected}")]
    WitnessKeyMismatch { expected: Scalar, actual: Scalar },
    #[error("proof starts at {proof_root0} but the commitment is {commitment}")]
    StaleBase {
        commitment: Scalar,
        proof_root0: Scalar,
    },
    #[error("proof verification key {actual} is not the deployed key {expected}")]
    ForeignVerifyingKey {
        expected: VerifyingKeyDigest,
        actual: VerifyingKeyDigest,
    },
    #[error("rollup proof rejected: {0}")]
    VerificationFailure(#[source] ProverError),
}

impl ContractError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ContractError::StoreAlreadyAdded
            | ContractError::StoreNotAdded
            | ContractError::StoreDataAssertion => ErrorKind::StaleWitness,
            ContractError::StoreKeysMismatch
            | ContractError::StoreDataKeysMismatch
            | ContractError::WitnessKeyMismatch { .. } => ErrorKind::InvalidInput,
            ContractError::StaleBase { .. } => ErrorKind::StaleBase,
            ContractError::VerificationFailure(ProverError::Statement(
                RollupError::ChainMismatch { .. },
            )) => ErrorKind::ChainMismatch,
            ContractError::ForeignVerifyingKey { .. } | ContractError::VerificationFailure(_) => {
                ErrorKind::VerificationFailure
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid stored value: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error)]
pub enum IndexerError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("ledger is at height {ledger}, instance {address} was indexed up to {indexed}")]
    LedgerBehind {
        address: String,
        ledger: u64,
        indexed: u64,
    },
}

#[derive(Debug, Error)]
pub enum SequencerError {
    #[error(transparent)]
    Prover(#[from] ProverError),
    #[error(transparent)]
    Contract(#[from] ContractError),
}

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Indexer(#[from] IndexerError),
    #[error(transparent)]
    Sequencer(#[from] SequencerError),
    #[error(transparent)]
    Contract(#[from] ContractError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
