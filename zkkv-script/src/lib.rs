use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use zkkv_common::{
    OneStepInput, RollupError, RollupPublicValues, RollupState, Scalar, VerifyingKeyDigest,
};

pub mod native;
pub mod rollup;
#[cfg(feature = "sp1")]
pub mod sp1;
pub mod validation;

pub use native::NativeProver;
#[cfg(feature = "sp1")]
pub use sp1::Sp1RollupProver;

/// A rollup proof: the statement it commits to and backend-specific evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollupProof {
    pub public_values: RollupPublicValues,
    pub seal: Seal,
}

impl RollupProof {
    pub fn state(&self) -> RollupState {
        self.public_values.state
    }

    pub fn root0(&self) -> Scalar {
        self.public_values.state.root0
    }

    pub fn root1(&self) -> Scalar {
        self.public_values.state.root1
    }

    pub fn vkey(&self) -> VerifyingKeyDigest {
        self.public_values.vkey
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Seal {
    Native(NativeSeal),
    /// A bincode-encoded compressed SP1 proof.
    Sp1(Vec<u8>),
}

/// The full witness tree, replayed on verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NativeSeal {
    OneStep(Box<OneStepInput>),
    Merge(Box<RollupProof>, Box<RollupProof>),
}

#[derive(Debug, Error)]
pub enum ProverError {
    #[error(transparent)]
    Statement(#[from] RollupError),
    #[error(transparent)]
    Validation(#[from] validation::ValidationError),
    #[error("proof was produced under {actual}, expected {expected}")]
    ForeignKey {
        expected: VerifyingKeyDigest,
        actual: VerifyingKeyDigest,
    },
    #[error("public values do not match the proven statement")]
    PublicValuesMismatch,
    #[error("seal was not produced by this backend")]
    UnsupportedSeal,
    #[error("proving backend failed: {0}")]
    Backend(String),
}

pub trait RollupVerifier {
    /// Digest every proof accepted by `verify` is bound to.
    fn verifying_key(&self) -> VerifyingKeyDigest;

    fn verify(&self, proof: &RollupProof) -> Result<(), ProverError>;
}

pub trait RollupProver: RollupVerifier {
    fn prove_one_step(&self, input: &OneStepInput) -> Result<RollupProof, ProverError>;

    /// Proves `left` followed by `right`. Both children are verified first.
    fn prove_merge(&self, left: &RollupProof, right: &RollupProof)
        -> Result<RollupProof, ProverError>;
}

impl<T: RollupVerifier + ?Sized> RollupVerifier for Arc<T> {
    fn verifying_key(&self) -> VerifyingKeyDigest {
        (**self).verifying_key()
    }

    fn verify(&self, proof: &RollupProof) -> Result<(), ProverError> {
        (**self).verify(proof)
    }
}

impl<T: RollupProver + ?Sized> RollupProver for Arc<T> {
    fn prove_one_step(&self, input: &OneStepInput) -> Result<RollupProof, ProverError> {
        (**self).prove_one_step(input)
    }

    fn prove_merge(
        &self,
        left: &RollupProof,
        right: &RollupProof,
    ) -> Result<RollupProof, ProverError> {
        (**self).prove_merge(left, right)
    }
}
