//! Transparent backend: proves by recording the witness tree and verifies by
//! replaying every statement. Neither zero knowledge nor succinct.

use sha2::{Digest, Sha256};
use zkkv_common::{merge, one_step, OneStepInput, RollupPublicValues, VerifyingKeyDigest};

use crate::{NativeSeal, ProverError, RollupProof, RollupProver, RollupVerifier, Seal};

const NATIVE_PROGRAM_ID: &[u8] = b"zkkv-rollup/native/v1";

#[derive(Debug, Clone)]
pub struct NativeProver {
    vkey: VerifyingKeyDigest,
}

impl NativeProver {
    pub fn new() -> Self {
        let digest: [u8; 32] = Sha256::digest(NATIVE_PROGRAM_ID).into();
        Self::with_key(VerifyingKeyDigest::from_bytes(digest))
    }

    pub fn with_key(vkey: VerifyingKeyDigest) -> Self {
        Self { vkey }
    }

    fn replay(&self, proof: &RollupProof) -> Result<RollupPublicValues, ProverError> {
        let claimed = proof.public_values;
        if claimed.vkey != self.vkey {
            return Err(ProverError::ForeignKey {
                expected: self.vkey,
                actual: claimed.vkey,
            });
        }

        let replayed = match &proof.seal {
            Seal::Native(NativeSeal::OneStep(input)) => RollupPublicValues {
                state: one_step(input)?,
                vkey: self.vkey,
            },
            Seal::Native(NativeSeal::Merge(left, right)) => {
                let left = self.replay(left)?;
                let right = self.replay(right)?;
                merge(&left, &right)?
            }
            Seal::Sp1(_) => return Err(ProverError::UnsupportedSeal),
        };

        if replayed != claimed {
            return Err(ProverError::PublicValuesMismatch);
        }
        Ok(replayed)
    }
}

impl Default for NativeProver {
    fn default() -> Self {
        Self::new()
    }
}

impl RollupVerifier for NativeProver {
    fn verifying_key(&self) -> VerifyingKeyDigest {
        self.vkey
    }

    fn verify(&self, proof: &RollupProof) -> Result<(), ProverError> {
        self.replay(proof).map(|_| ())
    }
}

impl RollupProver for NativeProver {
    fn prove_one_step(&self, input: &OneStepInput) -> Result<RollupProof, ProverError> {
        let state = one_step(input)?;
        Ok(RollupProof {
            public_values: RollupPublicValues {
                state,
                vkey: self.vkey,
            },
            seal: Seal::Native(NativeSeal::OneStep(Box::new(input.clone()))),
        })
    }

    fn prove_merge(
        &self,
        left: &RollupProof,
        right: &RollupProof,
    ) -> Result<RollupProof, ProverError> {
        self.verify(left)?;
        self.verify(right)?;
        let public_values = merge(&left.public_values, &right.public_values)?;
        Ok(RollupProof {
            public_values,
            seal: Seal::Native(NativeSeal::Merge(
                Box::new(left.clone()),
                Box::new(right.clone()),
            )),
        })
    }
}
