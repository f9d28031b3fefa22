//! Collapsing a chain of one-step proofs into a single proof.
//!
//! Steps are proven in the order the writes are applied; reduction keeps
//! that order, so the result always proves `first.root0 -> last.root1`.

use tracing::{debug, info};
use zkkv_common::OneStepInput;

use crate::validation::{self, ValidationError};
use crate::{ProverError, RollupProof, RollupProver};

/// Proves every step and reduces the proofs pairwise.
pub fn prove_chain<P: RollupProver + ?Sized>(
    prover: &P,
    steps: &[OneStepInput],
) -> Result<RollupProof, ProverError> {
    validation::validate_chain(steps)?;

    let proofs = steps
        .iter()
        .map(|step| prover.prove_one_step(step))
        .collect::<Result<Vec<_>, _>>()?;
    info!("proved {} one-step transitions", proofs.len());

    reduce_pairwise(prover, proofs)
}

/// Merges adjacent pairs level by level; depth is logarithmic in the number
/// of proofs. An odd proof at the end of a level is carried up unchanged.
pub fn reduce_pairwise<P: RollupProver + ?Sized>(
    prover: &P,
    proofs: Vec<RollupProof>,
) -> Result<RollupProof, ProverError> {
    validation::validate_proof_chain(&proofs)?;

    let mut level = proofs;
    let mut depth = 0;
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        let mut iter = level.into_iter();
        while let Some(left) = iter.next() {
            match iter.next() {
                Some(right) => next.push(prover.prove_merge(&left, &right)?),
                None => next.push(left),
            }
        }
        depth += 1;
        debug!("reduction level {} holds {} proofs", depth, next.len());
        level = next;
    }

    level.pop().ok_or(ProverError::Validation(ValidationError::EmptyBatch))
}

/// Left fold over the proofs, one merge per proof.
pub fn reduce_sequential<P: RollupProver + ?Sized>(
    prover: &P,
    proofs: Vec<RollupProof>,
) -> Result<RollupProof, ProverError> {
    validation::validate_proof_chain(&proofs)?;

    let mut iter = proofs.into_iter();
    let first = iter
        .next()
        .ok_or(ProverError::Validation(ValidationError::EmptyBatch))?;
    iter.try_fold(first, |acc, next| prover.prove_merge(&acc, &next))
}
