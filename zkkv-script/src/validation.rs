use thiserror::Error;
use zkkv_common::{OneStepInput, RollupState, Scalar};

use crate::RollupProof;

pub const MAX_BATCH_SIZE: usize = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Empty batch")]
    EmptyBatch,
    #[error("Invalid batch size: {0}")]
    InvalidBatchSize(usize),
    #[error("Broken chain at step {index}: expected root {expected}, got {actual}")]
    BrokenChain {
        index: usize,
        expected: Scalar,
        actual: Scalar,
    },
}

fn validate_links(states: impl IntoIterator<Item = RollupState>) -> Result<usize, ValidationError> {
    let mut count = 0;
    let mut previous: Option<RollupState> = None;
    for (index, state) in states.into_iter().enumerate() {
        if let Some(prev) = previous {
            if prev.root1 != state.root0 {
                return Err(ValidationError::BrokenChain {
                    index,
                    expected: prev.root1,
                    actual: state.root0,
                });
            }
        }
        previous = Some(state);
        count += 1;
    }
    if count == 0 {
        return Err(ValidationError::EmptyBatch);
    }
    Ok(count)
}

/// Validates a batch of one-step inputs before proving
pub fn validate_chain(steps: &[OneStepInput]) -> Result<(), ValidationError> {
    if steps.len() > MAX_BATCH_SIZE {
        return Err(ValidationError::InvalidBatchSize(steps.len()));
    }
    validate_links(steps.iter().map(OneStepInput::state))?;
    Ok(())
}

/// Validates that proofs can be merged in the given order
pub fn validate_proof_chain(proofs: &[RollupProof]) -> Result<(), ValidationError> {
    validate_links(proofs.iter().map(RollupProof::state))?;
    Ok(())
}
