use serde::Serialize;
use zkkv_common::Scalar;

/// Single-value register that only moves through compare-and-swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommitmentRegister {
    value: Scalar,
    version: u64,
}

impl CommitmentRegister {
    pub fn new(value: Scalar) -> Self {
        Self { value, version: 0 }
    }

    pub fn get(&self) -> Scalar {
        self.value
    }

    /// Number of successful swaps so far.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Replaces the value if it still equals `expected`; returns the value
    /// found otherwise.
    pub fn compare_and_swap(&mut self, expected: Scalar, new: Scalar) -> Result<u64, Scalar> {
        if self.value != expected {
            return Err(self.value);
        }
        self.value = new;
        self.version += 1;
        Ok(self.version)
    }
}

/// On-ledger state: the manager store and its committed root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContractState {
    pub store_identifier: Scalar,
    pub store_commitment: CommitmentRegister,
}

impl ContractState {
    pub fn new(store_identifier: Scalar, store_commitment: Scalar) -> Self {
        Self {
            store_identifier,
            store_commitment: CommitmentRegister::new(store_commitment),
        }
    }
}
