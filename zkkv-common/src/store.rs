use serde::{Deserialize, Serialize};

use crate::field::Scalar;
use crate::poseidon::hash;

/// Number of pass-through metadata fields carried by a [`Record`].
pub const META_LEN: usize = 3;

/// A store: its immutable identifier and the root of its own map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Store {
    pub identifier: Scalar,
    pub commitment: Scalar,
}

impl Store {
    pub fn new(identifier: Scalar, commitment: Scalar) -> Self {
        Self {
            identifier,
            commitment,
        }
    }

    /// Key of this store inside the manager map.
    pub fn key(&self) -> Scalar {
        self.identifier
    }

    /// Value of this store inside the manager map.
    pub fn value(&self) -> Scalar {
        self.commitment
    }

    pub fn set_commitment(&self, commitment: Scalar) -> Store {
        Store {
            identifier: self.identifier,
            commitment,
        }
    }
}

/// A keyed value inside a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub store: Store,
    pub key: Scalar,
    pub value: Scalar,
    pub meta: [Scalar; META_LEN],
}

impl Record {
    pub fn init(store: Store, key: Scalar, value: Scalar) -> Self {
        Self {
            store,
            key,
            value,
            meta: Default::default(),
        }
    }

    pub fn with_meta(mut self, meta: [Scalar; META_LEN]) -> Self {
        self.meta = meta;
        self
    }

    pub fn key(&self) -> Scalar {
        self.key
    }

    pub fn value(&self) -> Scalar {
        self.value
    }

    /// Binds a pending write to its payload.
    pub fn checksum(&self) -> Scalar {
        hash([
            self.store.identifier,
            self.key,
            self.value,
            self.meta[0],
            self.meta[1],
            self.meta[2],
        ])
    }
}
