pub mod error;
pub mod events;
pub mod field;
pub mod merkle_map;
pub mod poseidon;
pub mod rollup;
pub mod store;
pub mod store_maps;

pub use error::{RollupError, ScalarError, WitnessError};
pub use events::{EventStore, EventStoreCommit, EventStorePending, StoreEvent};
pub use field::{Scalar, EMPTY};
pub use merkle_map::{MerkleMap, MerkleMapWitness, MAP_HEIGHT};
pub use rollup::{
    merge, one_step, OneStepInput, RollupCircuit, RollupPublicValues, RollupState, StepWitness,
    VerifyingKeyDigest,
};
pub use store::{Record, Store, META_LEN};
pub use store_maps::StoreMaps;

mod hex_words {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer, const N: usize>(
        words: &[u32; N],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_be_bytes()).collect();
            serializer.serialize_str(&hex::encode(bytes))
        } else {
            words.as_slice().serialize(serializer)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(
        deserializer: D,
    ) -> Result<[u32; N], D::Error> {
        if !deserializer.is_human_readable() {
            let words: Vec<u32> = Vec::deserialize(deserializer)?;
            return words
                .try_into()
                .map_err(|_| serde::de::Error::custom(format!("Expected {} words", N)));
        }
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        if bytes.len() != N * 4 {
            return Err(serde::de::Error::custom(format!(
                "Expected {} bytes but got {}",
                N * 4,
                bytes.len()
            )));
        }
        let mut words = [0u32; N];
        for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(4)) {
            *word = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Ok(words)
    }
}
