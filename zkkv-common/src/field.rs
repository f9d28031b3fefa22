//! The scalar type shared by identifiers, digests and stored values.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use ff::{Field, PrimeField};
use pasta_curves::Fp;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ScalarError;

/// An element of the Pallas base field.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Scalar(Fp);

/// The value of a key that is not present in a map.
pub const EMPTY: Scalar = Scalar(Fp::ZERO);

impl Scalar {
    pub const ZERO: Scalar = EMPTY;
    pub const ONE: Scalar = Scalar(Fp::ONE);

    pub fn from_u64(value: u64) -> Self {
        Self(Fp::from(value))
    }

    /// Decodes a canonical little-endian representation.
    pub fn from_repr(bytes: [u8; 32]) -> Option<Self> {
        Option::from(Fp::from_repr(bytes)).map(Self)
    }

    /// Canonical little-endian representation.
    pub fn to_repr(&self) -> [u8; 32] {
        self.0.to_repr()
    }

    pub fn inner(&self) -> Fp {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        *self == EMPTY
    }

    /// Bit `index` of the canonical representation, least significant first.
    pub fn bit(&self, index: usize) -> bool {
        let repr = self.to_repr();
        index < 256 && (repr[index / 8] >> (index % 8)) & 1 == 1
    }

    fn to_be_bytes(self) -> [u8; 32] {
        let mut bytes = self.to_repr();
        bytes.reverse();
        bytes
    }
}

impl Default for Scalar {
    fn default() -> Self {
        EMPTY
    }
}

impl From<u64> for Scalar {
    fn from(value: u64) -> Self {
        Self::from_u64(value)
    }
}

impl From<Fp> for Scalar {
    fn from(value: Fp) -> Self {
        Self(value)
    }
}

impl From<Scalar> for Fp {
    fn from(value: Scalar) -> Self {
        value.0
    }
}

impl Hash for Scalar {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_repr().hash(state);
    }
}

impl Ord for Scalar {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_be_bytes().cmp(&other.to_be_bytes())
    }
}

impl PartialOrd for Scalar {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.to_be_bytes()))
    }
}

impl fmt::Debug for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for Scalar {
    type Err = ScalarError;

    /// Parses big-endian hex, with or without a `0x` prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let digits = if digits.len() % 2 == 1 {
            format!("0{digits}")
        } else {
            digits.to_string()
        };
        let bytes = hex::decode(digits)?;
        if bytes.len() > 32 {
            return Err(ScalarError::TooLong(bytes.len()));
        }
        let mut repr = [0u8; 32];
        for (slot, byte) in repr.iter_mut().zip(bytes.iter().rev()) {
            *slot = *byte;
        }
        Self::from_repr(repr).ok_or(ScalarError::NonCanonical)
    }
}

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.collect_str(self)
        } else {
            self.to_repr().serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Scalar {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(de::Error::custom)
        } else {
            let bytes = <[u8; 32]>::deserialize(deserializer)?;
            Scalar::from_repr(bytes).ok_or_else(|| de::Error::custom(ScalarError::NonCanonical))
        }
    }
}
