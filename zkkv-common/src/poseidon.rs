//! Poseidon hashing over the Pallas base field.

use ff::{Field, PrimeField};
use halo2_gadgets::poseidon::primitives::{self as poseidon, ConstantLength, P128Pow5T3};
use pasta_curves::Fp;

use crate::field::Scalar;

/// Bytes packed into one field element when hashing labels.
const LABEL_CHUNK: usize = 31;

/// Poseidon over a fixed number of field elements.
pub fn hash<const L: usize>(inputs: [Scalar; L]) -> Scalar {
    let message = inputs.map(Fp::from);
    let digest = poseidon::Hash::<_, P128Pow5T3, ConstantLength<L>, 3, 2>::init().hash(message);
    Scalar::from(digest)
}

/// Internal node digest of the authenticated map.
pub fn hash_two(left: Scalar, right: Scalar) -> Scalar {
    hash([left, right])
}

impl Scalar {
    /// Derives an identifier from a text label.
    ///
    /// The label length is absorbed first so that labels differing only in
    /// trailing zero bytes do not collide.
    pub fn from_label(label: &str) -> Scalar {
        let bytes = label.as_bytes();
        let mut acc = Scalar::from_u64(bytes.len() as u64);
        for chunk in bytes.chunks(LABEL_CHUNK) {
            let mut repr = [0u8; 32];
            repr[..chunk.len()].copy_from_slice(chunk);
            // 31 bytes never exceed the modulus.
            let element = Option::<Fp>::from(Fp::from_repr(repr)).unwrap_or(Fp::ZERO);
            acc = hash_two(acc, Scalar::from(element));
        }
        acc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::EMPTY;

    #[test]
    fn test_hash_is_deterministic() {
        let a = Scalar::from_u64(1);
        let b = Scalar::from_u64(2);
        assert_eq!(hash_two(a, b), hash_two(a, b));
        assert_ne!(hash_two(a, b), hash_two(b, a));
        assert_ne!(hash_two(EMPTY, EMPTY), EMPTY);
    }

    #[test]
    fn test_arity_changes_digest() {
        let a = Scalar::from_u64(7);
        assert_ne!(hash([a, a]), hash([a, a, a]));
    }

    #[test]
    fn test_labels() {
        assert_eq!(Scalar::from_label("manager"), Scalar::from_label("manager"));
        assert_ne!(Scalar::from_label("manager"), Scalar::from_label("store"));
        assert_ne!(Scalar::from_label("a"), Scalar::from_label("a\0"));
        let long = "x".repeat(100);
        assert_ne!(Scalar::from_label(&long), Scalar::from_label(&long[..99]));
    }
}
