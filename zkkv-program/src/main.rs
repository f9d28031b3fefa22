#![no_main]
sp1_zkvm::entrypoint!(main);

use sha2::{Digest, Sha256};
use zkkv_common::{RollupCircuit, RollupPublicValues};

/// Checks that a proof committing to `child` was produced under `child.vkey`.
fn verify_child(child: &RollupPublicValues) {
    let public_values = bincode::serialize(child).unwrap();
    let digest: [u8; 32] = Sha256::digest(&public_values).into();
    sp1_zkvm::lib::verify::verify_sp1_proof(&child.vkey.0, &digest);
}

pub fn main() {
    let circuit = sp1_zkvm::io::read::<RollupCircuit>();

    if let RollupCircuit::Merge { left, right, .. } = &circuit {
        verify_child(left);
        verify_child(right);
    }

    let output = match circuit.execute() {
        Ok(output) => output,
        Err(e) => panic!("rollup statement failed: {e}"),
    };
    sp1_zkvm::io::commit(&output);
}
