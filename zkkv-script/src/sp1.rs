//! Compressed SP1 proofs of the rollup program.

use sp1_sdk::{
    HashableKey, ProverClient, SP1Proof, SP1ProofWithPublicValues, SP1ProvingKey, SP1Stdin,
    SP1VerifyingKey,
};
use tracing::{debug, info};
use zkkv_common::{OneStepInput, RollupCircuit, RollupPublicValues, VerifyingKeyDigest};

use crate::{ProverError, RollupProof, RollupProver, RollupVerifier, Seal};

pub const ROLLUP_ELF: &[u8] = include_bytes!(env!("SP1_ELF_zkkv-program"));

pub struct Sp1RollupProver {
    client: ProverClient,
    pk: SP1ProvingKey,
    vk: SP1VerifyingKey,
    vkey: VerifyingKeyDigest,
}

impl Sp1RollupProver {
    /// Runs the program setup. Slow; prefer [`Sp1RollupProver::from_keys`]
    /// with cached keys.
    pub fn new() -> Self {
        let client = ProverClient::new();
        let (pk, vk) = client.setup(ROLLUP_ELF);
        Self::from_keys(client, pk, vk)
    }

    pub fn from_keys(client: ProverClient, pk: SP1ProvingKey, vk: SP1VerifyingKey) -> Self {
        let vkey = VerifyingKeyDigest(vk.hash_u32());
        info!("rollup program verification key {}", vk.bytes32());
        Self {
            client,
            pk,
            vk,
            vkey,
        }
    }

    pub fn keys(&self) -> (&SP1ProvingKey, &SP1VerifyingKey) {
        (&self.pk, &self.vk)
    }

    /// Runs a circuit without proving and returns its output and cycle count.
    pub fn execute(&self, circuit: &RollupCircuit) -> Result<(RollupPublicValues, u64), ProverError> {
        let mut stdin = SP1Stdin::new();
        stdin.write(circuit);
        let (mut output, report) = self
            .client
            .execute(ROLLUP_ELF, stdin)
            .run()
            .map_err(|e| ProverError::Backend(e.to_string()))?;
        let public_values = output.read::<RollupPublicValues>();
        Ok((public_values, report.total_instruction_count()))
    }

    fn prove(&self, stdin: SP1Stdin) -> Result<RollupProof, ProverError> {
        let mut proof = self
            .client
            .prove(&self.pk, stdin)
            .compressed()
            .run()
            .map_err(|e| ProverError::Backend(e.to_string()))?;
        let public_values = proof.public_values.read::<RollupPublicValues>();
        let seal = bincode::serialize(&proof).map_err(|e| ProverError::Backend(e.to_string()))?;
        Ok(RollupProof {
            public_values,
            seal: Seal::Sp1(seal),
        })
    }

    fn decode(proof: &RollupProof) -> Result<SP1ProofWithPublicValues, ProverError> {
        match &proof.seal {
            Seal::Sp1(bytes) => {
                bincode::deserialize(bytes).map_err(|e| ProverError::Backend(e.to_string()))
            }
            Seal::Native(_) => Err(ProverError::UnsupportedSeal),
        }
    }
}

impl RollupVerifier for Sp1RollupProver {
    fn verifying_key(&self) -> VerifyingKeyDigest {
        self.vkey
    }

    fn verify(&self, proof: &RollupProof) -> Result<(), ProverError> {
        if proof.vkey() != self.vkey {
            return Err(ProverError::ForeignKey {
                expected: self.vkey,
                actual: proof.vkey(),
            });
        }
        let mut inner = Self::decode(proof)?;
        self.client
            .verify(&inner, &self.vk)
            .map_err(|e| ProverError::Backend(e.to_string()))?;
        let committed = inner.public_values.read::<RollupPublicValues>();
        if committed != proof.public_values {
            return Err(ProverError::PublicValuesMismatch);
        }
        Ok(())
    }
}

impl RollupProver for Sp1RollupProver {
    fn prove_one_step(&self, input: &OneStepInput) -> Result<RollupProof, ProverError> {
        let circuit = RollupCircuit::OneStep {
            vkey: self.vkey,
            input: input.clone(),
        };
        circuit.execute()?;

        let mut stdin = SP1Stdin::new();
        stdin.write(&circuit);
        debug!("proving one step {} -> {}", input.root0, input.root1);
        self.prove(stdin)
    }

    fn prove_merge(
        &self,
        left: &RollupProof,
        right: &RollupProof,
    ) -> Result<RollupProof, ProverError> {
        let circuit = RollupCircuit::Merge {
            vkey: self.vkey,
            left: left.public_values,
            right: right.public_values,
        };
        circuit.execute()?;

        let mut stdin = SP1Stdin::new();
        stdin.write(&circuit);
        for child in [left, right] {
            let inner = Self::decode(child)?;
            let SP1Proof::Compressed(reduced) = inner.proof else {
                return Err(ProverError::Backend("child proof is not compressed".into()));
            };
            stdin.write_proof(*reduced, self.vk.vk.clone());
        }
        debug!("proving merge {} -> {}", left.root0(), right.root1());
        self.prove(stdin)
    }
}
