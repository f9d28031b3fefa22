use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use zkkv_common::{MerkleMap, OneStepInput, Scalar, StoreMaps};
use zkkv_script::{rollup::prove_chain, ProverError, RollupVerifier};

#[derive(Parser, Debug)]
struct Args {
    /// Execute without proof generation
    #[arg(long)]
    execute: bool,

    /// Generate proof
    #[arg(long)]
    prove: bool,

    /// Number of writes in the demo batch
    #[arg(long, default_value_t = 4)]
    steps: u64,
}

/// Writes spread over two stores, as a sequencer would batch them.
fn demo_steps(n: u64) -> Vec<OneStepInput> {
    let mut maps = StoreMaps::new(Scalar::from_label("zkkv-rollup-demo"));
    let stores = [Scalar::from_label("store0"), Scalar::from_label("store1")];
    for id in stores {
        maps.add_store(id, MerkleMap::new());
    }
    (0..n)
        .map(|i| {
            let store_id = stores[(i % 2) as usize];
            maps.apply_set(store_id, Scalar::from_u64(222 + i), Scalar::from_u64(999 + i))
        })
        .collect()
}

#[cfg(not(feature = "sp1"))]
mod backend {
    use tracing::info;
    use zkkv_common::{OneStepInput, RollupCircuit};
    use zkkv_script::{NativeProver, ProverError, RollupVerifier};

    pub fn init_logger() {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .init();
    }

    pub fn load_prover() -> Result<NativeProver, ProverError> {
        Ok(NativeProver::new())
    }

    pub fn execute(steps: &[OneStepInput]) -> Result<(), ProverError> {
        let vkey = NativeProver::new().verifying_key();
        for step in steps {
            let circuit = RollupCircuit::OneStep {
                vkey,
                input: step.clone(),
            };
            let output = circuit.execute()?;
            info!("step {} -> {}", output.root0(), output.root1());
        }
        Ok(())
    }
}

#[cfg(feature = "sp1")]
mod backend {
    use std::fs;
    use std::path::PathBuf;

    use sp1_sdk::ProverClient;
    use tracing::info;
    use zkkv_common::{OneStepInput, RollupCircuit};
    use zkkv_script::{sp1::ROLLUP_ELF, ProverError, RollupVerifier, Sp1RollupProver};

    const PROVING_KEY_DIR: &str = "proving_keys";
    const PROVING_KEY_FILE: &str = "zkkv_program.key";
    const VERIFYING_KEY_FILE: &str = "zkkv_program.vk";

    fn backend_error(e: impl std::fmt::Display) -> ProverError {
        ProverError::Backend(e.to_string())
    }

    fn get_key_paths() -> (PathBuf, PathBuf) {
        let base_path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(PROVING_KEY_DIR);
        (
            base_path.join(PROVING_KEY_FILE),
            base_path.join(VERIFYING_KEY_FILE),
        )
    }

    fn ensure_proving_key_dir() -> std::io::Result<()> {
        fs::create_dir_all(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(PROVING_KEY_DIR))
    }

    pub fn init_logger() {
        sp1_sdk::utils::setup_logger();
    }

    pub fn load_prover() -> Result<Sp1RollupProver, ProverError> {
        ensure_proving_key_dir().map_err(backend_error)?;
        let (pk_path, vk_path) = get_key_paths();
        let client = ProverClient::new();

        let (pk, vk) = if pk_path.exists() && vk_path.exists() {
            info!("Loading existing proving and verifying keys...");
            let pk = bincode::deserialize(&fs::read(&pk_path).map_err(backend_error)?)
                .map_err(backend_error)?;
            let vk = bincode::deserialize(&fs::read(&vk_path).map_err(backend_error)?)
                .map_err(backend_error)?;
            (pk, vk)
        } else {
            info!("Generating new proving and verifying keys...");
            let (pk, vk) = client.setup(ROLLUP_ELF);
            fs::write(&pk_path, bincode::serialize(&pk).map_err(backend_error)?)
                .map_err(backend_error)?;
            fs::write(&vk_path, bincode::serialize(&vk).map_err(backend_error)?)
                .map_err(backend_error)?;
            (pk, vk)
        };

        Ok(Sp1RollupProver::from_keys(client, pk, vk))
    }

    pub fn execute(steps: &[OneStepInput]) -> Result<(), ProverError> {
        let prover = load_prover()?;
        let vkey = prover.verifying_key();
        let mut cycles = 0;
        for step in steps {
            let circuit = RollupCircuit::OneStep {
                vkey,
                input: step.clone(),
            };
            let (output, step_cycles) = prover.execute(&circuit)?;
            info!("step {} -> {} ({} cycles)", output.root0(), output.root1(), step_cycles);
            cycles += step_cycles;
        }
        info!("Number of cycles: {}", cycles);
        Ok(())
    }
}

fn prove(steps: &[OneStepInput]) -> Result<(), ProverError> {
    let prover = backend::load_prover()?;
    info!("Generating proof...");
    let proof = prove_chain(&prover, steps)?;
    info!("Successfully generated proof!");

    prover.verify(&proof)?;
    info!(
        "Successfully verified proof: {} -> {}",
        proof.root0(),
        proof.root1()
    );
    Ok(())
}

fn main() -> ExitCode {
    backend::init_logger();

    let args = Args::parse();
    if args.execute == args.prove {
        eprintln!("Error: You must specify either --execute or --prove");
        return ExitCode::FAILURE;
    }

    let steps = demo_steps(args.steps);
    let result = if args.execute {
        backend::execute(&steps)
    } else {
        prove(&steps)
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
