//! Poseidon sponge shared by commitments, nullifier hashes and the tree.
//!
//! Parameters must match the withdrawal circuit exactly.

use std::sync::LazyLock;

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::{
    CryptographicSponge,
    poseidon::{PoseidonConfig, PoseidonSponge, find_poseidon_ark_and_mds},
};

static CONFIG: LazyLock<PoseidonConfig<Fr>> = LazyLock::new(poseidon_config);

/// Poseidon configuration for the shielded pool
///
/// Field: BN254 Fr (254 bits)
/// Rate: 2, Capacity: 1
/// Security: 128 bits
fn poseidon_config() -> PoseidonConfig<Fr> {
    let prime_bits: u64 = 254;
    let rate: usize = 2;
    let capacity: usize = 1;
    let full_rounds: u64 = 8;
    let partial_rounds: u64 = 57;
    let alpha: u64 = 5;
    let skip_matrices: u64 = 0;

    let (ark, mds) = find_poseidon_ark_and_mds::<Fr>(
        prime_bits,
        rate,
        full_rounds,
        partial_rounds,
        skip_matrices,
    );

    PoseidonConfig::new(
        full_rounds as usize,
        partial_rounds as usize,
        alpha,
        mds,
        ark,
        rate,
        capacity,
    )
}

/// Absorb `inputs` in order and squeeze one element
pub fn hash(inputs: &[Fr]) -> Fr {
    let mut sponge = PoseidonSponge::<Fr>::new(&*CONFIG);
    for input in inputs {
        sponge.absorb(input);
    }
    sponge.squeeze_field_elements::<Fr>(1)[0]
}
