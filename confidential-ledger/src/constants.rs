//! Crate-wide constants shared by the ledger core and the input verifier.

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::poseidon::{find_poseidon_ark_and_mds, PoseidonConfig};
use ark_ff::PrimeField;

/// Protocol identifier reported to clients so they seal inputs for the right network.
pub const PROTOCOL_ID: u64 = 10_001;

/// Number of rating categories. The set is closed; see [`crate::types::Category`].
pub const CATEGORY_COUNT: usize = 6;

/// Inclusive score bounds enforced by the client before sealing.
///
/// The ledger cannot compare sealed values, so these never run on-ledger.
pub const MIN_SCORE: u32 = 0;
pub const MAX_SCORE: u32 = 10;

/// Facility ids start here and grow by one per creation.
pub const FIRST_FACILITY_ID: u64 = 1;

/// Domain separator absorbed first into every input-binding sponge.
pub const INPUT_BINDING_DOMAIN: u64 = 0x494E_5055_545F_4249; // "INPUT_BI"

// Poseidon sponge configuration.
//
// Width-3 sponge (rate=2, capacity=1), parameters derived deterministically so every
// verifier instance with the same key produces the same bindings.
pub const POSEIDON_RATE: usize = 2;
pub const POSEIDON_CAPACITY: usize = 1;
pub const POSEIDON_FULL_ROUNDS: usize = 8;
pub const POSEIDON_PARTIAL_ROUNDS: usize = 57;

/// Poseidon S-box exponent (alpha).
pub const POSEIDON_ALPHA: u64 = 5;

/// Deterministically derive Poseidon parameters for BN254::Fr.
pub fn poseidon_config() -> PoseidonConfig<Fr> {
    let prime_bits = Fr::MODULUS_BIT_SIZE as u64;

    let (ark, mds) = find_poseidon_ark_and_mds::<Fr>(
        prime_bits,
        POSEIDON_RATE,
        POSEIDON_FULL_ROUNDS as u64,
        POSEIDON_PARTIAL_ROUNDS as u64,
        0,
    );

    PoseidonConfig::new(
        POSEIDON_FULL_ROUNDS,
        POSEIDON_PARTIAL_ROUNDS,
        POSEIDON_ALPHA,
        mds,
        ark,
        POSEIDON_RATE,
        POSEIDON_CAPACITY,
    )
}
