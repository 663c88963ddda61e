//! Crate-wide constants used by the compliance circuit and host-side orchestration.

use crate::types::{Country, VaccineType};
use ark_bn254::Fr;
use ark_crypto_primitives::sponge::poseidon::{find_poseidon_ark_and_mds, PoseidonConfig};
use ark_ff::PrimeField;
use std::sync::LazyLock;

/// Revision of the compliance rule set.
///
/// Proving and verifying keys are bound to one revision. Any change to the rules or to the
/// public input layout must bump this and rerun the setup ceremony.
pub const CIRCUIT_VERSION: u32 = 1;

/// Inclusive upper bound on a traveler's age.
pub const MAX_AGE: u64 = 100;

/// Value of `vaccinated_secret` for a vaccinated traveler.
pub const VACCINATED: u64 = 1;

/// Value of `vaccinated_secret` for a traveler who never got the shot.
pub const NOT_VACCINATED: u64 = 0;

/// Expiration sentinel: never vaccinated, or no expiration tracked.
pub const NO_EXPIRATION: u64 = 0;

/// Disease whose vaccine must always be backed by a vaccinated secret.
pub const DISEASE_REQUIRING_VACCINATION: VaccineType = VaccineType::Measles;

/// Disease whose vaccine is mandatory when the route touches [`RISK_COUNTRY`].
pub const ROUTE_RISK_DISEASE: VaccineType = VaccineType::YellowFever;

/// Country that activates the route-risk rule, as origin or as destination.
pub const RISK_COUNTRY: Country = Country::Brazil;

// Bit widths used by the ordering gadget. Operands are range checked to these widths.
pub const AGE_BITS: usize = 8;
pub const VACCINE_TYPE_BITS: usize = 8;
pub const TIMESTAMP_BITS: usize = 64;

/// Number of public inputs, in allocation order:
/// age, vaccine type, origin, destination, medical record hash, current time.
pub const NUM_PUBLIC_INPUTS: usize = 6;

// Poseidon sponge configuration.
//
// Width-3 sponge (rate=2, capacity=1). The commitment only ever absorbs one element, but the
// width matches the common instantiation and keeps the parameters reusable.
pub const POSEIDON_RATE: usize = 2;
pub const POSEIDON_CAPACITY: usize = 1;

pub const POSEIDON_FULL_ROUNDS: usize = 8;
pub const POSEIDON_PARTIAL_ROUNDS: usize = 57;

/// Poseidon S-box exponent (alpha).
pub const POSEIDON_ALPHA: u64 = 5;

static POSEIDON_CONFIG: LazyLock<PoseidonConfig<Fr>> = LazyLock::new(derive_poseidon_config);

/// Poseidon parameters for BN254::Fr, derived once per process.
///
/// The native hasher and the in-circuit gadget both read this value, so they cannot drift apart.
pub fn poseidon_config() -> &'static PoseidonConfig<Fr> {
    &POSEIDON_CONFIG
}

fn derive_poseidon_config() -> PoseidonConfig<Fr> {
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
