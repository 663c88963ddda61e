//! Poseidon commitment to a single secret field element.
//!
//! The same sponge is evaluated natively (when a record is built) and as an R1CS gadget (when the
//! circuit checks the binding). Both sides absorb exactly one element and squeeze exactly one,
//! with parameters taken from [`poseidon_config`].

use crate::constants::poseidon_config;
use ark_bn254::Fr;
use ark_crypto_primitives::sponge::constraints::CryptographicSpongeVar;
use ark_crypto_primitives::sponge::poseidon::constraints::PoseidonSpongeVar;
use ark_crypto_primitives::sponge::poseidon::PoseidonSponge;
use ark_crypto_primitives::sponge::CryptographicSponge;
use ark_r1cs_std::fields::fp::FpVar;
use ark_relations::r1cs::{ConstraintSystemRef, SynthesisError};

/// Commitment to an integer secret.
pub fn commitment_hash(secret: u64) -> Fr {
    commitment_hash_fr(&Fr::from(secret))
}

pub fn commitment_hash_fr(secret: &Fr) -> Fr {
    let mut sponge = PoseidonSponge::<Fr>::new(poseidon_config());
    sponge.absorb(secret);
    let out: Vec<Fr> = sponge.squeeze_field_elements(1);
    out[0]
}

/// In-circuit counterpart of [`commitment_hash_fr`].
pub fn commitment_hash_var(
    cs: ConstraintSystemRef<Fr>,
    secret: &FpVar<Fr>,
) -> Result<FpVar<Fr>, SynthesisError> {
    let mut sponge = PoseidonSpongeVar::<Fr>::new(cs, poseidon_config());
    sponge.absorb(secret)?;
    let mut out = sponge.squeeze_field_elements(1)?;
    out.pop().ok_or(SynthesisError::Unsatisfiable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_r1cs_std::prelude::*;
    use ark_relations::r1cs::ConstraintSystem;

    #[test]
    fn native_and_gadget_digests_agree() {
        for secret in [0u64, 1, 2, 77, 1_000_003, u64::MAX] {
            let cs = ConstraintSystem::<Fr>::new_ref();
            let var = FpVar::<Fr>::new_witness(cs.clone(), || Ok(Fr::from(secret))).unwrap();
            let digest = commitment_hash_var(cs.clone(), &var).unwrap();

            assert_eq!(digest.value().unwrap(), commitment_hash(secret), "secret {secret}");
            assert!(cs.is_satisfied().unwrap());
        }
    }

    #[test]
    fn distinct_secrets_commit_differently() {
        assert_ne!(commitment_hash(41), commitment_hash(42));
        assert_eq!(commitment_hash(42), commitment_hash_fr(&Fr::from(42u64)));
    }
}
