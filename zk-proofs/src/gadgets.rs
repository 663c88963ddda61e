//! Small R1CS gadgets used by the compliance rules.
//!
//! Every gadget produces a [`Boolean`] that is constrained to 0/1, so callers can feed the
//! result straight into `select` or logical combinators without re-validating it.

use ark_bn254::Fr;
use ark_ff::{BigInteger, Field, PrimeField};
use ark_r1cs_std::prelude::*;
use ark_r1cs_std::fields::fp::FpVar;
use ark_relations::r1cs::SynthesisError;

/// Convert little-endian boolean bits into an FpVar.
fn bits_le_to_fp(bits_le: &[Boolean<Fr>]) -> Result<FpVar<Fr>, SynthesisError> {
    let mut acc = FpVar::<Fr>::constant(Fr::from(0u64));
    let mut coeff = FpVar::<Fr>::constant(Fr::from(1u64));

    for b in bits_le {
        // b ? coeff : 0
        let term = b.select(&coeff, &FpVar::<Fr>::constant(Fr::from(0u64)))?;
        acc += term;
        coeff += coeff.clone();
    }

    Ok(acc)
}

/// Enforce that `v` fits in `n` bits and return its `n` little-endian bits.
///
/// The bits are fresh witnesses recomposed against `v`, so a value of `2^n` or more leaves the
/// system unsatisfiable. `n` must stay well below the field size for the decomposition to be
/// unique.
pub fn constrain_bits(v: &FpVar<Fr>, n: usize) -> Result<Vec<Boolean<Fr>>, SynthesisError> {
    debug_assert!(n < Fr::MODULUS_BIT_SIZE as usize - 1);

    let cs = v.cs();
    let value = v.value().ok().map(|x| x.into_bigint());

    let mut bits = Vec::with_capacity(n);
    for i in 0..n {
        bits.push(Boolean::new_witness(cs.clone(), || {
            value
                .map(|big| big.get_bit(i))
                .ok_or(SynthesisError::AssignmentMissing)
        })?);
    }

    let reconstructed = bits_le_to_fp(&bits)?;
    reconstructed.enforce_equal(v)?;
    Ok(bits)
}

/// Range check an operand of the ordering gadget. Constants are chosen by the circuit author and
/// need no constraints.
fn range_check(v: &FpVar<Fr>, n: usize) -> Result<(), SynthesisError> {
    if !v.is_constant() {
        constrain_bits(v, n)?;
    }
    Ok(())
}

/// Boolean gadget: `a < b`, where both operands are `n`-bit unsigned values.
///
/// `a + 2^n - b` lies in `[1, 2^(n+1))`; its bit `n` is set exactly when `a >= b`.
/// Operands that do not fit in `n` bits make the system unsatisfiable.
pub fn is_less_than(a: &FpVar<Fr>, b: &FpVar<Fr>, n: usize) -> Result<Boolean<Fr>, SynthesisError> {
    range_check(a, n)?;
    range_check(b, n)?;

    let offset = FpVar::<Fr>::constant(Fr::from(2u64).pow([n as u64]));
    let shifted = a + &offset - b;
    let bits = constrain_bits(&shifted, n + 1)?;

    Ok(!&bits[n])
}

/// Boolean gadget: `a <= b`, where both operands are `n`-bit unsigned values.
pub fn is_less_or_equal(
    a: &FpVar<Fr>,
    b: &FpVar<Fr>,
    n: usize,
) -> Result<Boolean<Fr>, SynthesisError> {
    Ok(!&is_less_than(b, a, n)?)
}
