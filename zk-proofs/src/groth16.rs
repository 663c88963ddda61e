//! Groth16 prover/verifier orchestration for the compliance circuit.
//!
//! SECURITY NOTE (prototype): Groth16 requires a trusted setup that produces a proving key (PK)
//! and verifying key (VK). This prototype generates keys locally. In production, an MPC ceremony
//! (or a transparent system) should be used.

use crate::circuit::VaccinationCircuit;
use crate::constants::{MAX_AGE, NO_EXPIRATION, VACCINATED};
use crate::types::{Country, PublicAssignment, VaccinationRecord, VaccineType};
use ark_bn254::{Bn254, Fr};
use ark_groth16::{Groth16, PreparedVerifyingKey, Proof, ProvingKey, VerifyingKey};
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystem, SynthesisMode};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use rand::RngCore;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ZkError {
    #[error("witness does not satisfy the compliance circuit (first failing constraint: {0})")]
    Unsatisfiable(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("proof verification failed")]
    VerificationFailed,

    #[error("arkworks error: {0}")]
    Ark(String),

    #[error("malformed envelope: {0}")]
    Envelope(String),
}

/// Size of the compiled constraint system.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CircuitShape {
    pub num_constraints: usize,
    pub num_instance_variables: usize,
    pub num_witness_variables: usize,
}

/// Canonical compliant record used wherever the circuit needs a placeholder witness.
fn reference_record() -> VaccinationRecord {
    VaccinationRecord {
        age: MAX_AGE,
        vaccine_type: VaccineType::Measles.as_u64(),
        country_from: Country::Canada.as_u64(),
        country_to: Country::Germany.as_u64(),
        medical_record_hash: Fr::from(0u64),
        lot_number: 0,
        date_of_birth: 19_700_101,
        medical_record_number: 0,
        vaccinated_secret: VACCINATED,
        vaccine_expiration: NO_EXPIRATION,
    }
    .with_bound_commitment()
}

/// Synthesize the circuit without a witness and report its shape.
pub fn compile_circuit() -> Result<CircuitShape, ZkError> {
    let cs = ConstraintSystem::<Fr>::new_ref();
    cs.set_mode(SynthesisMode::Setup);

    VaccinationCircuit::new(reference_record(), 0)
        .generate_constraints(cs.clone())
        .map_err(|e| ZkError::Ark(format!("{e}")))?;
    cs.finalize();

    Ok(CircuitShape {
        num_constraints: cs.num_constraints(),
        num_instance_variables: cs.num_instance_variables(),
        num_witness_variables: cs.num_witness_variables(),
    })
}

/// Generate a Groth16 keypair for the compliance circuit.
///
/// Must be run once per [`crate::constants::CIRCUIT_VERSION`].
pub fn setup_keys(rng: &mut impl RngCore) -> Result<(ProvingKey<Bn254>, VerifyingKey<Bn254>), ZkError> {
    let circuit = VaccinationCircuit::new(reference_record(), 0);

    let pk = Groth16::<Bn254>::generate_random_parameters_with_reduction(circuit, rng)
        .map_err(|e| ZkError::Ark(format!("{e}")))?;

    let vk = pk.vk.clone();
    Ok((pk, vk))
}

/// Evaluate the circuit on a concrete witness without proving.
///
/// Returns [`ZkError::Unsatisfiable`] naming the first failing constraint when the record is not
/// compliant at `current_time`.
pub fn check_witness(record: &VaccinationRecord, current_time: u64) -> Result<(), ZkError> {
    let cs = ConstraintSystem::<Fr>::new_ref();

    VaccinationCircuit::new(record.clone(), current_time)
        .generate_constraints(cs.clone())
        .map_err(|e| ZkError::Ark(format!("{e}")))?;

    if cs.is_satisfied().map_err(|e| ZkError::Ark(format!("{e}")))? {
        return Ok(());
    }

    let failing = cs
        .which_is_unsatisfied()
        .map_err(|e| ZkError::Ark(format!("{e}")))?
        .unwrap_or_else(|| "unknown".to_string());
    Err(ZkError::Unsatisfiable(failing))
}

/// Prove that `record` is compliant at `current_time`.
///
/// The witness is checked before proving, so non-compliant records fail with
/// [`ZkError::Unsatisfiable`] instead of reaching the Groth16 prover.
pub fn prove_record(
    rng: &mut impl RngCore,
    pk: &ProvingKey<Bn254>,
    record: VaccinationRecord,
    current_time: u64,
) -> Result<(Proof<Bn254>, PublicAssignment), ZkError> {
    check_witness(&record, current_time)?;

    let public = record.public_assignment(current_time);
    let circuit = VaccinationCircuit::new(record, current_time);

    let proof = Groth16::<Bn254>::create_random_proof_with_reduction(circuit, pk, rng)
        .map_err(|e| ZkError::Ark(format!("{e}")))?;

    Ok((proof, public))
}

/// Precompute the pairing-friendly form of a verifying key.
pub fn prepare_vk(vk: &VerifyingKey<Bn254>) -> PreparedVerifyingKey<Bn254> {
    PreparedVerifyingKey::from(vk.clone())
}

/// Verify opaque proof bytes against a public assignment.
///
/// Bytes that do not decode to a proof are reported the same way as a proof that fails the
/// pairing check: [`ZkError::VerificationFailed`].
pub fn verify_record_proof(
    pvk: &PreparedVerifyingKey<Bn254>,
    proof_bytes: &[u8],
    public: &PublicAssignment,
) -> Result<(), ZkError> {
    let proof = match deserialize_proof(proof_bytes) {
        Ok(p) => p,
        Err(e) => {
            tracing::debug!(error = %e, "proof bytes rejected");
            return Err(ZkError::VerificationFailed);
        }
    };

    let public_inputs = public.to_field_elements();
    let ok = Groth16::<Bn254>::verify_proof(pvk, &proof, &public_inputs)
        .map_err(|e| ZkError::Ark(format!("{e}")))?;
    if !ok {
        return Err(ZkError::VerificationFailed);
    }
    Ok(())
}

/// Serialize a proving key to bytes.
pub fn serialize_pk(pk: &ProvingKey<Bn254>) -> Result<Vec<u8>, ZkError> {
    let mut out = Vec::new();
    pk.serialize_compressed(&mut out)
        .map_err(|e| ZkError::Serialization(format!("{e}")))?;
    Ok(out)
}

pub fn deserialize_pk(bytes: &[u8]) -> Result<ProvingKey<Bn254>, ZkError> {
    ProvingKey::<Bn254>::deserialize_compressed(bytes)
        .map_err(|e| ZkError::Serialization(format!("{e}")))
}

pub fn serialize_vk(vk: &VerifyingKey<Bn254>) -> Result<Vec<u8>, ZkError> {
    let mut out = Vec::new();
    vk.serialize_compressed(&mut out)
        .map_err(|e| ZkError::Serialization(format!("{e}")))?;
    Ok(out)
}

pub fn deserialize_vk(bytes: &[u8]) -> Result<VerifyingKey<Bn254>, ZkError> {
    VerifyingKey::<Bn254>::deserialize_compressed(bytes)
        .map_err(|e| ZkError::Serialization(format!("{e}")))
}

pub fn serialize_proof(proof: &Proof<Bn254>) -> Result<Vec<u8>, ZkError> {
    let mut out = Vec::new();
    proof
        .serialize_compressed(&mut out)
        .map_err(|e| ZkError::Serialization(format!("{e}")))?;
    Ok(out)
}

pub fn deserialize_proof(bytes: &[u8]) -> Result<Proof<Bn254>, ZkError> {
    Proof::<Bn254>::deserialize_compressed(bytes)
        .map_err(|e| ZkError::Serialization(format!("{e}")))
}
