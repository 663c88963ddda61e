//! R1CS circuit for proving a traveler's vaccination compliance.
//!
//! What this circuit proves (for one record):
//! 1) A measles record is backed by a vaccinated secret.
//! 2) A yellow-fever record on a route touching the risk country is backed by a vaccinated secret.
//! 3) The traveler is at most 100 years old.
//! 4) The vaccine type is one of the declared ordinals.
//! 5) A vaccinated record with a tracked expiration has not expired at `current_time`.
//! 6) The public `medical_record_hash` equals Poseidon(medical_record_number).
//!
//! Privacy: lot number, date of birth, medical record number, vaccination secret and expiration
//! are witnesses (never public).
//!
//! Every conditional rule is written as boolean arithmetic over validated 0/1 values. The
//! constraint topology never depends on the witness, so a single setup serves every record.

use crate::constants::{
    AGE_BITS, DISEASE_REQUIRING_VACCINATION, MAX_AGE, NO_EXPIRATION, RISK_COUNTRY,
    ROUTE_RISK_DISEASE, TIMESTAMP_BITS, VACCINATED, VACCINE_TYPE_BITS,
};
use crate::gadgets::{is_less_or_equal, is_less_than};
use crate::hasher::commitment_hash_var;
use crate::types::{VaccinationRecord, VaccineType};
use ark_bn254::Fr;
use ark_r1cs_std::fields::fp::FpVar;
use ark_r1cs_std::prelude::*;
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};

fn constant(v: u64) -> FpVar<Fr> {
    FpVar::<Fr>::constant(Fr::from(v))
}

/// Circuit proving that one vaccination record satisfies the compliance policy at
/// `current_time`.
#[derive(Clone, Debug)]
pub struct VaccinationCircuit {
    /// Full witness; only the fields marked public in [`VaccinationRecord`] are disclosed.
    pub record: VaccinationRecord,

    /// Public evaluation time for the expiration rule (unix seconds).
    pub current_time: u64,
}

impl VaccinationCircuit {
    pub fn new(record: VaccinationRecord, current_time: u64) -> Self {
        Self { record, current_time }
    }
}

/// Allocated circuit variables for one record.
struct RecordVars {
    age: FpVar<Fr>,
    vaccine_type: FpVar<Fr>,
    country_from: FpVar<Fr>,
    country_to: FpVar<Fr>,
    medical_record_hash: FpVar<Fr>,
    current_time: FpVar<Fr>,
    medical_record_number: FpVar<Fr>,
    vaccinated_secret: FpVar<Fr>,
    vaccine_expiration: FpVar<Fr>,
}

impl RecordVars {
    fn allocate(
        cs: ConstraintSystemRef<Fr>,
        rec: &VaccinationRecord,
        current_time: u64,
    ) -> Result<Self, SynthesisError> {
        // IMPORTANT: Public input ordering MUST match `PublicAssignment::to_field_elements`.
        let age = FpVar::<Fr>::new_input(cs.clone(), || Ok(Fr::from(rec.age)))?;
        let vaccine_type = FpVar::<Fr>::new_input(cs.clone(), || Ok(Fr::from(rec.vaccine_type)))?;
        let country_from = FpVar::<Fr>::new_input(cs.clone(), || Ok(Fr::from(rec.country_from)))?;
        let country_to = FpVar::<Fr>::new_input(cs.clone(), || Ok(Fr::from(rec.country_to)))?;
        let medical_record_hash = FpVar::<Fr>::new_input(cs.clone(), || Ok(rec.medical_record_hash))?;
        let current_time = FpVar::<Fr>::new_input(cs.clone(), || Ok(Fr::from(current_time)))?;

        // Lot number and date of birth are carried in the witness but not constrained.
        let _lot_number = FpVar::<Fr>::new_witness(cs.clone(), || Ok(Fr::from(rec.lot_number)))?;
        let _date_of_birth = FpVar::<Fr>::new_witness(cs.clone(), || Ok(Fr::from(rec.date_of_birth)))?;
        let medical_record_number =
            FpVar::<Fr>::new_witness(cs.clone(), || Ok(Fr::from(rec.medical_record_number)))?;
        let vaccinated_secret =
            FpVar::<Fr>::new_witness(cs.clone(), || Ok(Fr::from(rec.vaccinated_secret)))?;
        let vaccine_expiration =
            FpVar::<Fr>::new_witness(cs.clone(), || Ok(Fr::from(rec.vaccine_expiration)))?;

        Ok(Self {
            age,
            vaccine_type,
            country_from,
            country_to,
            medical_record_hash,
            current_time,
            medical_record_number,
            vaccinated_secret,
            vaccine_expiration,
        })
    }
}

/// Rule 1: `vaccine_type == measles` implies `vaccinated`.
fn enforce_disease_requirement(
    vaccine_type: &FpVar<Fr>,
    vaccinated: &Boolean<Fr>,
) -> Result<(), SynthesisError> {
    let is_required = vaccine_type.is_eq(&constant(DISEASE_REQUIRING_VACCINATION.as_u64()))?;
    // is_required ? vaccinated : true
    let satisfied = is_required.select(vaccinated, &Boolean::constant(true))?;
    satisfied.enforce_equal(&Boolean::constant(true))
}

/// Rule 2: a yellow-fever record on a route touching the risk country must be vaccinated.
fn enforce_route_risk(
    vaccine_type: &FpVar<Fr>,
    country_from: &FpVar<Fr>,
    country_to: &FpVar<Fr>,
    vaccinated: &Boolean<Fr>,
) -> Result<(), SynthesisError> {
    let risk_country = constant(RISK_COUNTRY.as_u64());
    let from_risk = country_from.is_eq(&risk_country)?;
    let to_risk = country_to.is_eq(&risk_country)?;
    let is_risk_disease = vaccine_type.is_eq(&constant(ROUTE_RISK_DISEASE.as_u64()))?;

    let active = &(&from_risk | &to_risk) & &is_risk_disease;
    // active ? !vaccinated : false
    let risk = active.select(&!vaccinated, &Boolean::constant(false))?;
    risk.enforce_equal(&Boolean::constant(false))
}

/// Rule 3: `age <= MAX_AGE`.
fn enforce_age_bound(age: &FpVar<Fr>) -> Result<(), SynthesisError> {
    is_less_or_equal(age, &constant(MAX_AGE), AGE_BITS)?.enforce_equal(&Boolean::constant(true))
}

/// Rule 4: `vaccine_type` is a declared ordinal.
fn enforce_vaccine_domain(vaccine_type: &FpVar<Fr>) -> Result<(), SynthesisError> {
    is_less_than(vaccine_type, &constant(VaccineType::COUNT), VACCINE_TYPE_BITS)?
        .enforce_equal(&Boolean::constant(true))
}

/// Rule 5: a vaccinated record with a tracked expiration must not be expired.
fn enforce_not_expired(
    expiration: &FpVar<Fr>,
    current_time: &FpVar<Fr>,
    vaccinated: &Boolean<Fr>,
) -> Result<(), SynthesisError> {
    let tracked = !&expiration.is_eq(&constant(NO_EXPIRATION))?;
    let lapsed = is_less_than(expiration, current_time, TIMESTAMP_BITS)?;

    let expired = &(&tracked & &lapsed) & vaccinated;
    expired.enforce_equal(&Boolean::constant(false))
}

/// Rule 6: the public commitment opens to the private medical record number.
fn enforce_commitment(
    cs: ConstraintSystemRef<Fr>,
    medical_record_number: &FpVar<Fr>,
    medical_record_hash: &FpVar<Fr>,
) -> Result<(), SynthesisError> {
    let digest = commitment_hash_var(cs, medical_record_number)?;
    digest.enforce_equal(medical_record_hash)
}

impl ConstraintSynthesizer<Fr> for VaccinationCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        let vars = RecordVars::allocate(cs.clone(), &self.record, self.current_time)?;

        // Validated 0/1 flag shared by rules 1, 2 and 5.
        let vaccinated = vars.vaccinated_secret.is_eq(&constant(VACCINATED))?;

        enforce_disease_requirement(&vars.vaccine_type, &vaccinated)?;
        enforce_route_risk(&vars.vaccine_type, &vars.country_from, &vars.country_to, &vaccinated)?;
        enforce_age_bound(&vars.age)?;
        enforce_vaccine_domain(&vars.vaccine_type)?;
        enforce_not_expired(&vars.vaccine_expiration, &vars.current_time, &vaccinated)?;
        enforce_commitment(cs, &vars.medical_record_number, &vars.medical_record_hash)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::NOT_VACCINATED;
    use crate::types::Country;
    use ark_relations::r1cs::ConstraintSystem;

    const NOW: u64 = 1_760_000_000;
    const ONE_YEAR: u64 = 365 * 24 * 3600;

    fn compliant() -> VaccinationRecord {
        VaccinationRecord {
            age: 30,
            vaccine_type: VaccineType::Measles.as_u64(),
            country_from: Country::Germany.as_u64(),
            country_to: Country::Japan.as_u64(),
            medical_record_hash: Fr::from(0u64),
            lot_number: 4411,
            date_of_birth: 19_950_412,
            medical_record_number: 9_001_002,
            vaccinated_secret: VACCINATED,
            vaccine_expiration: NOW + ONE_YEAR,
        }
        .with_bound_commitment()
    }

    fn satisfied(record: VaccinationRecord) -> bool {
        let cs = ConstraintSystem::<Fr>::new_ref();
        VaccinationCircuit::new(record, NOW)
            .generate_constraints(cs.clone())
            .unwrap();
        cs.is_satisfied().unwrap()
    }

    #[test]
    fn compliant_record_satisfies() {
        assert!(satisfied(compliant()));
    }

    #[test]
    fn age_boundary_is_inclusive() {
        assert!(satisfied(VaccinationRecord { age: 100, ..compliant() }));
        assert!(!satisfied(VaccinationRecord { age: 101, ..compliant() }));
    }

    #[test]
    fn vaccine_type_outside_domain_fails() {
        let last = VaccineType::COUNT - 1;
        assert!(satisfied(VaccinationRecord { vaccine_type: last, ..compliant() }));
        assert!(!satisfied(VaccinationRecord { vaccine_type: VaccineType::COUNT, ..compliant() }));
    }

    #[test]
    fn measles_requires_vaccinated_secret() {
        let unvaccinated = VaccinationRecord {
            vaccinated_secret: NOT_VACCINATED,
            vaccine_expiration: NO_EXPIRATION,
            ..compliant()
        };
        assert!(!satisfied(unvaccinated.clone()));

        // Other vaccine types do not carry the requirement.
        let influenza = VaccinationRecord {
            vaccine_type: VaccineType::Influenza.as_u64(),
            ..unvaccinated
        };
        assert!(satisfied(influenza));
    }

    #[test]
    fn route_risk_requires_yellow_fever_vaccination() {
        let base = VaccinationRecord {
            vaccine_type: VaccineType::YellowFever.as_u64(),
            vaccinated_secret: NOT_VACCINATED,
            vaccine_expiration: NO_EXPIRATION,
            ..compliant()
        };

        // No risk country on the route: vacuous.
        assert!(satisfied(base.clone()));

        let outbound = VaccinationRecord { country_from: RISK_COUNTRY.as_u64(), ..base.clone() };
        let inbound = VaccinationRecord { country_to: RISK_COUNTRY.as_u64(), ..base.clone() };
        assert!(!satisfied(outbound.clone()));
        assert!(!satisfied(inbound));

        // Vaccinated travelers pass the same route.
        assert!(satisfied(VaccinationRecord { vaccinated_secret: VACCINATED, ..outbound.clone() }));

        // Risk route with a different disease is vacuous.
        assert!(satisfied(VaccinationRecord {
            vaccine_type: VaccineType::Malaria.as_u64(),
            ..outbound
        }));
    }

    #[test]
    fn expiration_rule() {
        // Past expiration while vaccinated.
        assert!(!satisfied(VaccinationRecord { vaccine_expiration: 1000, ..compliant() }));
        // Sentinel is compliant even when vaccinated.
        assert!(satisfied(VaccinationRecord { vaccine_expiration: NO_EXPIRATION, ..compliant() }));
        // Expiring exactly now is not "before now".
        assert!(satisfied(VaccinationRecord { vaccine_expiration: NOW, ..compliant() }));
        assert!(!satisfied(VaccinationRecord { vaccine_expiration: NOW - 1, ..compliant() }));
        // A stale expiration on an unvaccinated, non-measles record is ignored.
        assert!(satisfied(VaccinationRecord {
            vaccine_type: VaccineType::HepatitisB.as_u64(),
            vaccinated_secret: NOT_VACCINATED,
            vaccine_expiration: 1000,
            ..compliant()
        }));
    }

    #[test]
    fn commitment_mismatch_fails() {
        let mut record = compliant();
        record.medical_record_hash += Fr::from(1u64);
        assert!(!satisfied(record));
    }

    #[test]
    fn topology_is_witness_independent() {
        let count = |record: VaccinationRecord| {
            let cs = ConstraintSystem::<Fr>::new_ref();
            VaccinationCircuit::new(record, NOW)
                .generate_constraints(cs.clone())
                .unwrap();
            (cs.num_constraints(), cs.num_instance_variables(), cs.num_witness_variables())
        };

        let good = count(compliant());
        let bad = count(VaccinationRecord { age: 250, vaccinated_secret: 7, ..compliant() });
        assert_eq!(good, bad);
    }
}
