//! Synthetic vaccination records for exercising the compliance circuit.
//!
//! Records are artificial but shaped like real ones, and biased so that most of them are
//! compliant: five in six travelers are vaccinated, and expirations straddle "now".
//! The circuit stays the only judge of compliance; the warnings logged here are diagnostics.

use chrono::{DateTime, Datelike, Days, Duration, NaiveDate, Utc};
use rand::Rng;
use thiserror::Error;
use tracing::warn;
use vacc_zk::constants::{
    DISEASE_REQUIRING_VACCINATION, NOT_VACCINATED, NO_EXPIRATION, RISK_COUNTRY, ROUTE_RISK_DISEASE,
    VACCINATED,
};
use vacc_zk::types::{Country, VaccinationRecord, VaccineType};

/// Oldest generated traveler, in years. Slightly above the circuit's bound on purpose.
const MAX_GENERATED_AGE: u64 = 105;

/// Birth dates are drawn uniformly from this many days before "today".
const MAX_GENERATED_AGE_DAYS: u64 = MAX_GENERATED_AGE * 365 + MAX_GENERATED_AGE / 4;

/// Validity of one vaccine dose before scaling.
const BASE_VALIDITY_DAYS: i64 = 365;

/// Vaccinated share of generated travelers, as `numerator / denominator`.
const VACCINATED_RATIO: (u32, u32) = (5, 6);

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("invalid date of birth '{input}': {source}")]
    DateParse {
        input: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("failed to build {part}: {reason}")]
    SubRecord { part: &'static str, reason: String },
}

/// Identity half of a record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatientProfile {
    pub age: u64,
    pub date_of_birth: u64,
    pub medical_record_number: u64,
}

/// Travel and dose half of a record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Inoculation {
    pub vaccine_type: VaccineType,
    pub country_from: Country,
    pub country_to: Country,
    pub lot_number: u64,
    pub vaccinated_secret: u64,
    pub vaccine_expiration: u64,
}

/// Policy rules the generator can spot on the host side.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Violation {
    DiseaseRequirement,
    RouteRisk,
    Expired,
}

/// Generate one record evaluated against `now`.
pub fn generate_record(
    rng: &mut impl Rng,
    now: DateTime<Utc>,
) -> Result<VaccinationRecord, GeneratorError> {
    let profile = patient_profile(rng, now.date_naive())?;
    let dose = inoculation(rng, now.timestamp())?;

    let record = VaccinationRecord {
        age: profile.age,
        vaccine_type: dose.vaccine_type.as_u64(),
        country_from: dose.country_from.as_u64(),
        country_to: dose.country_to.as_u64(),
        medical_record_hash: Default::default(),
        lot_number: dose.lot_number,
        date_of_birth: profile.date_of_birth,
        medical_record_number: profile.medical_record_number,
        vaccinated_secret: dose.vaccinated_secret,
        vaccine_expiration: dose.vaccine_expiration,
    }
    .with_bound_commitment();

    let now_secs = u64::try_from(now.timestamp()).unwrap_or(0);
    for violation in violations(&record, now_secs) {
        match violation {
            Violation::DiseaseRequirement => warn!(
                vaccine = %dose.vaccine_type,
                "generated record lacks a required vaccination"
            ),
            Violation::RouteRisk => warn!(
                from = dose.country_from.code(),
                to = dose.country_to.code(),
                "generated record travels a risk route unvaccinated"
            ),
            Violation::Expired => warn!(
                expiration = record.vaccine_expiration,
                "generated record carries an expired vaccination"
            ),
        }
    }

    Ok(record)
}

/// Parse a `YYYY-MM-DD` date of birth.
pub fn parse_date_of_birth(input: &str) -> Result<NaiveDate, GeneratorError> {
    NaiveDate::parse_from_str(input, "%Y-%m-%d").map_err(|source| GeneratorError::DateParse {
        input: input.to_string(),
        source,
    })
}

/// Whole years between `dob` and `today`, or `None` if `dob` is in the future.
pub fn age_on(dob: NaiveDate, today: NaiveDate) -> Option<u64> {
    let mut years = today.year() - dob.year();
    if (today.month(), today.day()) < (dob.month(), dob.day()) {
        years -= 1;
    }
    u64::try_from(years).ok()
}

/// Host-side check of the conditional rules, used for diagnostics only.
pub fn violations(record: &VaccinationRecord, now: u64) -> Vec<Violation> {
    let mut out = Vec::new();
    let vaccine = record.vaccine_type;

    if vaccine == DISEASE_REQUIRING_VACCINATION.as_u64() && !record.is_vaccinated() {
        out.push(Violation::DiseaseRequirement);
    }

    let risk = RISK_COUNTRY.as_u64();
    let risk_route = record.country_from == risk || record.country_to == risk;
    if risk_route && vaccine == ROUTE_RISK_DISEASE.as_u64() && !record.is_vaccinated() {
        out.push(Violation::RouteRisk);
    }

    if record.has_expiration() && record.vaccine_expiration < now && record.is_vaccinated() {
        out.push(Violation::Expired);
    }

    out
}

fn patient_profile(rng: &mut impl Rng, today: NaiveDate) -> Result<PatientProfile, GeneratorError> {
    let days_back = rng.gen_range(0..=MAX_GENERATED_AGE_DAYS);
    let drawn = today.checked_sub_days(Days::new(days_back)).ok_or_else(|| GeneratorError::SubRecord {
        part: "patient profile",
        reason: format!("{days_back} days before {today} is out of range"),
    })?;

    // Rendered and re-parsed so generated dates go through the same path as real input.
    let dob = parse_date_of_birth(&drawn.format("%Y-%m-%d").to_string())?;
    let age = age_on(dob, today).ok_or_else(|| GeneratorError::SubRecord {
        part: "patient profile",
        reason: format!("date of birth {dob} is after {today}"),
    })?;

    let date_of_birth = u64::try_from(dob.year() * 10_000)
        .map(|y| y + u64::from(dob.month()) * 100 + u64::from(dob.day()))
        .map_err(|_| GeneratorError::SubRecord {
            part: "patient profile",
            reason: format!("date of birth {dob} predates year 0"),
        })?;

    Ok(PatientProfile {
        age,
        date_of_birth,
        medical_record_number: rng.r#gen(),
    })
}

fn inoculation(rng: &mut impl Rng, now_secs: i64) -> Result<Inoculation, GeneratorError> {
    let vaccine_type = VaccineType::ALL[rng.gen_range(0..VaccineType::ALL.len())];

    let n = Country::ALL.len();
    let from = rng.gen_range(0..n);
    let to = (from + rng.gen_range(1..n)) % n;

    let vaccinated = rng.gen_ratio(VACCINATED_RATIO.0, VACCINATED_RATIO.1);

    let vaccine_expiration = if vaccinated {
        let issued = now_secs - Duration::days(rng.gen_range(0..=3 * 365)).num_seconds();
        let validity = Duration::days(BASE_VALIDITY_DAYS * rng.gen_range(1..=3));
        u64::try_from(issued + validity.num_seconds()).map_err(|_| GeneratorError::SubRecord {
            part: "inoculation",
            reason: format!("expiration before the epoch (now = {now_secs})"),
        })?
    } else {
        NO_EXPIRATION
    };

    Ok(Inoculation {
        vaccine_type,
        country_from: Country::ALL[from],
        country_to: Country::ALL[to],
        lot_number: rng.gen_range(100_000..1_000_000),
        vaccinated_secret: if vaccinated { VACCINATED } else { NOT_VACCINATED },
        vaccine_expiration,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;
    use vacc_zk::constants::MAX_AGE;
    use vacc_zk::groth16::check_witness;
    use vacc_zk::hasher::commitment_hash;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn records_are_well_formed() {
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        for _ in 0..500 {
            let r = generate_record(&mut rng, now()).unwrap();
            assert_ne!(r.country_from, r.country_to);
            assert!(VaccineType::from_u64(r.vaccine_type).is_some());
            assert_eq!(r.medical_record_hash, commitment_hash(r.medical_record_number));
            assert!(r.age <= MAX_GENERATED_AGE);
            if !r.is_vaccinated() {
                assert_eq!(r.vaccine_expiration, NO_EXPIRATION);
            } else {
                assert!(r.has_expiration());
            }
        }
    }

    #[test]
    fn vaccination_is_biased_toward_compliance() {
        let mut rng = ChaCha20Rng::seed_from_u64(12);
        let total = 6000;
        let vaccinated = (0..total)
            .filter(|_| generate_record(&mut rng, now()).unwrap().is_vaccinated())
            .count();
        let share = vaccinated as f64 / total as f64;
        assert!((0.79..0.87).contains(&share), "vaccinated share {share}");
    }

    #[test]
    fn host_diagnostics_agree_with_circuit() {
        let mut rng = ChaCha20Rng::seed_from_u64(13);
        let now_secs = now().timestamp() as u64;
        for _ in 0..60 {
            let r = generate_record(&mut rng, now()).unwrap();
            let expected = violations(&r, now_secs).is_empty() && r.age <= MAX_AGE;
            assert_eq!(check_witness(&r, now_secs).is_ok(), expected, "{r:?}");
        }
    }

    #[test]
    fn bad_dates_fail_loudly() {
        assert!(matches!(
            parse_date_of_birth("1990-02-30"),
            Err(GeneratorError::DateParse { .. })
        ));
        assert!(matches!(
            parse_date_of_birth("yesterday"),
            Err(GeneratorError::DateParse { .. })
        ));
        assert!(parse_date_of_birth("1990-02-28").is_ok());
    }

    #[test]
    fn age_counts_completed_years() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 15).unwrap();
        let dob = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap();
        assert_eq!(age_on(dob(1995, 6, 15), today), Some(30));
        assert_eq!(age_on(dob(1995, 6, 16), today), Some(29));
        assert_eq!(age_on(dob(2025, 1, 1), today), Some(0));
        assert_eq!(age_on(dob(2025, 7, 1), today), None);
    }

    #[test]
    fn birth_dates_never_land_in_the_future() {
        // January 1st is the worst case for a year-first draw.
        let today = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(14);
        for _ in 0..5000 {
            let profile = patient_profile(&mut rng, today).unwrap();
            assert!(profile.age <= MAX_GENERATED_AGE);
            assert!(profile.date_of_birth <= 20_250_101);
        }
    }

    #[test]
    fn unvaccinated_dose_has_no_expiration() {
        let mut rng = ChaCha20Rng::seed_from_u64(15);
        let doses: Vec<_> = (0..300)
            .map(|_| inoculation(&mut rng, now().timestamp()).unwrap())
            .collect();
        assert!(doses.iter().any(|d| d.vaccinated_secret == NOT_VACCINATED));
        for d in doses.iter().filter(|d| d.vaccinated_secret == NOT_VACCINATED) {
            assert_eq!(d.vaccine_expiration, NO_EXPIRATION);
        }
    }
}
