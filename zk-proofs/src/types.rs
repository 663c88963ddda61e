//! Types shared between the circuit and the host-side prover/verifier.

use crate::constants::{NO_EXPIRATION, NUM_PUBLIC_INPUTS, VACCINATED};
use crate::groth16::ZkError;
use crate::hasher::commitment_hash;
use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize, SerializationError};
use std::fmt;

/// Vaccines known to the circuit. The discriminant is the value carried in the witness.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u64)]
pub enum VaccineType {
    Measles = 0,
    YellowFever = 1,
    Malaria = 2,
    HepatitisB = 3,
    Influenza = 4,
}

impl VaccineType {
    pub const ALL: [VaccineType; 5] = [
        VaccineType::Measles,
        VaccineType::YellowFever,
        VaccineType::Malaria,
        VaccineType::HepatitisB,
        VaccineType::Influenza,
    ];

    /// Size of the declared domain; valid ordinals are `[0, COUNT)`.
    pub const COUNT: u64 = Self::ALL.len() as u64;

    pub fn as_u64(self) -> u64 {
        self as u64
    }

    pub fn from_u64(v: u64) -> Option<Self> {
        Self::ALL.get(usize::try_from(v).ok()?).copied()
    }
}

impl fmt::Display for VaccineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VaccineType::Measles => "measles",
            VaccineType::YellowFever => "yellow fever",
            VaccineType::Malaria => "malaria",
            VaccineType::HepatitisB => "hepatitis b",
            VaccineType::Influenza => "influenza",
        };
        f.write_str(name)
    }
}

/// Countries a route can start or end in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u64)]
pub enum Country {
    UnitedStates = 0,
    Canada = 1,
    Brazil = 2,
    Kenya = 3,
    India = 4,
    Germany = 5,
    Japan = 6,
    Australia = 7,
}

impl Country {
    pub const ALL: [Country; 8] = [
        Country::UnitedStates,
        Country::Canada,
        Country::Brazil,
        Country::Kenya,
        Country::India,
        Country::Germany,
        Country::Japan,
        Country::Australia,
    ];

    pub fn as_u64(self) -> u64 {
        self as u64
    }

    pub fn from_u64(v: u64) -> Option<Self> {
        Self::ALL.get(usize::try_from(v).ok()?).copied()
    }

    /// ISO 3166-1 alpha-2 code, for logs.
    pub fn code(self) -> &'static str {
        match self {
            Country::UnitedStates => "US",
            Country::Canada => "CA",
            Country::Brazil => "BR",
            Country::Kenya => "KE",
            Country::India => "IN",
            Country::Germany => "DE",
            Country::Japan => "JP",
            Country::Australia => "AU",
        }
    }
}

/// One traveler's vaccination record: the full witness of the compliance circuit.
///
/// Values are kept raw (not as enums) so that out-of-domain records can be represented and
/// rejected by the circuit rather than by the type system.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VaccinationRecord {
    // --- public ---
    pub age: u64,
    pub vaccine_type: u64,
    pub country_from: u64,
    pub country_to: u64,
    /// Poseidon commitment to `medical_record_number`.
    pub medical_record_hash: Fr,

    // --- private ---
    pub lot_number: u64,
    /// Date of birth as the integer `YYYYMMDD`.
    pub date_of_birth: u64,
    pub medical_record_number: u64,
    /// [`VACCINATED`] or [`crate::constants::NOT_VACCINATED`].
    pub vaccinated_secret: u64,
    /// Unix seconds, or [`NO_EXPIRATION`].
    pub vaccine_expiration: u64,
}

impl VaccinationRecord {
    /// Recompute `medical_record_hash` from `medical_record_number`.
    pub fn with_bound_commitment(mut self) -> Self {
        self.medical_record_hash = commitment_hash(self.medical_record_number);
        self
    }

    pub fn is_vaccinated(&self) -> bool {
        self.vaccinated_secret == VACCINATED
    }

    pub fn has_expiration(&self) -> bool {
        self.vaccine_expiration != NO_EXPIRATION
    }

    /// The public half of this record, evaluated at `current_time`.
    pub fn public_assignment(&self, current_time: u64) -> PublicAssignment {
        PublicAssignment {
            age: self.age,
            vaccine_type: self.vaccine_type,
            country_from: self.country_from,
            country_to: self.country_to,
            medical_record_hash: self.medical_record_hash,
            current_time,
        }
    }
}

/// Public inputs for a compliance proof.
///
/// Ordering MUST match the circuit's public input allocation order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicAssignment {
    pub age: u64,
    pub vaccine_type: u64,
    pub country_from: u64,
    pub country_to: u64,
    pub medical_record_hash: Fr,
    /// Unix seconds at which the prover evaluated the expiration rule.
    pub current_time: u64,
}

impl PublicAssignment {
    pub fn to_field_elements(&self) -> Vec<Fr> {
        vec![
            Fr::from(self.age),
            Fr::from(self.vaccine_type),
            Fr::from(self.country_from),
            Fr::from(self.country_to),
            self.medical_record_hash,
            Fr::from(self.current_time),
        ]
    }

    pub fn from_field_elements(elems: &[Fr]) -> Result<Self, ZkError> {
        let [age, vaccine_type, country_from, country_to, hash, current_time] = elems else {
            return Err(ZkError::Envelope(format!(
                "expected {NUM_PUBLIC_INPUTS} public inputs, got {}",
                elems.len()
            )));
        };

        Ok(Self {
            age: fr_to_u64(age, "age")?,
            vaccine_type: fr_to_u64(vaccine_type, "vaccine_type")?,
            country_from: fr_to_u64(country_from, "country_from")?,
            country_to: fr_to_u64(country_to, "country_to")?,
            medical_record_hash: *hash,
            current_time: fr_to_u64(current_time, "current_time")?,
        })
    }

    /// Canonical compressed encoding of the public field-element vector.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ZkError> {
        let mut out = Vec::new();
        self.to_field_elements()
            .serialize_compressed(&mut out)
            .map_err(|e| ZkError::Serialization(format!("{e}")))?;
        Ok(out)
    }

    /// Inverse of [`Self::to_bytes`]. The length prefix is checked before any element is read.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ZkError> {
        let invalid = |e: SerializationError| ZkError::Envelope(format!("invalid public witness: {e}"));

        let mut reader = bytes;
        let count = u64::deserialize_compressed(&mut reader).map_err(invalid)?;
        if count != NUM_PUBLIC_INPUTS as u64 {
            return Err(ZkError::Envelope(format!(
                "expected {NUM_PUBLIC_INPUTS} public inputs, got {count}"
            )));
        }

        let elems = (0..NUM_PUBLIC_INPUTS)
            .map(|_| Fr::deserialize_compressed(&mut reader))
            .collect::<Result<Vec<_>, _>>()
            .map_err(invalid)?;
        if !reader.is_empty() {
            return Err(ZkError::Envelope(format!(
                "{} trailing bytes after public witness",
                reader.len()
            )));
        }

        Self::from_field_elements(&elems)
    }

    /// Big-endian hex of the commitment, for logs.
    pub fn commitment_hex(&self) -> String {
        hex::encode(self.medical_record_hash.into_bigint().to_bytes_be())
    }
}

fn fr_to_u64(x: &Fr, name: &str) -> Result<u64, ZkError> {
    let limbs = x.into_bigint().0;
    if limbs[1..].iter().any(|l| *l != 0) {
        return Err(ZkError::Envelope(format!("public input {name} does not fit in u64")));
    }
    Ok(limbs[0])
}
