//! Transport envelope pairing an opaque proof with its public witness.
//!
//! Wire format: a JSON object with two base64 byte fields,
//! `{"proof": "...", "public_witness": "..."}`. `public_witness` carries the canonical
//! compressed encoding of the public field-element vector. The proof bytes are passed through
//! untouched; parsing them is the verifier's job.

use crate::groth16::ZkError;
use crate::types::PublicAssignment;
use serde::{Deserialize, Serialize};

/// Subject the prover publishes envelopes to and the verifier subscribes on.
pub const PROOF_SUBJECT: &str = "vaccine.proof";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofEnvelope {
    #[serde(with = "b64")]
    pub proof: Vec<u8>,
    #[serde(with = "b64")]
    pub public_witness: Vec<u8>,
}

/// Encode a proof and its public assignment into one message body.
pub fn encode(proof: &[u8], public: &PublicAssignment) -> Result<Vec<u8>, ZkError> {
    let envelope = ProofEnvelope {
        proof: proof.to_vec(),
        public_witness: public.to_bytes()?,
    };
    serde_json::to_vec(&envelope).map_err(|e| ZkError::Serialization(format!("{e}")))
}

/// Decode a message body back into proof bytes and the public assignment.
pub fn decode(body: &[u8]) -> Result<(Vec<u8>, PublicAssignment), ZkError> {
    let envelope: ProofEnvelope =
        serde_json::from_slice(body).map_err(|e| ZkError::Envelope(format!("{e}")))?;
    let public = PublicAssignment::from_bytes(&envelope.public_witness)?;
    Ok((envelope.proof, public))
}

mod b64 {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
