//! ZK layer for privacy-preserving vaccination compliance.
//!
//! This crate contains:
//! - A SNARK circuit that proves a vaccination record satisfies the travel compliance policy.
//! - The Poseidon commitment used to bind a public hash to the private medical record number.
//! - Prover + verifier orchestration.
//! - The envelope codec for transporting proofs and public inputs.

pub mod constants;
pub mod circuit;
pub mod envelope;
pub mod gadgets;
pub mod groth16;
pub mod hasher;
pub mod types;
