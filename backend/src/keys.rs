//! Groth16 key lifecycle: setup ceremony, verifying-key file, proving-key secret channel.
//!
//! Keys are created once at startup and then only shared read-only, behind `Arc`s, with the
//! prover and verifier entry points.

use crate::errors::NodeError;
use ark_bn254::Bn254;
use ark_groth16::{PreparedVerifyingKey, ProvingKey, VerifyingKey};
use base64::Engine;
use rand::rngs::OsRng;
use std::path::Path;
use std::sync::Arc;
use vacc_zk::groth16::{deserialize_pk, deserialize_vk, prepare_vk, serialize_pk, serialize_vk, setup_keys};

/// Proving material held by the prover process.
#[derive(Clone)]
pub struct ProverKeys {
    pub pk: Arc<ProvingKey<Bn254>>,
}

impl ProverKeys {
    /// Run the trusted setup (prototype).
    ///
    /// IMPORTANT: In production, use MPC setup or a transparent proof system.
    pub fn ceremony() -> Result<Self, NodeError> {
        let mut rng = OsRng;
        let (pk, _vk) = setup_keys(&mut rng)?;
        Ok(Self { pk: Arc::new(pk) })
    }

    /// Decode a base64 proving key handed over through the secret channel.
    pub fn from_secret(b64: &str) -> Result<Self, NodeError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(b64.trim())
            .map_err(|e| NodeError::Config(format!("proving key secret is not base64: {e}")))?;
        let pk = deserialize_pk(&bytes)?;
        Ok(Self { pk: Arc::new(pk) })
    }

    /// Encode the proving key for the secret channel.
    pub fn to_secret(&self) -> Result<String, NodeError> {
        let bytes = serialize_pk(&self.pk)?;
        Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn verifying_key(&self) -> &VerifyingKey<Bn254> {
        &self.pk.vk
    }
}

/// Verification material shared by every verifier callback.
#[derive(Clone)]
pub struct VerifierKey {
    pub pvk: Arc<PreparedVerifyingKey<Bn254>>,
}

impl VerifierKey {
    pub fn new(vk: &VerifyingKey<Bn254>) -> Self {
        Self {
            pvk: Arc::new(prepare_vk(vk)),
        }
    }

    /// Load the verifying key published by the prover's setup.
    pub fn load(path: &Path) -> Result<Self, NodeError> {
        let bytes = std::fs::read(path).map_err(|e| NodeError::io(path, e))?;
        let vk = deserialize_vk(&bytes)?;
        Ok(Self::new(&vk))
    }
}

/// Write the verifying key for verifier processes. Called once, right after setup.
pub fn persist_vk(path: &Path, vk: &VerifyingKey<Bn254>) -> Result<(), NodeError> {
    let bytes = serialize_vk(vk)?;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| NodeError::io(dir, e))?;
    }
    std::fs::write(path, bytes).map_err(|e| NodeError::io(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::LazyLock;

    static KEYS: LazyLock<ProverKeys> = LazyLock::new(|| ProverKeys::ceremony().unwrap());

    #[test]
    fn vk_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys").join("verify.key");

        persist_vk(&path, KEYS.verifying_key()).unwrap();
        let loaded = VerifierKey::load(&path).unwrap();

        assert_eq!(loaded.pvk.vk, *KEYS.verifying_key());
    }

    #[test]
    fn missing_vk_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = VerifierKey::load(&dir.path().join("absent.key")).err().unwrap();
        assert!(matches!(err, NodeError::Io { .. }));
    }

    #[test]
    fn proving_key_secret_round_trips() {
        let secret = KEYS.to_secret().unwrap();
        let restored = ProverKeys::from_secret(&secret).unwrap();
        assert_eq!(restored.verifying_key(), KEYS.verifying_key());
    }

    #[test]
    fn garbage_secret_is_rejected() {
        assert!(matches!(ProverKeys::from_secret("%%%"), Err(NodeError::Config(_))));
        assert!(matches!(ProverKeys::from_secret("AAAA"), Err(NodeError::Zk(_))));
    }
}
