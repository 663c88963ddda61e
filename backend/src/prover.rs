//! Prover process: generate a record, prove it, wrap the proof in an envelope, publish.
//!
//! Each attempt is independent. It owns its record and RNGs and only reads the shared proving
//! key. Non-compliant records, generator failures and rejected publishes are logged and counted;
//! they never stop the loop.

use crate::bus::Publisher;
use crate::config::ProverMode;
use crate::generator::{generate_record, GeneratorError};
use crate::keys::ProverKeys;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::OsRng;
use rand_chacha::ChaCha20Rng;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use vacc_zk::envelope;
use vacc_zk::groth16::{prove_record, serialize_proof, ZkError};
use vacc_zk::types::VaccinationRecord;

/// Where attempt records come from. Production uses [`generate_record`].
pub type RecordSource =
    Arc<dyn Fn(&mut ChaCha20Rng, DateTime<Utc>) -> Result<VaccinationRecord, GeneratorError> + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttemptOutcome {
    Published,
    NonCompliant,
    GenerationFailed,
    ProvingFailed,
    PublishFailed,
}

/// Outcome counts for one prover run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProverReport {
    pub published: u64,
    pub non_compliant: u64,
    pub generation_failed: u64,
    pub proving_failed: u64,
    pub publish_failed: u64,
}

impl ProverReport {
    fn record(&mut self, outcome: AttemptOutcome) {
        let slot = match outcome {
            AttemptOutcome::Published => &mut self.published,
            AttemptOutcome::NonCompliant => &mut self.non_compliant,
            AttemptOutcome::GenerationFailed => &mut self.generation_failed,
            AttemptOutcome::ProvingFailed => &mut self.proving_failed,
            AttemptOutcome::PublishFailed => &mut self.publish_failed,
        };
        *slot += 1;
    }

    pub fn attempts(&self) -> u64 {
        self.published
            + self.non_compliant
            + self.generation_failed
            + self.proving_failed
            + self.publish_failed
    }
}

#[derive(Clone)]
pub struct Prover {
    keys: ProverKeys,
    bus: Arc<dyn Publisher>,
    subject: String,
    source: RecordSource,
}

impl Prover {
    pub fn new(keys: ProverKeys, bus: Arc<dyn Publisher>, subject: String) -> Self {
        let source: RecordSource =
            Arc::new(|rng: &mut ChaCha20Rng, now: DateTime<Utc>| generate_record(rng, now));
        Self::with_source(keys, bus, subject, source)
    }

    pub fn with_source(keys: ProverKeys, bus: Arc<dyn Publisher>, subject: String, source: RecordSource) -> Self {
        Self {
            keys,
            bus,
            subject,
            source,
        }
    }

    /// Run attempts according to `mode`.
    ///
    /// Sequential runs stop after `max_attempts` (or never). Fan-out runs exactly the configured
    /// number of attempts and returns once all of them have finished.
    pub async fn run(&self, mode: ProverMode, max_attempts: Option<u64>) -> ProverReport {
        let mut report = ProverReport::default();

        match mode {
            ProverMode::Sequential { interval } => loop {
                report.record(self.attempt().await);

                if max_attempts.is_some_and(|max| report.attempts() >= max) {
                    break;
                }
                tokio::time::sleep(interval).await;
            },
            ProverMode::FanOut { attempts } => {
                let mut tasks = JoinSet::new();
                for _ in 0..attempts {
                    let prover = self.clone();
                    tasks.spawn(async move { prover.attempt().await });
                }
                while let Some(joined) = tasks.join_next().await {
                    let outcome = joined.unwrap_or_else(|e| {
                        error!(error = %e, "proving task aborted");
                        AttemptOutcome::ProvingFailed
                    });
                    report.record(outcome);
                }
            }
        }

        info!(?report, "prover run finished");
        report
    }

    /// One generate → prove → encode → publish cycle.
    pub async fn attempt(&self) -> AttemptOutcome {
        let pk = self.keys.clone();
        let source = self.source.clone();
        let now = Utc::now();

        let built = tokio::task::spawn_blocking(move || build_envelope(&pk, &source, now)).await;

        let body = match built {
            Ok(Ok(body)) => body,
            Ok(Err(AttemptError::Generator(e))) => {
                warn!(error = %e, "record generation failed");
                return AttemptOutcome::GenerationFailed;
            }
            Ok(Err(AttemptError::Zk(ZkError::Unsatisfiable(constraint)))) => {
                info!(%constraint, "unable to create valid proof, record is not compliant");
                return AttemptOutcome::NonCompliant;
            }
            Ok(Err(AttemptError::Zk(e))) => {
                error!(error = %e, "proving backend failed");
                return AttemptOutcome::ProvingFailed;
            }
            Err(e) => {
                error!(error = %e, "proving task panicked");
                return AttemptOutcome::ProvingFailed;
            }
        };

        match self.bus.publish(&self.subject, Bytes::from(body)).await {
            Ok(receivers) => {
                info!(subject = %self.subject, receivers, "proof sent");
                AttemptOutcome::Published
            }
            Err(e) => {
                warn!(error = %e, "publish failed");
                AttemptOutcome::PublishFailed
            }
        }
    }
}

enum AttemptError {
    Generator(GeneratorError),
    Zk(ZkError),
}

fn build_envelope(keys: &ProverKeys, source: &RecordSource, now: DateTime<Utc>) -> Result<Vec<u8>, AttemptError> {
    let mut record_rng = ChaCha20Rng::from_entropy();
    let record = source(&mut record_rng, now).map_err(AttemptError::Generator)?;

    let current_time = u64::try_from(now.timestamp()).unwrap_or(0);

    // Use OS randomness for the proof to avoid deterministic proofs.
    let mut proof_rng = OsRng;
    let (proof, public) =
        prove_record(&mut proof_rng, &keys.pk, record, current_time).map_err(AttemptError::Zk)?;

    let proof_bytes = serialize_proof(&proof).map_err(AttemptError::Zk)?;
    let body = envelope::encode(&proof_bytes, &public).map_err(AttemptError::Zk)?;
    debug!(bytes = body.len(), commitment = %public.commitment_hex(), "envelope encoded");
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::LocalBus;
    use std::sync::LazyLock;
    use std::time::Duration;
    use vacc_zk::constants::{NOT_VACCINATED, NO_EXPIRATION, RISK_COUNTRY, VACCINATED};
    use vacc_zk::types::{Country, VaccineType};

    const SUBJECT: &str = "vaccine.proof";

    static KEYS: LazyLock<ProverKeys> = LazyLock::new(|| ProverKeys::ceremony().unwrap());

    fn measles_record() -> VaccinationRecord {
        VaccinationRecord {
            age: 30,
            vaccine_type: VaccineType::Measles.as_u64(),
            country_from: Country::Canada.as_u64(),
            country_to: Country::Japan.as_u64(),
            medical_record_hash: Default::default(),
            lot_number: 77_123,
            date_of_birth: 19_950_301,
            medical_record_number: 42,
            vaccinated_secret: VACCINATED,
            vaccine_expiration: NO_EXPIRATION,
        }
        .with_bound_commitment()
    }

    fn fixed(record: VaccinationRecord) -> RecordSource {
        Arc::new(move |_: &mut ChaCha20Rng, _: DateTime<Utc>| Ok::<_, GeneratorError>(record.clone()))
    }

    #[tokio::test]
    async fn compliant_record_is_published() {
        let bus = Arc::new(LocalBus::new(4));
        let mut rx = bus.subscribe(SUBJECT);
        let prover = Prover::with_source(KEYS.clone(), bus, SUBJECT.into(), fixed(measles_record()));

        assert_eq!(prover.attempt().await, AttemptOutcome::Published);

        let body = rx.recv().await.unwrap();
        let (_, public) = envelope::decode(&body).unwrap();
        assert_eq!(public.age, 30);
    }

    #[tokio::test]
    async fn non_compliant_record_is_skipped() {
        let bus = Arc::new(LocalBus::new(4));
        let mut rx = bus.subscribe(SUBJECT);
        let record = VaccinationRecord {
            vaccine_type: VaccineType::YellowFever.as_u64(),
            country_from: RISK_COUNTRY.as_u64(),
            vaccinated_secret: NOT_VACCINATED,
            ..measles_record()
        };
        let prover = Prover::with_source(KEYS.clone(), bus, SUBJECT.into(), fixed(record));

        assert_eq!(prover.attempt().await, AttemptOutcome::NonCompliant);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn generator_failure_is_counted() {
        let bus = Arc::new(LocalBus::new(4));
        let _rx = bus.subscribe(SUBJECT);
        let source: RecordSource = Arc::new(|_: &mut ChaCha20Rng, _: DateTime<Utc>| {
            Err::<VaccinationRecord, _>(GeneratorError::SubRecord {
                part: "inoculation",
                reason: "test".into(),
            })
        });
        let prover = Prover::with_source(KEYS.clone(), bus, SUBJECT.into(), source);

        assert_eq!(prover.attempt().await, AttemptOutcome::GenerationFailed);
    }

    #[tokio::test]
    async fn publish_without_verifier_keeps_going() {
        let bus = Arc::new(LocalBus::new(4));
        let prover = Prover::with_source(KEYS.clone(), bus, SUBJECT.into(), fixed(measles_record()));

        let report = prover
            .run(ProverMode::Sequential { interval: Duration::from_millis(1) }, Some(2))
            .await;
        assert_eq!(report.publish_failed, 2);
        assert_eq!(report.attempts(), 2);
    }

    #[tokio::test]
    async fn fan_out_joins_every_attempt() {
        let bus = Arc::new(LocalBus::new(16));
        let mut rx = bus.subscribe(SUBJECT);
        let prover = Prover::with_source(KEYS.clone(), bus, SUBJECT.into(), fixed(measles_record()));

        let report = prover.run(ProverMode::FanOut { attempts: 3 }, None).await;
        assert_eq!(report, ProverReport { published: 3, ..Default::default() });

        for _ in 0..3 {
            rx.recv().await.unwrap();
        }
    }
}
