//! Verifier process: receive envelopes, check the evaluation time, verify the proof.

use crate::keys::VerifierKey;
use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use vacc_zk::envelope;
use vacc_zk::groth16::{verify_record_proof, ZkError};
use vacc_zk::types::{Country, PublicAssignment, VaccineType};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    Compliant(PublicAssignment),
    NotCompliant(String),
    Malformed(String),
}

pub struct Verifier {
    key: VerifierKey,
    max_clock_skew: Duration,
}

impl Verifier {
    pub fn new(key: VerifierKey, max_clock_skew: Duration) -> Self {
        Self { key, max_clock_skew }
    }

    /// Judge one message body against the local clock `now` (Unix seconds).
    pub fn check(&self, body: &[u8], now: u64) -> Verdict {
        let (proof, public) = match envelope::decode(body) {
            Ok(decoded) => decoded,
            Err(e) => return Verdict::Malformed(e.to_string()),
        };

        let skew = now.abs_diff(public.current_time);
        if skew > self.max_clock_skew.as_secs() {
            return Verdict::NotCompliant(format!(
                "evaluation time {} is {skew}s away from the local clock",
                public.current_time
            ));
        }

        match verify_record_proof(&self.key.pvk, &proof, &public) {
            Ok(()) => Verdict::Compliant(public),
            Err(ZkError::VerificationFailed) => Verdict::NotCompliant("proof verification failed".into()),
            Err(e) => Verdict::NotCompliant(e.to_string()),
        }
    }

    /// Handle messages until the bus closes.
    ///
    /// Every message is verified in its own blocking task. When `verdicts` is set, each verdict
    /// is also forwarded there. A receiver that falls more than the bus capacity behind loses
    /// the oldest envelopes; the loss is logged with its size and the loop carries on.
    pub async fn run(self, mut receiver: broadcast::Receiver<Bytes>, verdicts: Option<mpsc::UnboundedSender<Verdict>>) {
        let verifier = Arc::new(self);
        let mut tasks = JoinSet::new();

        loop {
            match receiver.recv().await {
                Ok(body) => {
                    let verifier = verifier.clone();
                    let verdicts = verdicts.clone();
                    tasks.spawn_blocking(move || {
                        let verdict = verifier.check(&body, now_secs());
                        report(&verdict);
                        if let Some(tx) = verdicts {
                            let _ = tx.send(verdict);
                        }
                    });
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "verifier lagged behind, messages dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }

            while let Some(done) = tasks.try_join_next() {
                if let Err(e) = done {
                    error!(error = %e, "verification task panicked");
                }
            }
        }

        while let Some(done) = tasks.join_next().await {
            if let Err(e) = done {
                error!(error = %e, "verification task panicked");
            }
        }
        info!("proof subscription closed");
    }
}

fn now_secs() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or(0)
}

fn report(verdict: &Verdict) {
    match verdict {
        Verdict::Compliant(public) => {
            let vaccine = VaccineType::from_u64(public.vaccine_type)
                .map(|v| v.to_string())
                .unwrap_or_else(|| public.vaccine_type.to_string());
            let from = Country::from_u64(public.country_from).map_or("??", Country::code);
            let to = Country::from_u64(public.country_to).map_or("??", Country::code);
            info!(
                age = public.age,
                %vaccine,
                from,
                to,
                commitment = %public.commitment_hex(),
                "[ok] proof verified, traveler passed"
            );
        }
        Verdict::NotCompliant(reason) => warn!(%reason, "[rejected] traveler did not pass"),
        Verdict::Malformed(reason) => warn!(%reason, "[malformed] message discarded"),
    }
}
