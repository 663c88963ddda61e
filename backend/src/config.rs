//! Process configuration, read from the environment at startup.

use crate::errors::NodeError;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use vacc_zk::envelope::PROOF_SUBJECT;

pub const ENV_PROVING_KEY: &str = "VACC_PROVING_KEY";

/// Which halves of the system this process runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Run the setup ceremony, write the verifying key, print the proving key secret, exit.
    Setup,
    /// Prove and publish to a remote verifier's ingress.
    Prover,
    /// Load the verifying key from disk, accept envelopes over HTTP, verify them.
    Verifier,
    /// Prover and verifier in one process over an in-process bus.
    Both,
}

/// How the prover schedules attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProverMode {
    /// One attempt at a time with a fixed pause between attempts.
    Sequential { interval: Duration },
    /// `attempts` independent attempts, joined before the prover returns.
    FanOut { attempts: usize },
}

#[derive(Clone, Debug)]
pub struct NodeConfig {
    pub role: Role,
    pub subject: String,
    pub vk_path: PathBuf,
    pub prover_mode: ProverMode,
    /// Upper bound on sequential attempts; `None` runs until shutdown.
    pub max_attempts: Option<u64>,
    pub max_clock_skew: Duration,
    /// Per-subject buffer; never smaller than the fan-out width.
    pub bus_capacity: usize,
    /// Where a verifier process accepts envelopes.
    pub listen_addr: SocketAddr,
    /// Base URL of the verifier ingress a prover process publishes to.
    pub verifier_url: String,
    /// Whether the proving key secret is removed from the environment after one read.
    pub proving_key_single_use: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            role: Role::Both,
            subject: PROOF_SUBJECT.to_string(),
            vk_path: PathBuf::from("verify.key"),
            prover_mode: ProverMode::Sequential {
                interval: Duration::from_secs(5),
            },
            max_attempts: None,
            max_clock_skew: Duration::from_secs(300),
            bus_capacity: 64,
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            verifier_url: "http://127.0.0.1:8080/".to_string(),
            proving_key_single_use: false,
        }
    }
}

impl NodeConfig {
    pub fn from_env() -> Result<Self, NodeError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Unset keys take their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, NodeError> {
        let defaults = Self::default();

        let role = match lookup("VACC_ROLE").as_deref() {
            None | Some("both") => Role::Both,
            Some("setup") => Role::Setup,
            Some("prover") => Role::Prover,
            Some("verifier") => Role::Verifier,
            Some(other) => {
                return Err(NodeError::Config(format!(
                    "VACC_ROLE must be one of setup, prover, verifier, both; got '{other}'"
                )));
            }
        };

        let subject = lookup("VACC_SUBJECT").unwrap_or(defaults.subject);
        if subject.trim().is_empty() {
            return Err(NodeError::Config("VACC_SUBJECT must not be empty".to_string()));
        }

        let vk_path = lookup("VACC_VK_PATH").map(PathBuf::from).unwrap_or(defaults.vk_path);

        let interval_secs: u64 = parse(&lookup, "VACC_PROVE_INTERVAL_SECS")?.unwrap_or(5);
        let fanout: usize = parse(&lookup, "VACC_FANOUT")?.unwrap_or(4);
        let prover_mode = match lookup("VACC_PROVER_MODE").as_deref() {
            None | Some("sequential") => ProverMode::Sequential {
                interval: Duration::from_secs(interval_secs),
            },
            Some("fanout") => {
                if fanout == 0 {
                    return Err(NodeError::Config("VACC_FANOUT must be at least 1".to_string()));
                }
                ProverMode::FanOut { attempts: fanout }
            }
            Some(other) => {
                return Err(NodeError::Config(format!(
                    "VACC_PROVER_MODE must be 'sequential' or 'fanout', got '{other}'"
                )));
            }
        };

        let max_attempts = parse(&lookup, "VACC_ATTEMPTS")?;
        let max_clock_skew = parse(&lookup, "VACC_MAX_CLOCK_SKEW_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.max_clock_skew);

        let bus_capacity = parse(&lookup, "VACC_BUS_CAPACITY")?.unwrap_or(defaults.bus_capacity);
        if bus_capacity == 0 {
            return Err(NodeError::Config("VACC_BUS_CAPACITY must be at least 1".to_string()));
        }
        // A fan-out burst must fit in the channel or a slow verifier lags and drops envelopes.
        let bus_capacity = match prover_mode {
            ProverMode::FanOut { attempts } => bus_capacity.max(attempts),
            ProverMode::Sequential { .. } => bus_capacity,
        };

        let listen_addr = parse(&lookup, "VACC_LISTEN_ADDR")?.unwrap_or(defaults.listen_addr);
        let verifier_url = lookup("VACC_VERIFIER_URL").unwrap_or(defaults.verifier_url);

        let proving_key_single_use =
            parse(&lookup, "VACC_PROVING_KEY_SINGLE_USE")?.unwrap_or(defaults.proving_key_single_use);

        Ok(Self {
            role,
            subject,
            vk_path,
            prover_mode,
            max_attempts,
            max_clock_skew,
            bus_capacity,
            listen_addr,
            verifier_url,
            proving_key_single_use,
        })
    }
}

/// Read the proving key secret from `lookup`, handing its name to `clear` when single-use.
pub fn take_proving_key(
    single_use: bool,
    lookup: impl Fn(&str) -> Option<String>,
    clear: impl FnOnce(&str),
) -> Option<String> {
    let secret = lookup(ENV_PROVING_KEY)?;
    if single_use {
        clear(ENV_PROVING_KEY);
    }
    Some(secret)
}

fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, NodeError>
where
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| NodeError::Config(format!("{key}={raw}: {e}")))
        })
        .transpose()
}
