mod bus;
mod config;
mod errors;
mod generator;
mod ingress;
mod keys;
mod prover;
mod verifier;

use crate::bus::{HttpPublisher, LocalBus, Publisher};
use crate::config::{take_proving_key, NodeConfig, Role, ENV_PROVING_KEY};
use crate::errors::NodeError;
use crate::keys::{persist_vk, ProverKeys, VerifierKey};
use crate::prover::Prover;
use crate::verifier::Verifier;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use vacc_zk::constants::CIRCUIT_VERSION;
use vacc_zk::groth16::compile_circuit;

fn main() -> Result<(), NodeError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = NodeConfig::from_env()?;

    // Read the proving key secret while this is still the only thread.
    let secret = take_proving_key(
        config.proving_key_single_use,
        |key| std::env::var(key).ok(),
        // SAFETY: no runtime or other thread exists yet, so nothing reads the environment concurrently.
        |key| unsafe { std::env::remove_var(key) },
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| NodeError::Runtime(format!("failed to build tokio runtime: {e}")))?;

    runtime.block_on(async move {
        match config.role {
            Role::Setup => run_setup(&config).await,
            Role::Prover => run_prover(&config, secret).await,
            Role::Verifier => run_verifier(&config).await,
            Role::Both => run_both(&config, secret).await,
        }
    })
}

/// Run the ceremony, write the verifying key and print the proving key for the secret channel.
async fn run_setup(config: &NodeConfig) -> Result<(), NodeError> {
    let keys = setup_keys(config, None).await?;
    let secret = keys.to_secret()?;
    // Logs go to stderr; stdout carries only this line.
    println!("{ENV_PROVING_KEY}={secret}");
    Ok(())
}

async fn run_prover(config: &NodeConfig, secret: Option<String>) -> Result<(), NodeError> {
    let keys = setup_keys(config, secret).await?;
    let publisher: Arc<dyn Publisher> = Arc::new(HttpPublisher::new(&config.verifier_url)?);
    tracing::info!(url = %config.verifier_url, subject = %config.subject, "publishing to verifier");

    let prover = Prover::new(keys, publisher, config.subject.clone());
    tokio::select! {
        report = prover.run(config.prover_mode, config.max_attempts) => {
            tracing::info!(published = report.published, attempts = report.attempts(), "prover done");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown requested");
        }
    }
    Ok(())
}

async fn run_verifier(config: &NodeConfig) -> Result<(), NodeError> {
    let key = VerifierKey::load(&config.vk_path)?;
    tracing::info!(path = %config.vk_path.display(), "verifying key loaded");

    let bus = Arc::new(LocalBus::new(config.bus_capacity));
    let verifier = Verifier::new(key, config.max_clock_skew);
    let verifier_task = tokio::spawn(verifier.run(bus.subscribe(&config.subject), None));

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .map_err(|e| NodeError::Runtime(format!("failed to bind {}: {e}", config.listen_addr)))?;
    tracing::info!(addr = %config.listen_addr, subject = %config.subject, "awaiting travel vaccine proofs");

    axum::serve(listener, ingress::router(bus.clone()))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await
        .map_err(|e| NodeError::Runtime(format!("ingress failed: {e}")))?;

    // The router's handle went with the server; dropping ours closes the subscription.
    drop(bus);
    verifier_task
        .await
        .map_err(|e| NodeError::Runtime(format!("verifier task failed: {e}")))
}

async fn run_both(config: &NodeConfig, secret: Option<String>) -> Result<(), NodeError> {
    let keys = setup_keys(config, secret).await?;

    let bus = Arc::new(LocalBus::new(config.bus_capacity));

    let verifier = Verifier::new(VerifierKey::load(&config.vk_path)?, config.max_clock_skew);
    let verifier_task = tokio::spawn(verifier.run(bus.subscribe(&config.subject), None));
    tracing::info!(subject = %config.subject, "awaiting travel vaccine proofs");

    let prover = Prover::new(keys, bus.clone(), config.subject.clone());
    tokio::select! {
        report = prover.run(config.prover_mode, config.max_attempts) => {
            tracing::info!(published = report.published, attempts = report.attempts(), "prover done");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown requested");
        }
    }

    // Dropping the last bus handle closes the subscription, letting the verifier drain.
    drop(prover);
    drop(bus);
    verifier_task
        .await
        .map_err(|e| NodeError::Runtime(format!("verifier task failed: {e}")))
}

/// Obtain proving keys from the secret channel or the ceremony, then write the verifying key.
async fn setup_keys(config: &NodeConfig, secret: Option<String>) -> Result<ProverKeys, NodeError> {
    let shape = compile_circuit()?;
    tracing::info!(
        version = CIRCUIT_VERSION,
        constraints = shape.num_constraints,
        instance_vars = shape.num_instance_variables,
        witness_vars = shape.num_witness_variables,
        "compliance circuit compiled"
    );

    let keys = match secret {
        Some(b64) => {
            tracing::info!("proving key loaded from secret channel");
            ProverKeys::from_secret(&b64)?
        }
        None => {
            tracing::info!("running trusted setup");
            tokio::task::spawn_blocking(ProverKeys::ceremony)
                .await
                .map_err(|e| NodeError::Runtime(format!("setup task failed: {e}")))??
        }
    };

    persist_vk(&config.vk_path, keys.verifying_key())?;
    tracing::info!(path = %config.vk_path.display(), "verifying key written");
    Ok(keys)
}
