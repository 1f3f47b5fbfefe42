//! `netem` — CLI wrapper around the impairment relay engine.
//!
//! Loads configuration, wires up the reference loss/jitter/duplication
//! policy, starts one emulator instance, and runs until interrupted. This
//! binary contains no impairment logic of its own: it is a thin external
//! collaborator of `netem-core`.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use config::EmulatorFileSettings;
use netem_core::{EmulatorConfig, EmulatorInstance, Endpoint};
use netem_policy::{PolicyParams, ReferencePolicy};

/// Userspace UDP WAN emulator: relays datagrams between two peers through
/// a configurable loss/jitter/duplication model.
#[derive(Parser, Debug)]
#[command(name = "netem", about = "Userspace UDP WAN emulator")]
struct Cli {
    /// Path to a TOML config file. CLI flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Local address to bind for relaying.
    #[arg(long)]
    emulator_endpoint: Option<String>,

    /// First peer endpoint.
    #[arg(long)]
    peer_a: Option<String>,

    /// Second peer endpoint.
    #[arg(long)]
    peer_b: Option<String>,

    /// Maximum datagram payload size.
    #[arg(long)]
    max_packet_size: Option<usize>,

    /// Probability in [0, 1] that a copy is dropped.
    #[arg(long)]
    loss: Option<f64>,

    /// Probability in [0, 1) of emitting one more duplicate.
    #[arg(long)]
    duplication: Option<f64>,

    /// Base delay in milliseconds.
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Uniform jitter half-width in milliseconds.
    #[arg(long)]
    jitter_ms: Option<u64>,
}

impl Cli {
    fn as_overrides(&self) -> EmulatorFileSettings {
        EmulatorFileSettings {
            emulator_endpoint: self.emulator_endpoint.clone(),
            peer_a: self.peer_a.clone(),
            peer_b: self.peer_b.clone(),
            max_packet_size: self.max_packet_size,
            policy: config::PolicyFileSettings {
                loss: self.loss,
                duplication: self.duplication,
                delay_ms: self.delay_ms,
                jitter_ms: self.jitter_ms,
            },
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .compact()
        .init();

    let cli = Cli::parse();
    let settings = config::load(cli.config.as_deref(), cli.as_overrides())?;

    tracing::info!(
        emulator_endpoint = %settings.emulator_endpoint,
        peer_a = %settings.peer_a,
        peer_b = %settings.peer_b,
        loss = settings.policy.loss,
        duplication = settings.policy.duplication,
        delay_ms = settings.policy.delay_ms,
        jitter_ms = settings.policy.jitter_ms,
        "netem starting"
    );

    let emulator_config = EmulatorConfig::new(
        Endpoint::new(settings.emulator_endpoint),
        Endpoint::new(settings.peer_a),
        Endpoint::new(settings.peer_b),
    )
    .with_max_packet_size(settings.max_packet_size);

    let policy = Arc::new(ReferencePolicy::new(PolicyParams {
        loss: settings.policy.loss,
        duplication: settings.policy.duplication,
        delay_ms: settings.policy.delay_ms,
        jitter_ms: settings.policy.jitter_ms,
    }));

    let mut instance = EmulatorInstance::new(emulator_config, policy);
    instance.start()?;
    tracing::info!(bound = ?instance.local_addr(), "netem relaying");

    tokio::signal::ctrl_c().await?;
    tracing::info!("received SIGINT, shutting down");
    instance.stop()?;

    Ok(())
}
