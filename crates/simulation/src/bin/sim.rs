//! LedgerBFT simulation CLI
//!
//! Starts an in-process committee, funds the wallets, submits random transfers
//! and runs one consensus instance per height.

use anyhow::Context;
use clap::Parser;
use ledgerbft_bft::ByzantineBehavior;
use ledgerbft_node::NetworkSettings;
use ledgerbft_simulation::{Cluster, NetworkConfig, TransferWorkload, WalletPool};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ledgerbft-sim")]
#[command(about = "Run Bracha block agreement on an in-process committee")]
#[command(version)]
struct Cli {
    /// Settings file (TOML). Overrides --validators and --faulty.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of validators when no settings file is given
    #[arg(long, default_value = "4")]
    validators: u64,

    /// Faulty validator as ID=BEHAVIOR, e.g. 3=crash or 2=delay_send|wrong_order
    #[arg(long, value_parser = parse_faulty)]
    faulty: Vec<(u64, ByzantineBehavior)>,

    /// Heights to agree on
    #[arg(short, long, default_value = "3")]
    rounds: u64,

    /// Transfers submitted before each height
    #[arg(long, default_value = "4")]
    transfers: usize,

    /// Largest single transfer amount
    #[arg(long, default_value = "10")]
    max_amount: u64,

    /// Packet loss rate (0.0 to 1.0)
    #[arg(long, default_value = "0.0")]
    loss: f64,

    /// Seed for the workload and the network
    #[arg(long, default_value = "12345")]
    seed: u64,

    /// Seconds to wait for each height
    #[arg(long, default_value = "10")]
    timeout: u64,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn parse_faulty(s: &str) -> Result<(u64, ByzantineBehavior), String> {
    let (id, behavior) = s
        .split_once('=')
        .ok_or_else(|| format!("Expected ID=BEHAVIOR, got {}", s))?;
    let id: u64 = id
        .trim()
        .parse()
        .map_err(|_| format!("Invalid validator ID: {}", id))?;
    let behavior = behavior.parse().map_err(|e| format!("{}", e))?;
    Ok((id, behavior))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let settings = match &cli.config {
        Some(path) => NetworkSettings::load(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => cli
            .faulty
            .iter()
            .fold(NetworkSettings::new(cli.validators), |s, (id, behavior)| {
                s.with_behavior(*id, *behavior)
            }),
    };

    let network = NetworkConfig::default()
        .with_packet_loss(cli.loss)
        .with_seed(cli.seed);
    let wallet_ids = settings.wallet_ids();
    let mut cluster = Cluster::start(settings, network).context("starting cluster")?;

    let mut wallets = WalletPool::new(&wallet_ids).context("creating wallets")?;
    let workload = TransferWorkload::new(cli.max_amount);
    let mut rng = ChaCha8Rng::seed_from_u64(cli.seed);
    let timeout = Duration::from_secs(cli.timeout);

    println!(
        "Committee of {} (f = {}), leader {}, {} wallets",
        cluster.settings().num_validators(),
        cluster.settings().max_faulty(),
        cluster.settings().leader_id(),
        wallet_ids.len()
    );

    for _ in 0..cli.rounds {
        let batch = workload.generate_batch(&mut wallets, cluster.pool().utxos(), cli.transfers, &mut rng);
        for tx in batch {
            let tx_id = tx.tx_id;
            if let Err(e) = cluster.submit(tx) {
                println!("  {} rejected: {}", tx_id, e);
            }
        }

        let outcome = cluster.run_next(timeout)?;
        println!(
            "Height {}: block {} with {} transactions, {} of {} validators agreed, {} signatures, {:?}",
            outcome.block.height().0,
            outcome.block.id().short(),
            outcome.block.transactions().len(),
            outcome.agreeing(),
            outcome.votes.len(),
            outcome.block.validator_signatures().len(),
            outcome.elapsed
        );
    }

    println!("Balances:");
    for id in &wallet_ids {
        println!("  {}: {}", id, cluster.pool().balance_of(*id));
    }
    println!("Network: {:?}", cluster.network().stats());

    cluster.shutdown()?;
    Ok(())
}
