//! forgex-node — the ForgeX full-node binary.
//!
//! Startup sequence:
//!   1. Open (or initialise) the chain database
//!   2. Apply genesis if the store is fresh, otherwise replay the stored chain
//!   3. Optionally catch up from a peer (`--peers`)
//!   4. Run the slot loop: drain the queue, forge when our delegate owns
//!      the current slot, hand generated blocks to the broadcast channel

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info, warn};

use forgex_chain::genesis::{self, GenesisParams};
use forgex_chain::{apply_genesis, BlockPipeline, ChainStore, PipelineConfig};
use forgex_core::constants::{EPOCH_START_MS, MAX_BLOCK_BYTES, MAX_TX_PER_BLOCK};
use forgex_core::slots::SlotClock;
use forgex_crypto::KeyPair;
use forgex_peer::PeerClient;
use forgex_state::{services, AccountRepository, ChainDb};

#[derive(Parser, Debug)]
#[command(
    name = "forgex-node",
    version,
    about = "ForgeX full node — delegated proof of stake on ten-second slots"
)]
struct Args {
    /// Directory for the persistent chain database.
    #[arg(long, default_value = "~/.forgex/data")]
    data_dir: PathBuf,

    /// Path to the genesis params JSON shared by the network.
    #[arg(long)]
    genesis_params: PathBuf,

    /// Hex-encoded 32-byte forging seed. Without it the node runs as a
    /// non-forging observer.
    #[arg(long)]
    forging_seed: Option<String>,

    /// Peer base URLs to catch up from at startup (comma-separated).
    #[arg(long, value_delimiter = ',')]
    peers: Vec<String>,

    /// Epoch anchor override in milliseconds (testnets).
    #[arg(long, default_value_t = EPOCH_START_MS)]
    epoch_start_ms: i64,

    /// Per-block transaction cap override.
    #[arg(long, default_value_t = MAX_TX_PER_BLOCK)]
    max_tx_per_block: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,forgex=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    info!("ForgeX node starting");

    // ── Chain database ────────────────────────────────────────────────────────
    let data_dir = expand_tilde(&args.data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;
    let db = Arc::new(ChainDb::open(&data_dir).context("opening chain database")?);

    // ── Genesis or replay ─────────────────────────────────────────────────────
    let params = GenesisParams::load(&args.genesis_params).context("loading genesis params")?;
    let mut repo = AccountRepository::new();
    let mut chain = ChainStore::new(Arc::clone(&db), params.delegates.len());
    chain.load_tail().context("loading chain tail")?;

    let roster = if chain.is_empty() {
        info!("fresh database — applying genesis");
        apply_genesis(&params, &mut repo, &mut chain).context("applying genesis")?
    } else {
        info!(height = chain.height(), "existing chain found — replaying state");
        let roster = genesis::seed_state(&params, &mut repo).context("seeding genesis state")?;
        replay_confirmed(&db, &mut repo, chain.height()).context("replaying confirmed blocks")?;
        roster
    };

    // ── Pipeline (the dependency container) ───────────────────────────────────
    let clock = SlotClock::new(args.epoch_start_ms);
    let pipeline = Arc::new(BlockPipeline::new(
        chain,
        repo,
        roster,
        clock,
        Arc::clone(&db),
        PipelineConfig {
            max_tx_per_block: args.max_tx_per_block,
            max_block_bytes: MAX_BLOCK_BYTES,
        },
    ));

    // ── Broadcast channel (drained by the transport collaborator) ─────────────
    let (broadcast_tx, mut broadcast_rx) = tokio::sync::mpsc::unbounded_channel();
    pipeline.set_broadcast(broadcast_tx);
    tokio::spawn(async move {
        while let Some(block) = broadcast_rx.recv().await {
            debug!(id = %block.id, height = block.height, "block handed to transport");
        }
    });

    // ── Startup catch-up from peers ───────────────────────────────────────────
    if !args.peers.is_empty() {
        let peer_client = PeerClient::new();
        for peer in &args.peers {
            if let Err(e) = catch_up(&pipeline, &peer_client, peer).await {
                warn!(peer, error = %e, "catch-up failed");
            }
        }
    }

    // ── Forging identity ──────────────────────────────────────────────────────
    let forging_key = match &args.forging_seed {
        Some(seed) => {
            let kp = KeyPair::from_seed_hex(seed).context("parsing forging seed")?;
            info!(address = %kp.address, "forging enabled");
            Some(kp)
        }
        None => {
            info!("no forging seed — running as observer");
            None
        }
    };

    // ── Shutdown hook ─────────────────────────────────────────────────────────
    let shutdown_pipeline = Arc::clone(&pipeline);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("shutdown requested");
            shutdown_pipeline.shutdown();
        }
    });

    // ── Slot loop ─────────────────────────────────────────────────────────────
    info!("node ready");
    let mut last_forged_slot: Option<u32> = None;
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        ticker.tick().await;
        if pipeline.is_cleaning() {
            info!("slot loop stopped");
            break;
        }

        let promoted = pipeline.process_queue().await;
        if promoted > 0 {
            debug!(promoted, "queue drained into pool");
        }

        let Some(kp) = &forging_key else { continue };
        let now_ms = chrono::Utc::now().timestamp_millis();
        let slot = clock.slot_at(now_ms);
        if last_forged_slot == Some(slot) {
            continue;
        }
        if pipeline.elected_delegate(slot).await != Some(kp.public_key) {
            continue;
        }
        match pipeline.generate_block(kp, slot).await {
            Ok(block) => {
                last_forged_slot = Some(slot);
                info!(height = block.height, id = %block.id, slot, "forged");
            }
            Err(e) => warn!(slot, error = %e, "forging failed"),
        }
    }

    db.flush().ok();
    Ok(())
}

/// Re-apply every confirmed transaction from the durable store to rebuild
/// the in-memory account map (heights 2..=head; genesis is seeded
/// separately).
fn replay_confirmed(
    db: &ChainDb,
    repo: &mut AccountRepository,
    head_height: u64,
) -> anyhow::Result<()> {
    for height in 2..=head_height {
        let block = db
            .get_block(height)?
            .with_context(|| format!("missing stored block at height {height}"))?;
        for tx in &block.transactions {
            services::apply_unconfirmed(tx, repo)
                .with_context(|| format!("replaying transaction {}", tx.id))?;
        }
    }
    Ok(())
}

/// Load blocks after our head from `peer` and run them through the
/// pipeline.
async fn catch_up(
    pipeline: &BlockPipeline,
    client: &PeerClient,
    peer: &str,
) -> anyhow::Result<()> {
    let Some((head_id, head_height)) = pipeline.head().await else {
        anyhow::bail!("no local chain head");
    };
    let blocks = client.get_blocks(peer, &head_id).await?;
    if blocks.is_empty() {
        debug!(peer, "peer has nothing beyond our head");
        return Ok(());
    }
    let applied = pipeline.apply_block_batch(blocks).await?;
    info!(peer, applied, from_height = head_height, "catch-up finished");
    Ok(())
}

/// Expand a leading `~` to the user's home directory (`HOME` or `USERPROFILE`).
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}
