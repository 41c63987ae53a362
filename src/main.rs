//! pow-ledger demo application
//!
//! Mines a handful of blocks onto a fresh in-memory ledger and prints the result.

use clap::Parser;
use pow_ledger::config::ChainConfig;
use pow_ledger::core::Blockchain;
use pow_ledger::crypto::KeyPair;
use pow_ledger::mining::{Miner, MiningWorker};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "pow-ledger")]
#[command(version = "0.1.0")]
#[command(about = "An append-only proof-of-work ledger", long_about = None)]
struct Cli {
    /// JSON chain configuration; defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of blocks to mine
    #[arg(short, long, default_value = "3")]
    blocks: u64,

    /// Hex-encoded miner private key; a fresh key is generated when omitted
    #[arg(short, long)]
    key: Option<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ChainConfig::from_file(path)?,
        None => ChainConfig::default(),
    };
    let key_pair = match &cli.key {
        Some(hex_key) => KeyPair::from_private_key_hex(hex_key)?,
        None => KeyPair::generate(),
    };

    let miner = Miner::new(key_pair, &config);
    let address = miner.address();
    let blockchain = Arc::new(RwLock::new(Blockchain::new(config)?));
    let shutdown = CancellationToken::new();

    println!("⛏️  Mining {} block(s) for address: {}", cli.blocks, address);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let ctrl_c = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                ctrl_c.cancel();
            }
        });

        let worker = MiningWorker::new(miner, blockchain.clone(), shutdown);
        let mined = worker.run(Some(cli.blocks)).await?;

        let chain = blockchain.read().await;
        println!("\n⛓️  Mined {} block(s), chain height {}", mined, chain.height());
        for block in chain.blocks() {
            println!("   Block {}", block.index);
            println!("   ├─ Hash: {}", block.hash);
            println!("   ├─ Previous: {}", block.previous_hash);
            println!("   ├─ Timestamp: {}", block.timestamp);
            println!("   ├─ Nonce: {}", block.nonce);
            println!("   └─ Transactions: {}", block.tx_count());
        }
        println!("\n💰 Balance for {}: {} coins", address, chain.balance(&address));
        println!("🎯 Next target: {:#018x}", chain.difficulty());

        Ok::<(), Box<dyn std::error::Error>>(())
    })
}
