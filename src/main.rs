//! Minicoin CLI Application
//!
//! A command-line interface for the single-node ledger.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::DateTime;
use clap::{Parser, Subcommand};
use minicoin::core::{Block, LedgerConfig};
use minicoin::node::Node;
use minicoin::storage::{FileStore, KvStore};

/// File inside the data directory holding every bucket
const STORE_FILE: &str = "minicoin.db";

#[derive(Parser)]
#[command(name = "minicoin")]
#[command(version = "0.1.0")]
#[command(about = "A single-node UTXO ledger with proof-of-work blocks", long_about = None)]
struct Cli {
    /// Data directory for ledger storage
    #[arg(short, long, default_value = ".minicoin_data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the ledger with a wallet and a genesis block
    Init,

    /// Wallet operations
    Wallet {
        #[command(subcommand)]
        action: WalletCommands,
    },

    /// Show the balance of an address
    Balance {
        /// Address to query
        #[arg(short, long)]
        address: String,
    },

    /// Send coins to an address (mines a block)
    Send {
        /// Sender's wallet address
        #[arg(short, long)]
        from: String,

        /// Recipient's address
        #[arg(short, long)]
        to: String,

        /// Amount to send
        #[arg(short, long)]
        amount: u64,
    },

    /// Print every block from newest to oldest
    Print,

    /// Rebuild the UTXO index from the chain
    Reindex,
}

#[derive(Subcommand)]
enum WalletCommands {
    /// Create a new wallet
    New,

    /// List all wallet addresses
    List,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Opening the node bootstraps an empty store with a wallet and a
    // genesis block, so every command works on a fresh data directory
    let store: Arc<dyn KvStore> = Arc::new(FileStore::open(cli.data_dir.join(STORE_FILE))?);
    let node = Node::open(store, LedgerConfig::default())?;

    match cli.command {
        Commands::Init => {
            println!("✅ Ledger ready at height {}", node.height()?);
            for address in node.wallet_addresses()? {
                println!("   Wallet: {}", address);
            }
        }

        Commands::Wallet { action } => match action {
            WalletCommands::New => {
                let address = node.create_wallet()?;
                println!("✅ Created wallet {}", address);
            }
            WalletCommands::List => {
                let addresses = node.wallet_addresses()?;
                println!("👛 Wallets ({}):", addresses.len());
                for address in addresses {
                    println!("   {}", address);
                }
            }
        },

        Commands::Balance { address } => {
            println!(
                "💰 Balance of {}: {} coins",
                address,
                node.get_balance(&address)?
            );
        }

        Commands::Send { from, to, amount } => {
            let tx = node.send(&from, &to, amount)?;
            println!("✅ Sent {} coins from {} to {}", amount, from, to);
            println!("   Transaction: {}", hex::encode(&tx.id));
        }

        Commands::Print => {
            for block in node.blocks()? {
                print_block(&block);
            }
        }

        Commands::Reindex => {
            let count = node.reindex()?;
            println!("✅ Rebuilt UTXO index with {} entries", count);
        }
    }

    Ok(())
}

fn print_block(block: &Block) {
    let marker = if block.is_genesis() { " (genesis)" } else { "" };
    println!("Block {}{}", hex::encode(&block.hash), marker);
    println!("   Prev:  {}", hex::encode(&block.prev_hash));
    let time = DateTime::from_timestamp(block.timestamp, 0)
        .map(|time| time.to_rfc3339())
        .unwrap_or_else(|| block.timestamp.to_string());
    println!("   Time:  {}", time);
    println!("   Nonce: {}", block.nonce);
    for tx in &block.transactions {
        let kind = if tx.is_coinbase() { "coinbase" } else { "transfer" };
        println!(
            "   Tx {} ({}, {} in / {} out)",
            hex::encode(&tx.id),
            kind,
            tx.inputs.len(),
            tx.outputs.len()
        );
    }
}
