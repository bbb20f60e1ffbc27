use clap::Parser;
use log::{error, info};

use btc_watcher::config::{AppConfig, Network};
use btc_watcher::logging::init_logging;
use btc_watcher::models::{Transaction, WatchedAddressSet};
use btc_watcher::pipeline::Watcher;

#[derive(Parser)]
#[command(name = "btc-watcher")]
#[command(about = "Streams confirmed Bitcoin transactions that pay a set of watched addresses")]
#[command(version)]
struct Args {
    /// TOML configuration file (defaults to $CONFIG_FILE or ./config.toml)
    #[arg(long)]
    config: Option<String>,

    /// mainnet or testnet
    #[arg(long)]
    network: Option<Network>,

    /// Address to watch; may be given several times
    #[arg(long = "address")]
    addresses: Vec<String>,

    /// Last height treated as already processed
    #[arg(long)]
    start_height: Option<u64>,

    #[arg(long)]
    confirmation_depth: Option<u64>,

    #[arg(long)]
    log_level: Option<String>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,
}

impl Args {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(network) = self.network {
            config.explorer.network = network;
        }
        if !self.addresses.is_empty() {
            config.watcher.watched_addresses = self.addresses.clone();
        }
        if let Some(height) = self.start_height {
            config.watcher.start_height = Some(height);
        }
        if let Some(depth) = self.confirmation_depth {
            config.watcher.confirmation_depth = depth;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load_from_file()?,
    };
    config.apply_env_overrides()?;
    args.apply(&mut config);

    if args.print_config {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    config.validate()?;
    init_logging(&config.logging)?;

    info!(
        "Watching {} address(es) on {} via {}",
        config.watcher.watched_addresses.len(),
        config.explorer.network,
        config.explorer.base_url()
    );

    let mut watcher = Watcher::from_config(&config)?;
    let watched = watcher.watched_addresses().clone();
    let output = watcher.output();
    watcher.start()?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            signal = &mut ctrl_c => {
                if let Err(e) = signal {
                    error!("Unable to listen for shutdown signal: {}", e);
                }
                info!("Shutdown requested");
                break;
            }
            received = output.recv() => match received {
                Ok(tx) => print_transaction(&tx, &watched),
                Err(_) => break,
            },
        }
    }

    watcher.stop().await?;
    Ok(())
}

fn print_transaction(tx: &Transaction, watched: &WatchedAddressSet) {
    println!("Transaction {}", tx.txid);
    match tx.status.block_height {
        Some(height) if tx.status.confirmed => println!("  confirmed in block {}", height),
        _ => println!("  unconfirmed"),
    }
    println!("  fee: {} sat, size: {} bytes", tx.fee, tx.size);

    println!("  inputs:");
    for input in &tx.vin {
        match &input.prevout {
            _ if input.is_coinbase => println!("    coinbase"),
            Some(prevout) => println!(
                "    {} ({:.8} BTC)",
                prevout.scriptpubkey_address.as_deref().unwrap_or("<non-standard>"),
                prevout.value_btc()
            ),
            None => println!("    {}:{}", input.txid, input.vout),
        }
    }

    println!("  outputs:");
    for output in &tx.vout {
        let address = output.address().unwrap_or("<no address>");
        let marker = if watched.contains(address) { "  <== watched" } else { "" };
        println!("    {} {:.8} BTC{}", address, output.value_btc(), marker);
    }
    println!();
}
