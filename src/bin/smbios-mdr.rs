//! smbios-mdr
//!
//! Inspect the SMBIOS table held in the MDR V2 backing store

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::json;
use smbios_mdr::core::inventory::MEMORY_DEVICE;
use smbios_mdr::{InventoryCollector, MdrConfig, MdrV2, Stage, MAX_DIR_ENTRIES};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use validator::Validate;

#[derive(Parser, Debug)]
#[command(name = "smbios-mdr")]
#[command(about = "SMBIOS MDR V2 table inspection")]
struct Args {
    /// Configuration file (TOML)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Backing store path, overriding the configuration
    #[arg(short = 's', long)]
    store: Option<PathBuf>,

    /// Debounce delay in milliseconds, overriding the configuration
    #[arg(long)]
    debounce_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Synchronize and print directory and data information as JSON
    Status,

    /// Print every structure of one type
    List {
        /// SMBIOS structure type
        #[arg(short = 't', long = "type")]
        structure_type: u8,
    },

    /// Synchronize, wait for the decode pass and print the inventory as JSON
    Inventory,

    /// Print the decoded memory device records as JSON
    Memory,
}

fn load_config(args: &Args) -> anyhow::Result<MdrConfig> {
    let mut config = match &args.config {
        Some(path) => {
            MdrConfig::load(path).with_context(|| format!("loading {}", path.display()))?
        }
        None => MdrConfig::default(),
    };
    if let Some(store) = &args.store {
        config.store_path = store.clone();
    }
    if let Some(ms) = args.debounce_ms {
        config.debounce = Duration::from_millis(ms);
    }
    config.validate().context("invalid configuration overrides")?;
    debug!(?config, "Effective configuration");
    Ok(config)
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    let collector = Arc::new(InventoryCollector::new());
    let mut updates = collector.subscribe();
    let mdr = MdrV2::from_config(&config, collector.clone());

    match args.command {
        Command::Status => {
            let data_information = (0..MAX_DIR_ENTRIES as u8)
                .map(|index| mdr.get_data_information(index).map(|bytes| hex(&bytes)))
                .collect::<Result<Vec<_>, _>>()?;
            let report = json!({
                "store": config.store_path,
                "directory": mdr.directory(),
                "directory_entries": mdr.directory_entries(0),
                "entry_point": mdr.table_entry_point(),
                "data_information": data_information,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::List { structure_type } => {
            let listing = mdr.with_table(|table| {
                table
                    .structures_of_type(structure_type)
                    .map(|s| {
                        json!({
                            "handle": format!("0x{:04x}", s.handle()),
                            "offset": s.offset(),
                            "length": s.length(),
                            "strings": s.strings(),
                        })
                    })
                    .collect::<Vec<_>>()
            });
            info!(structure_type, count = listing.len(), "Listed structures");
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
        Command::Inventory => {
            if mdr.directory().entries[0].stage == Stage::Init {
                bail!("no valid SMBIOS table in {}", config.store_path.display());
            }
            let wait = config.debounce + Duration::from_secs(1);
            tokio::time::timeout(wait, updates.changed())
                .await
                .context("timed out waiting for the decode pass")??;
            let inventory = collector.latest().context("decode pass produced no inventory")?;
            let report = json!({
                "inventory_path": config.inventory_path,
                "inventory": inventory,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Memory => {
            let records = mdr.get_record_type(MEMORY_DEVICE)?;
            info!(count = records.len(), "Listed memory devices");
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
    }

    Ok(())
}
