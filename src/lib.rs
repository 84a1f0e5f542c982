//! # smbios-mdr - SMBIOS Managed Data Region (MDR V2) service core
//!
//! A host agent pushes raw SMBIOS tables to the BMC through the MDR V2
//! protocol. This crate holds the pushed table, keeps the versioned directory
//! describing it, reloads the table from its backing store on request and
//! hands it to decoders once updates settle.
//!
//! - [`MdrV2`] - the protocol verbs and the service state behind them
//! - [`ByteTable`] and the [`core::walker`] functions - bounds-checked walking
//!   of the raw structure table
//! - [`SyncEngine`] - reload, version gate and debounced decode
//! - [`InventoryCollector`] - the built-in decoder
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use smbios_mdr::{InventoryCollector, MdrConfig, MdrV2};
//! use std::sync::Arc;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = MdrConfig::load("/etc/smbios-mdr.toml")?;
//! let inventory = Arc::new(InventoryCollector::new());
//! let mdr = MdrV2::from_config(&config, inventory.clone());
//!
//! // Agent side of the handshake
//! let offer = mdr.get_data_offer()?;
//! let index = mdr.find_id_index(&offer)?;
//! let info = mdr.get_data_information(index as u8)?;
//!
//! // Walk the table directly
//! let processors = mdr.with_table(|table| table.count_of_type(4, 0));
//! # let _ = (info, processors);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;

pub use crate::config::MdrConfig;
pub use crate::core::{
    debounce::Debouncer,
    directory::{
        DataId, Directory, DirectoryEntry, LockState, Stage, ValidityFlag, MAX_DIR_ENTRIES,
        MDR2_VERSION, SMBIOS_TABLE_ID,
    },
    entry_point::{EntryPoint, EntryPointKind, SmbiosVersion},
    inventory::{Inventory, InventoryCollector, MemoryDevice, TableConsumer},
    store::{BackingStore, FileStore, MemoryStore, StoreHeader},
    sync::{CommonData, SyncEngine},
    table::{ByteTable, TABLE_CAPACITY},
    walker::{Structure, StructureHeader, MAX_ENTRY_COUNT},
};
pub use crate::error::{ConfigError, MdrError, Result, SyncError};
pub use crate::protocol::MdrV2;
