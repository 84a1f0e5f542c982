//! Table synchronization engine
//!
//! Pulls the latest image from the backing store into the [`ByteTable`],
//! gates it on the SMBIOS version, updates the directory entry and schedules
//! a debounced decode pass for the entity decoders.

use crate::core::debounce::Debouncer;
use crate::core::directory::{Directory, Stage, MAX_DIR_ENTRIES, SMBIOS_DIR_INDEX};
use crate::core::entry_point::{self, EntryPoint};
use crate::core::inventory::TableConsumer;
use crate::core::store::{BackingStore, StoreHeader};
use crate::core::table::ByteTable;
use crate::error::{MdrError, Result, SyncError};
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

/// State owned by the synchronization subsystem
#[derive(Debug)]
pub struct SyncState {
    pub directory: Directory,
    pub table: ByteTable,
    /// Last value reported through `directory_entries`
    pub published_entries: u8,
}

impl SyncState {
    pub fn new() -> Self {
        let directory = Directory::new();
        let published_entries = directory.dir_entries;
        SyncState {
            directory,
            table: ByteTable::new(),
            published_entries,
        }
    }
}

impl Default for SyncState {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of a successful synchronization pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub header: StoreHeader,
    /// Bytes copied into the table; less than declared if the store was short
    pub copied: usize,
    pub entry_point: EntryPoint,
}

/// Metadata of an entry before `synchronize_directory_common_data` changed it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommonData {
    pub data_set_size: u32,
    pub data_version: u32,
    pub timestamp: u32,
}

impl CommonData {
    pub fn to_vec(&self) -> Vec<u32> {
        vec![self.data_set_size, self.data_version, self.timestamp]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingAction {
    Decode,
    Resync,
}

/// Zero `table` and fill it from `store`, then validate the SMBIOS version
///
/// The table is zeroed before anything is read, so a failed pass leaves it
/// either empty or holding the rejected image.
pub fn load_image(
    store: &dyn BackingStore,
    table: &mut ByteTable,
) -> std::result::Result<SyncReport, SyncError> {
    table.clear();

    let image = store.read_image()?;
    let header = StoreHeader::parse(&image).ok_or(SyncError::HeaderTruncated {
        len: image.len(),
        expected: StoreHeader::SIZE,
    })?;

    if header.data_size as usize > table.capacity() {
        return Err(SyncError::DataTooLarge {
            declared: header.data_size,
            capacity: table.capacity(),
        });
    }

    let content = &image[StoreHeader::SIZE..];
    let wanted = (header.data_size as usize).min(content.len());
    if wanted < header.data_size as usize {
        warn!(
            declared = header.data_size,
            available = content.len(),
            "Table image shorter than declared, truncating"
        );
    }
    let copied = table.fill(&content[..wanted]);

    let entry_point = entry_point::check_version(table.as_bytes())?;
    Ok(SyncReport {
        header,
        copied,
        entry_point,
    })
}

/// Owner of the table, the directory and the debounce timer
pub struct SyncEngine {
    state: Mutex<SyncState>,
    store: Arc<dyn BackingStore>,
    consumer: Arc<dyn TableConsumer>,
    debouncer: Debouncer,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn BackingStore>,
        consumer: Arc<dyn TableConsumer>,
        runtime: Option<Handle>,
        delay: Duration,
    ) -> Arc<Self> {
        Arc::new(SyncEngine {
            state: Mutex::new(SyncState::new()),
            store,
            consumer,
            debouncer: Debouncer::new(runtime, delay),
        })
    }

    /// Lock the shared state
    ///
    /// The guard must not be held across calls back into the engine.
    pub fn state(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock()
    }

    pub fn store(&self) -> &dyn BackingStore {
        &*self.store
    }

    /// Whether a debounced decode or re-pull is scheduled
    pub fn is_pending(&self) -> bool {
        self.debouncer.is_pending()
    }

    /// Reload the table from the backing store
    ///
    /// Returns `false` when the store is unreadable, the header is short, the
    /// declared size is too large, or the version gate rejects the image. The
    /// directory entry is left exactly as it was in every failure case.
    pub fn agent_synchronize_data(self: &Arc<Self>) -> bool {
        match self.try_synchronize() {
            Ok(report) => {
                info!(
                    version = %report.entry_point.version,
                    size = report.header.data_size,
                    copied = report.copied,
                    "SMBIOS table synchronized"
                );
                true
            }
            Err(e) => {
                error!(error = %e, "Agent data sync failed");
                false
            }
        }
    }

    /// Reload the table, reporting why a pass failed
    pub fn try_synchronize(self: &Arc<Self>) -> std::result::Result<SyncReport, SyncError> {
        let report = {
            let mut state = self.state.lock();
            let SyncState {
                directory, table, ..
            } = &mut *state;
            let entry = &mut directory.entries[SMBIOS_DIR_INDEX];

            let prior = entry.stage;
            entry.stage = Stage::Updating;
            match load_image(&*self.store, table) {
                Ok(report) => {
                    entry.mark_loaded(
                        u32::from(report.header.dir_version),
                        report.header.timestamp,
                        report.header.data_size,
                    );
                    report
                }
                Err(e) => {
                    entry.stage = prior;
                    return Err(e);
                }
            }
        };

        self.schedule(PendingAction::Decode);
        Ok(report)
    }

    /// Record a new size for `id_index` and schedule a fresh pull
    ///
    /// Returns the entry's data set size, data version and timestamp as they
    /// were before the call.
    pub fn synchronize_directory_common_data(
        self: &Arc<Self>,
        id_index: usize,
        size: u32,
    ) -> Result<CommonData> {
        let previous = {
            let mut state = self.state.lock();
            let entry = state.directory.entry_mut(id_index).ok_or_else(|| {
                error!(id_index, "Synchronize common data failed - index out of range");
                MdrError::invalid(format!(
                    "id index {} out of range (max {})",
                    id_index, MAX_DIR_ENTRIES
                ))
            })?;
            entry.size = size;
            CommonData {
                data_set_size: entry.data_set_size,
                data_version: entry.data_version,
                timestamp: entry.timestamp,
            }
        };

        self.schedule(PendingAction::Resync);
        Ok(previous)
    }

    /// Hand the current table to the consumer right away
    pub fn decode_now(&self) {
        let state = self.state.lock();
        debug!("Running decode pass");
        self.consumer.table_updated(&state.table);
    }

    fn schedule(self: &Arc<Self>, action: PendingAction) {
        let engine: Weak<SyncEngine> = Arc::downgrade(self);
        debug!(?action, delay = ?self.debouncer.delay(), "Arming debounce timer");
        self.debouncer.arm(move || {
            let Some(engine) = engine.upgrade() else {
                return;
            };
            match action {
                PendingAction::Decode => engine.decode_now(),
                PendingAction::Resync => {
                    engine.agent_synchronize_data();
                }
            }
        });
    }
}
