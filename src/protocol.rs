//! MDR V2 directory protocol
//!
//! [`MdrV2`] is the service object a transport binds to. Every verb validates
//! its input before touching state and fails with one of the three
//! [`MdrError`] kinds; synchronization failures surface only as `false`.

use crate::config::MdrConfig;
use crate::core::directory::{
    DataId, Directory, DirectoryEntry, DATA_ID_LEN, MAX_DIR_ENTRIES, MDR2_VERSION,
    SMBIOS_DIR_INDEX,
};
use crate::core::entry_point::{self, EntryPoint};
use crate::core::inventory::{MemoryDevice, TableConsumer, MEMORY_DEVICE};
use crate::core::store::{BackingStore, FileStore};
use crate::core::sync::{CommonData, SyncEngine};
use crate::core::table::ByteTable;
use crate::error::{MdrError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

/// MDR V2 service
pub struct MdrV2 {
    engine: Arc<SyncEngine>,
}

impl MdrV2 {
    /// Create the service and pull the current table
    ///
    /// A failed initial pull is logged and otherwise ignored; the directory
    /// stays in `Init` until the agent pushes a usable image. Debounced work
    /// runs on `runtime`, or inline when there is none.
    pub fn new(
        store: Arc<dyn BackingStore>,
        consumer: Arc<dyn TableConsumer>,
        runtime: Option<Handle>,
        debounce: Duration,
    ) -> Self {
        let engine = SyncEngine::new(store, consumer, runtime, debounce);
        if !engine.agent_synchronize_data() {
            warn!("Initial SMBIOS synchronization failed, waiting for agent push");
        }
        MdrV2 { engine }
    }

    /// Service reading the configured store file, on the ambient runtime if any
    pub fn from_config(config: &MdrConfig, consumer: Arc<dyn TableConsumer>) -> Self {
        info!(
            store = %config.store_path.display(),
            debounce = ?config.debounce,
            "Starting MDR V2 service"
        );
        Self::new(
            Arc::new(FileStore::new(&config.store_path)),
            consumer,
            Handle::try_current().ok(),
            config.debounce,
        )
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    /// Snapshot of the directory
    pub fn directory(&self) -> Directory {
        self.engine.state().directory.clone()
    }

    /// Borrow the current table read-only
    pub fn with_table<R>(&self, f: impl FnOnce(&ByteTable) -> R) -> R {
        let state = self.engine.state();
        f(&state.table)
    }

    /// Entry point of the current table, if it has one
    pub fn table_entry_point(&self) -> Option<EntryPoint> {
        self.with_table(|table| entry_point::locate(table.as_bytes()).ok())
    }

    /// Whether a decode or re-pull is waiting on the debounce timer
    pub fn is_pending(&self) -> bool {
        self.engine.is_pending()
    }

    /// Directory listing starting at `dir_index`
    ///
    /// Layout: protocol version, directory version, returned entries,
    /// remaining entries, then one 16-byte id per returned entry.
    pub fn get_directory_information(&self, dir_index: u8) -> Result<Vec<u8>> {
        if !self.engine.store().is_readable() {
            error!("Get directory information failed - backing store unreadable");
            return Err(MdrError::invalid("backing store unreadable"));
        }

        let state = self.engine.state();
        let directory = &state.directory;
        if dir_index > directory.dir_entries {
            error!(
                dir_index,
                entries = directory.dir_entries,
                "Get directory information failed - index out of range"
            );
            return Err(MdrError::invalid(format!(
                "directory index {} beyond {} entries",
                dir_index, directory.dir_entries
            )));
        }

        let returned = directory.dir_entries - dir_index;
        let end = usize::from(dir_index) + usize::from(returned);
        let remaining = if end >= usize::from(directory.dir_entries) {
            0
        } else {
            directory.dir_entries - dir_index - returned
        };

        let mut response = vec![MDR2_VERSION, directory.dir_version, returned, remaining];
        let ids = directory.populated().get(usize::from(dir_index)..).unwrap_or(&[]);
        for entry in ids {
            response.extend_from_slice(entry.id.as_bytes());
        }
        Ok(response)
    }

    /// Metadata for one entry
    ///
    /// Layout: protocol version, 16-byte id, validity flag, size (big-endian
    /// u32), low byte of the data version, timestamp (big-endian u32).
    pub fn get_data_information(&self, id_index: u8) -> Result<Vec<u8>> {
        let state = self.engine.state();
        let entry = checked_entry(&state.directory, id_index, "Get data information")?;

        let mut response = Vec::with_capacity(1 + DATA_ID_LEN + 1 + 4 + 1 + 4);
        response.push(MDR2_VERSION);
        response.extend_from_slice(entry.id.as_bytes());
        response.push(entry.validity() as u8);
        response.extend_from_slice(&entry.size.to_be_bytes());
        response.push(entry.data_version as u8);
        response.extend_from_slice(&entry.timestamp.to_be_bytes());
        Ok(response)
    }

    /// Identity of the SMBIOS region, if an agent may push to it now
    pub fn get_data_offer(&self) -> Result<Vec<u8>> {
        let state = self.engine.state();
        let entry = &state.directory.entries[SMBIOS_DIR_INDEX];
        if !entry.available_for_update() {
            error!(stage = ?entry.stage, lock = ?entry.lock, "SMBIOS is not ready for update");
            return Err(MdrError::UpdateInProgress);
        }
        Ok(entry.id.as_bytes().to_vec())
    }

    /// Accept a page of the agent's directory
    ///
    /// Returns whether the exchange is complete. An unchanged directory version
    /// completes it without touching anything, so a page reaching past the end
    /// of the directory is rejected only when it would be applied.
    pub fn send_directory_information(
        &self,
        dir_version: u8,
        dir_index: u8,
        returned_entries: u8,
        remaining_entries: u8,
        dir_entry: &[u8],
    ) -> Result<bool> {
        let start = usize::from(dir_index);
        let count = usize::from(returned_entries);
        if start >= MAX_DIR_ENTRIES || count < 1 {
            error!(
                dir_index,
                returned_entries,
                "Send directory information failed - input parameter invalid"
            );
            return Err(MdrError::invalid("directory index or entry count out of range"));
        }
        if count * DATA_ID_LEN != dir_entry.len() {
            error!(
                returned_entries,
                len = dir_entry.len(),
                "Send directory information failed - directory size invalid"
            );
            return Err(MdrError::invalid(format!(
                "{} entries need {} bytes, got {}",
                count,
                count * DATA_ID_LEN,
                dir_entry.len()
            )));
        }

        let mut state = self.engine.state();
        let directory = &mut state.directory;
        if dir_version == directory.dir_version {
            debug!(dir_version, "Directory already synchronized");
            return Ok(true);
        }

        if start + count > MAX_DIR_ENTRIES {
            error!(
                dir_index,
                returned_entries,
                "Send directory information failed - entries overflow directory"
            );
            return Err(MdrError::invalid(format!(
                "entries {}..{} exceed directory size {}",
                start,
                start + count,
                MAX_DIR_ENTRIES
            )));
        }

        for (entry, id) in directory.entries[start..start + count]
            .iter_mut()
            .zip(dir_entry.chunks_exact(DATA_ID_LEN))
        {
            entry.id.0.copy_from_slice(id);
        }
        directory.dir_entries = returned_entries;

        let terminate = remaining_entries == 0;
        if terminate {
            directory.dir_version = dir_version;
        }
        info!(
            dir_version,
            dir_index,
            returned_entries,
            remaining_entries,
            terminate,
            "Directory information received"
        );
        Ok(terminate)
    }

    /// Record agent-announced metadata for one entry
    ///
    /// `flag` is accepted for wire compatibility and ignored. Returns whether
    /// any field changed.
    pub fn send_data_information(
        &self,
        id_index: u8,
        _flag: u8,
        data_len: u32,
        data_version: u32,
        timestamp: u32,
    ) -> Result<bool> {
        let mut state = self.engine.state();
        if usize::from(id_index) >= MAX_DIR_ENTRIES {
            error!(id_index, "Send data information failed - index out of range");
            return Err(MdrError::invalid(format!("id index {} out of range", id_index)));
        }
        let entry = &mut state.directory.entries[usize::from(id_index)];
        let changed = entry.apply_data_information(data_len, data_version, timestamp);
        debug!(
            id_index,
            data_len,
            data_version,
            timestamp,
            changed,
            "Data information received"
        );
        Ok(changed)
    }

    /// Index of the populated entry carrying `id`
    pub fn find_id_index(&self, id: &[u8]) -> Result<usize> {
        let Some(id) = DataId::from_slice(id) else {
            error!(len = id.len(), "Length of data id invalid");
            return Err(MdrError::InvalidId);
        };
        let state = self.engine.state();
        state.directory.find(&id).ok_or_else(|| {
            error!(?id, "Data id not found");
            MdrError::InvalidId
        })
    }

    /// Published entry count
    ///
    /// `value` is ignored: the count is 0 while the store is unreadable and the
    /// directory's entry count otherwise.
    pub fn directory_entries(&self, _value: u8) -> u8 {
        let readable = self.engine.store().is_readable();
        let mut state = self.engine.state();
        let value = if readable {
            state.directory.dir_entries
        } else {
            error!("Directory entries unavailable - backing store unreadable");
            0
        };
        state.published_entries = value;
        value
    }

    /// Reload the table from the backing store
    pub fn agent_synchronize_data(&self) -> bool {
        self.engine.agent_synchronize_data()
    }

    /// Record a new size for `id_index` and schedule a fresh pull
    ///
    /// Returns the data set size, data version and timestamp from before the
    /// call.
    pub fn synchronize_directory_common_data(
        &self,
        id_index: u8,
        size: u32,
    ) -> Result<CommonData> {
        self.engine.synchronize_directory_common_data(usize::from(id_index), size)
    }

    /// Decoded records of one structure type from the current table
    ///
    /// Only memory devices (type 17) are supported; structures shorter than a
    /// full memory device record are skipped.
    pub fn get_record_type(&self, record_type: u8) -> Result<Vec<MemoryDevice>> {
        if record_type != MEMORY_DEVICE {
            error!(record_type, "Get record type failed - unsupported record type");
            return Err(MdrError::invalid(format!("record type {} not supported", record_type)));
        }
        let records = self.with_table(MemoryDevice::collect);
        debug!(record_type, count = records.len(), "Collected records");
        Ok(records)
    }
}

fn checked_entry<'a>(
    directory: &'a Directory,
    id_index: u8,
    verb: &str,
) -> Result<&'a DirectoryEntry> {
    directory.entry(usize::from(id_index)).ok_or_else(|| {
        error!(id_index, "{} failed - index out of range", verb);
        MdrError::invalid(format!("id index {} out of range", id_index))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::directory::{LockState, Stage, ValidityFlag, SMBIOS_TABLE_ID};
    use crate::core::entry_point::{EntryPointKind, SmbiosVersion};
    use crate::core::store::{MemoryStore, StoreHeader};

    fn noop() -> Arc<dyn TableConsumer> {
        Arc::new(|_: &ByteTable| {})
    }

    fn valid_image() -> Vec<u8> {
        let mut data = vec![127, 4, 0, 0, 0, 0, 0, 0, 0, 0];
        data.extend(entry_point::encode(EntryPointKind::Smbios30, SmbiosVersion::new(3, 2)));
        StoreHeader::encode_image(3, 0x0102_0304, &data)
    }

    fn service(store: &MemoryStore) -> MdrV2 {
        MdrV2::new(Arc::new(store.clone()), noop(), None, Duration::from_millis(5))
    }

    #[test]
    fn test_initial_sync() {
        let store = MemoryStore::with_image(valid_image());
        let mdr = service(&store);
        let entry = mdr.directory().entries[0];
        assert_eq!(entry.stage, Stage::Loaded);
        assert_eq!(entry.data_version, 3);
        assert_eq!(mdr.table_entry_point().unwrap().version, SmbiosVersion::new(3, 2));
    }

    #[test]
    fn test_initial_sync_failure_is_not_fatal() {
        let store = MemoryStore::new();
        let mdr = service(&store);
        assert_eq!(mdr.directory().entries[0].stage, Stage::Init);
        assert_eq!(mdr.get_data_offer().unwrap(), SMBIOS_TABLE_ID.as_bytes().to_vec());
    }

    #[test]
    fn test_get_directory_information() {
        let store = MemoryStore::with_image(valid_image());
        let mdr = service(&store);

        let response = mdr.get_directory_information(0).unwrap();
        assert_eq!(&response[..4], &[MDR2_VERSION, 1, 1, 0]);
        assert_eq!(&response[4..], SMBIOS_TABLE_ID.as_bytes());

        let response = mdr.get_directory_information(1).unwrap();
        assert_eq!(response, vec![MDR2_VERSION, 1, 0, 0]);

        assert!(matches!(
            mdr.get_directory_information(2),
            Err(MdrError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_get_directory_information_store_unreadable() {
        let store = MemoryStore::with_image(valid_image());
        let mdr = service(&store);
        store.clear();
        assert!(matches!(
            mdr.get_directory_information(0),
            Err(MdrError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_get_data_information_layout() {
        let store = MemoryStore::with_image(valid_image());
        let mdr = service(&store);

        let response = mdr.get_data_information(0).unwrap();
        assert_eq!(response.len(), 27);
        assert_eq!(response[0], MDR2_VERSION);
        assert_eq!(&response[1..17], SMBIOS_TABLE_ID.as_bytes());
        assert_eq!(response[17], ValidityFlag::Valid as u8);
        assert_eq!(&response[18..22], &34u32.to_be_bytes());
        assert_eq!(response[22], 3);
        assert_eq!(&response[23..27], &[1, 2, 3, 4]);

        assert!(mdr.get_data_information(3).is_ok());
        assert!(matches!(
            mdr.get_data_information(4),
            Err(MdrError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_data_offer_refused_while_locked() {
        let store = MemoryStore::with_image(valid_image());
        let mdr = service(&store);
        mdr.engine().state().directory.entries[0].lock = LockState::Locked;
        assert_eq!(mdr.get_data_offer(), Err(MdrError::UpdateInProgress));
    }

    #[test]
    fn test_send_directory_information() {
        let store = MemoryStore::with_image(valid_image());
        let mdr = service(&store);
        let ids: Vec<u8> = (0..32).collect();

        // first page of two
        assert_eq!(mdr.send_directory_information(5, 0, 2, 1, &ids), Ok(false));
        let directory = mdr.directory();
        assert_eq!(directory.dir_entries, 2);
        assert_eq!(directory.dir_version, 1);
        assert_eq!(&directory.entries[1].id.as_bytes()[..], &ids[16..]);

        // last page
        assert_eq!(mdr.send_directory_information(5, 2, 1, 0, &[7; 16]), Ok(true));
        assert_eq!(mdr.directory().dir_version, 5);
        assert_eq!(mdr.directory().entries[2].id, DataId([7; 16]));
    }

    #[test]
    fn test_send_directory_information_same_version() {
        let store = MemoryStore::with_image(valid_image());
        let mdr = service(&store);
        let before = mdr.directory();
        assert_eq!(mdr.send_directory_information(1, 0, 1, 3, &[9; 16]), Ok(true));
        assert_eq!(mdr.directory(), before);
    }

    #[test]
    fn test_send_directory_information_rejects() {
        let store = MemoryStore::with_image(valid_image());
        let mdr = service(&store);
        let before = mdr.directory();

        assert!(mdr.send_directory_information(2, 4, 1, 0, &[0; 16]).is_err());
        assert!(mdr.send_directory_information(2, 0, 0, 0, &[]).is_err());
        assert!(mdr.send_directory_information(2, 0, 1, 0, &[0; 15]).is_err());
        assert!(mdr.send_directory_information(2, 3, 2, 0, &[0; 32]).is_err());
        assert_eq!(mdr.directory(), before);
    }

    #[test]
    fn test_same_version_page_past_directory_end() {
        let store = MemoryStore::with_image(valid_image());
        let mdr = service(&store);
        let before = mdr.directory();

        assert_eq!(mdr.send_directory_information(1, 3, 2, 0, &[0; 32]), Ok(true));
        assert_eq!(mdr.send_directory_information(1, 3, 200, 0, &[0; 3200]), Ok(true));
        assert_eq!(mdr.directory(), before);

        // the size checks still come first
        assert!(matches!(
            mdr.send_directory_information(1, 3, 2, 0, &[0; 16]),
            Err(MdrError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_get_record_type() {
        let store = MemoryStore::with_image(valid_image());
        let mdr = service(&store);
        assert_eq!(mdr.get_record_type(MEMORY_DEVICE), Ok(vec![]));

        let mut dimm = vec![MEMORY_DEVICE, 0x54, 0x00, 0x11];
        dimm.resize(0x54, 0);
        dimm[0x0C..0x0E].copy_from_slice(&8192u16.to_le_bytes());
        dimm[0x10] = 1;
        dimm.extend_from_slice(b"DIMM_A1\0\0");
        mdr.engine().state().table.fill(&dimm);

        let records = mdr.get_record_type(MEMORY_DEVICE).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].handle, 0x1100);
        assert_eq!(records[0].size, 8192);
        assert_eq!(records[0].device_locator, "DIMM_A1");

        assert!(matches!(
            mdr.get_record_type(4),
            Err(MdrError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_send_data_information() {
        let store = MemoryStore::with_image(valid_image());
        let mdr = service(&store);

        assert_eq!(mdr.send_data_information(0, 0xFF, 4096, 3, 0x0102_0304), Ok(true));
        assert_eq!(mdr.directory().entries[0].stage, Stage::Updated);
        assert_eq!(mdr.send_data_information(0, 0, 4096, 3, 0x0102_0304), Ok(false));
        assert!(matches!(
            mdr.send_data_information(4, 0, 1, 1, 1),
            Err(MdrError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_find_id_index() {
        let store = MemoryStore::with_image(valid_image());
        let mdr = service(&store);
        assert_eq!(mdr.find_id_index(SMBIOS_TABLE_ID.as_bytes()), Ok(0));
        assert_eq!(mdr.find_id_index(&[0; 16]), Err(MdrError::InvalidId));
        assert_eq!(mdr.find_id_index(&[0; 4]), Err(MdrError::InvalidId));
    }

    #[test]
    fn test_directory_entries() {
        let store = MemoryStore::with_image(valid_image());
        let mdr = service(&store);
        assert_eq!(mdr.directory_entries(42), 1);
        store.clear();
        assert_eq!(mdr.directory_entries(42), 0);
        assert_eq!(mdr.engine().state().published_entries, 0);
    }
}
