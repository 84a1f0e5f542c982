//! MDR V2 directory: per-region metadata and its state machine
//!
//! Each directory entry names one data region by a 16-byte identity and tracks
//! its size, version, timestamp, lifecycle stage and protocol lock. Only entry
//! 0 (the SMBIOS table) is populated today, but every verb is index-addressed
//! up to [`MAX_DIR_ENTRIES`].

use serde::Serialize;

/// Number of addressable directory entries
pub const MAX_DIR_ENTRIES: usize = 4;

/// Size of a data identity in bytes
pub const DATA_ID_LEN: usize = 16;

/// MDR protocol version reported in every response
pub const MDR2_VERSION: u8 = 2;

/// Version of the local agent
pub const AGENT_VERSION: u8 = 1;

/// Directory index of the SMBIOS table region
pub const SMBIOS_DIR_INDEX: usize = 0;

/// Identity of the SMBIOS table region
pub const SMBIOS_TABLE_ID: DataId = DataId([
    40, 41, 42, 43, 44, 45, 46, 47, 48, 49, 50, 51, 52, 53, 54, 0x42,
]);

/// 16-byte region identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct DataId(pub [u8; DATA_ID_LEN]);

impl DataId {
    /// Parse an identity from exactly 16 bytes
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let id: [u8; DATA_ID_LEN] = bytes.try_into().ok()?;
        Some(DataId(id))
    }

    pub fn as_bytes(&self) -> &[u8; DATA_ID_LEN] {
        &self.0
    }
}

/// Lifecycle stage of a region's content
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Stage {
    #[default]
    Init = 0,
    Loaded = 1,
    Updated = 2,
    Updating = 3,
}

/// Protocol-level lock between the pushing agent and local readers
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum LockState {
    #[default]
    Unlocked = 0,
    Locked = 1,
}

/// Validity byte reported by `get_data_information`
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ValidityFlag {
    Invalid = 0,
    Valid = 1,
    Locked = 2,
}

/// Metadata for one region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DirectoryEntry {
    pub id: DataId,
    /// Size of the currently loaded content
    pub size: u32,
    /// Size announced by the agent for the next push
    pub data_set_size: u32,
    pub data_version: u32,
    pub timestamp: u32,
    pub stage: Stage,
    pub lock: LockState,
}

impl DirectoryEntry {
    /// Whether an agent may start pushing new content into this region
    ///
    /// `Init` regions are offered regardless of lock state.
    pub fn available_for_update(&self) -> bool {
        match self.stage {
            Stage::Updating => false,
            Stage::Init => true,
            Stage::Loaded | Stage::Updated => self.lock == LockState::Unlocked,
        }
    }

    pub fn validity(&self) -> ValidityFlag {
        match (self.stage, self.lock) {
            (Stage::Loaded | Stage::Updated, LockState::Locked) => ValidityFlag::Locked,
            (Stage::Loaded | Stage::Updated, LockState::Unlocked) => ValidityFlag::Valid,
            (Stage::Updating | Stage::Init, _) => ValidityFlag::Invalid,
        }
    }

    /// Record a successful load of `size` bytes
    pub(crate) fn mark_loaded(&mut self, data_version: u32, timestamp: u32, size: u32) {
        self.data_version = data_version;
        self.timestamp = timestamp;
        self.size = size;
        self.stage = Stage::Loaded;
        self.lock = LockState::Unlocked;
    }

    /// Apply agent-pushed metadata, returning whether anything changed
    ///
    /// A loaded region whose metadata changes without a reload moves to
    /// `Updated`.
    pub(crate) fn apply_data_information(
        &mut self,
        data_len: u32,
        data_version: u32,
        timestamp: u32,
    ) -> bool {
        let mut changed = false;
        if self.data_set_size != data_len {
            self.data_set_size = data_len;
            changed = true;
        }
        if self.data_version != data_version {
            self.data_version = data_version;
            changed = true;
        }
        if self.timestamp != timestamp {
            self.timestamp = timestamp;
            changed = true;
        }
        if changed && matches!(self.stage, Stage::Loaded | Stage::Updated) {
            self.stage = Stage::Updated;
        }
        changed
    }
}

/// The local directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Directory {
    pub agent_version: u8,
    pub dir_version: u8,
    /// Number of populated entries
    pub dir_entries: u8,
    pub status: u8,
    pub remote_dir_version: u8,
    pub entries: [DirectoryEntry; MAX_DIR_ENTRIES],
}

impl Directory {
    /// Directory as it stands at process start: one SMBIOS entry in `Init`
    pub fn new() -> Self {
        let mut entries = [DirectoryEntry::default(); MAX_DIR_ENTRIES];
        entries[SMBIOS_DIR_INDEX].id = SMBIOS_TABLE_ID;
        Directory {
            agent_version: AGENT_VERSION,
            dir_version: 1,
            dir_entries: 1,
            status: 1,
            remote_dir_version: 0,
            entries,
        }
    }

    pub fn entry(&self, index: usize) -> Option<&DirectoryEntry> {
        self.entries.get(index)
    }

    pub fn entry_mut(&mut self, index: usize) -> Option<&mut DirectoryEntry> {
        self.entries.get_mut(index)
    }

    /// Populated entries, clamped to the addressable range
    pub fn populated(&self) -> &[DirectoryEntry] {
        let count = (self.dir_entries as usize).min(MAX_DIR_ENTRIES);
        &self.entries[..count]
    }

    /// Index of the first populated entry whose identity is `id`
    pub fn find(&self, id: &DataId) -> Option<usize> {
        self.populated().iter().position(|entry| entry.id == *id)
    }
}

impl Default for Directory {
    fn default() -> Self {
        Self::new()
    }
}
