//! Decode-pass consumers
//!
//! [`TableConsumer`] is the seam between the synchronization engine and the
//! entity decoders: after every debounced reload the consumer borrows the
//! table read-only and walks it. [`InventoryCollector`] is the built-in
//! consumer, summarizing the structures a BMC inventory cares about.

use crate::core::table::ByteTable;
use crate::core::walker::Structure;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info};

pub const BIOS_INFORMATION: u8 = 0;
pub const SYSTEM_INFORMATION: u8 = 1;
pub const BASEBOARD_INFORMATION: u8 = 2;
pub const PROCESSOR_INFORMATION: u8 = 4;
pub const SYSTEM_SLOTS: u8 = 9;
pub const MEMORY_DEVICE: u8 = 17;
pub const TPM_DEVICE: u8 = 43;
pub const FIRMWARE_INVENTORY: u8 = 45;

/// Offset of the slot type byte in a system slots structure
const SLOT_TYPE_OFFSET: usize = 5;

/// Shortest memory device structure [`MemoryDevice::decode`] accepts, through
/// the logical size field
pub const MEMORY_DEVICE_MIN_LENGTH: u8 = 0x54;

/// Receives the table after each debounced reload
///
/// Implementations run with the engine's state locked and must not call back
/// into the engine.
pub trait TableConsumer: Send + Sync {
    fn table_updated(&self, table: &ByteTable);
}

impl<F> TableConsumer for F
where
    F: Fn(&ByteTable) + Send + Sync,
{
    fn table_updated(&self, table: &ByteTable) {
        self(table)
    }
}

/// Whether a system slot type code denotes a PCI Express slot
pub fn is_pcie_slot_type(slot_type: u8) -> bool {
    matches!(slot_type, 0x1F..=0x28 | 0xA5..=0xB6 | 0xB8..=0xC6)
}

/// Firmware component from a type 45 structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FirmwareComponent {
    pub name: String,
    pub version: String,
}

/// Memory device record from a type 17 structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MemoryDevice {
    pub structure_type: u8,
    pub length: u8,
    pub handle: u16,
    pub physical_memory_array_handle: u16,
    pub memory_error_information_handle: u16,
    pub total_width: u16,
    pub data_width: u16,
    pub size: u16,
    pub form_factor: u8,
    pub device_set: u8,
    pub device_locator: String,
    pub bank_locator: String,
    pub memory_type: u8,
    pub type_detail: u16,
    pub speed: u16,
    pub manufacturer: String,
    pub serial_number: String,
    pub asset_tag: String,
    pub part_number: String,
    pub attributes: u8,
    pub extended_size: u32,
    pub configured_memory_speed: u16,
    pub minimum_voltage: u16,
    pub maximum_voltage: u16,
    pub configured_voltage: u16,
    pub memory_technology: u8,
    pub memory_operating_mode_capability: u16,
    pub firmware_version: String,
    pub module_manufacturer_id: u16,
    pub module_product_id: u16,
    pub memory_subsystem_controller_manufacturer_id: u16,
    pub memory_subsystem_controller_product_id: u16,
    pub non_volatile_size: u64,
    pub volatile_size: u64,
    pub cache_size: u64,
    pub logical_size: u64,
}

impl MemoryDevice {
    /// Decode a memory device structure
    ///
    /// `None` unless `s` is a type 17 structure at least
    /// [`MEMORY_DEVICE_MIN_LENGTH`] bytes long.
    pub fn decode(s: &Structure<'_>) -> Option<Self> {
        if s.structure_type() != MEMORY_DEVICE || s.length() < MEMORY_DEVICE_MIN_LENGTH {
            return None;
        }
        Some(MemoryDevice {
            structure_type: s.structure_type(),
            length: s.length(),
            handle: s.handle(),
            physical_memory_array_handle: s.word(0x04)?,
            memory_error_information_handle: s.word(0x06)?,
            total_width: s.word(0x08)?,
            data_width: s.word(0x0A)?,
            size: s.word(0x0C)?,
            form_factor: s.byte(0x0E)?,
            device_set: s.byte(0x0F)?,
            device_locator: s.string_at(0x10),
            bank_locator: s.string_at(0x11),
            memory_type: s.byte(0x12)?,
            type_detail: s.word(0x13)?,
            speed: s.word(0x15)?,
            manufacturer: s.string_at(0x17),
            serial_number: s.string_at(0x18),
            asset_tag: s.string_at(0x19),
            part_number: s.string_at(0x1A),
            attributes: s.byte(0x1B)?,
            extended_size: s.dword(0x1C)?,
            configured_memory_speed: s.word(0x20)?,
            minimum_voltage: s.word(0x22)?,
            maximum_voltage: s.word(0x24)?,
            configured_voltage: s.word(0x26)?,
            memory_technology: s.byte(0x28)?,
            memory_operating_mode_capability: s.word(0x29)?,
            firmware_version: s.string_at(0x2B),
            module_manufacturer_id: s.word(0x2C)?,
            module_product_id: s.word(0x2E)?,
            memory_subsystem_controller_manufacturer_id: s.word(0x30)?,
            memory_subsystem_controller_product_id: s.word(0x32)?,
            non_volatile_size: s.qword(0x34)?,
            volatile_size: s.qword(0x3C)?,
            cache_size: s.qword(0x44)?,
            logical_size: s.qword(0x4C)?,
        })
    }

    /// Every full-length memory device record in `table`, in table order
    pub fn collect(table: &ByteTable) -> Vec<Self> {
        table
            .records_of_type(MEMORY_DEVICE, MEMORY_DEVICE_MIN_LENGTH)
            .iter()
            .filter_map(MemoryDevice::decode)
            .collect()
    }
}

/// Summary of one decode pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Inventory {
    pub bios_vendor: String,
    pub bios_version: String,
    pub system_manufacturer: String,
    pub system_product: String,
    pub baseboards: usize,
    pub processors: usize,
    pub memory_devices: usize,
    pub pcie_slots: usize,
    pub tpm_devices: usize,
    pub firmware: Vec<FirmwareComponent>,
}

impl Inventory {
    /// Walk `table` and summarize it
    pub fn collect(table: &ByteTable) -> Self {
        let mut inventory = Inventory {
            baseboards: table.count_of_type(BASEBOARD_INFORMATION, 0),
            processors: table.count_of_type(PROCESSOR_INFORMATION, 0),
            memory_devices: table.count_of_type(MEMORY_DEVICE, 0),
            tpm_devices: table.count_of_type(TPM_DEVICE, 0),
            ..Default::default()
        };

        if let Some(bios) = table.first_of_type(BIOS_INFORMATION, 0) {
            inventory.bios_vendor = bios.string_at(4);
            inventory.bios_version = bios.string_at(5);
        }
        if let Some(system) = table.first_of_type(SYSTEM_INFORMATION, 0) {
            inventory.system_manufacturer = system.string_at(4);
            inventory.system_product = system.string_at(5);
        }

        inventory.pcie_slots = table
            .structures_of_type(SYSTEM_SLOTS)
            .filter(|slot| slot.byte(SLOT_TYPE_OFFSET).is_some_and(is_pcie_slot_type))
            .count();

        inventory.firmware = table
            .structures_of_type(FIRMWARE_INVENTORY)
            .map(|s: Structure<'_>| FirmwareComponent {
                name: s.string_at(4),
                version: s.string_at(5),
            })
            .collect();

        inventory
    }
}

/// Consumer keeping the latest [`Inventory`]
pub struct InventoryCollector {
    latest: watch::Sender<Option<Inventory>>,
}

impl InventoryCollector {
    pub fn new() -> Self {
        let (latest, _) = watch::channel(None);
        InventoryCollector { latest }
    }

    /// Inventory from the most recent decode pass
    pub fn latest(&self) -> Option<Inventory> {
        self.latest.borrow().clone()
    }

    /// Receiver notified after every decode pass
    pub fn subscribe(&self) -> watch::Receiver<Option<Inventory>> {
        self.latest.subscribe()
    }
}

impl Default for InventoryCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl TableConsumer for InventoryCollector {
    fn table_updated(&self, table: &ByteTable) {
        let inventory = Inventory::collect(table);
        info!(
            processors = inventory.processors,
            memory_devices = inventory.memory_devices,
            pcie_slots = inventory.pcie_slots,
            firmware = inventory.firmware.len(),
            "Inventory updated"
        );
        debug!(?inventory, "Decoded inventory");
        self.latest.send_replace(Some(inventory));
    }
}
