//! SMBIOS MDR V2 core
//!
//! Everything below the protocol surface:
//!
//! - [`table`] - fixed-capacity table storage
//! - [`walker`] - structure location by type, index and handle
//! - [`strings`] - string-set resolution
//! - [`entry_point`] - anchor detection and the version gate
//! - [`directory`] - directory entries and their state machine
//! - [`store`] - backing store images and their header
//! - [`debounce`] - re-armable timer
//! - [`sync`] - the synchronization engine
//! - [`inventory`] - decode-pass consumers

pub mod debounce;
pub mod directory;
pub mod entry_point;
pub mod inventory;
pub mod store;
pub mod strings;
pub mod sync;
pub mod table;
pub mod walker;
