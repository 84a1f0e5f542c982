#![no_main]
use libfuzzer_sys::fuzz_target;
use smbios_mdr::{ByteTable, MdrV2, MemoryStore};
use std::sync::Arc;
use std::time::Duration;

// Arbitrary store images must never panic, and a rejected image never
// changes the directory
fuzz_target!(|image: Vec<u8>| {
    let store = MemoryStore::new();
    let mdr = MdrV2::new(
        Arc::new(store.clone()),
        Arc::new(|_: &ByteTable| {}),
        None,
        Duration::from_millis(1),
    );

    let before = mdr.directory();
    store.replace(image);
    if !mdr.agent_synchronize_data() {
        assert_eq!(mdr.directory(), before);
    } else if let Some(entry_point) = mdr.table_entry_point() {
        assert!(entry_point.version.is_supported());
    }
});
