#![no_main]
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use smbios_mdr::{ByteTable, MdrV2, MemoryStore, StoreHeader};
use std::sync::Arc;
use std::time::Duration;

#[derive(Arbitrary, Debug)]
enum Verb {
    GetDirectory(u8),
    GetData(u8),
    Offer,
    SendDirectory(u8, u8, u8, u8, Vec<u8>),
    SendData(u8, u8, u32, u32, u32),
    FindId(Vec<u8>),
    Entries(u8),
    CommonData(u8, u32),
}

fuzz_target!(|verbs: Vec<Verb>| {
    let store = MemoryStore::with_image(StoreHeader::encode_image(1, 0, &[]));
    let mdr = MdrV2::new(
        Arc::new(store),
        Arc::new(|_: &ByteTable| {}),
        None,
        Duration::from_millis(1),
    );

    for verb in verbs {
        match verb {
            Verb::GetDirectory(index) => {
                let _ = mdr.get_directory_information(index);
            }
            Verb::GetData(index) => {
                let _ = mdr.get_data_information(index);
            }
            Verb::Offer => {
                let _ = mdr.get_data_offer();
            }
            Verb::SendDirectory(version, index, returned, remaining, ids) => {
                let _ = mdr.send_directory_information(version, index, returned, remaining, &ids);
            }
            Verb::SendData(index, flag, len, version, timestamp) => {
                let _ = mdr.send_data_information(index, flag, len, version, timestamp);
            }
            Verb::FindId(id) => {
                let _ = mdr.find_id_index(&id);
            }
            Verb::Entries(value) => {
                let _ = mdr.directory_entries(value);
            }
            Verb::CommonData(index, size) => {
                let _ = mdr.synchronize_directory_common_data(index, size);
            }
        }
        assert!(mdr.directory().populated().len() <= smbios_mdr::MAX_DIR_ENTRIES);
    }
});
