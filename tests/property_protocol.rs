//! Property-based tests for protocol verbs and table walking
//!
//! Uses proptest to check pagination, input guards and walk bounds across
//! random inputs

use proptest::prelude::*;
use smbios_mdr::core::walker;
use smbios_mdr::{
    ByteTable, MdrError, MdrV2, MemoryStore, StoreHeader, MAX_DIR_ENTRIES, MAX_ENTRY_COUNT,
};
use std::sync::Arc;
use std::time::Duration;

fn service() -> (MdrV2, MemoryStore) {
    // readable but unsynchronizable: the directory stays at its initial state
    let store = MemoryStore::with_image(StoreHeader::encode_image(1, 0, &[]));
    let mdr = MdrV2::new(
        Arc::new(store.clone()),
        Arc::new(|_: &ByteTable| {}),
        None,
        Duration::from_millis(1),
    );
    (mdr, store)
}

/// Install `entries` ids in one complete page
fn populate(mdr: &MdrV2, entries: u8) {
    let ids: Vec<u8> = (0..entries as usize * 16).map(|b| b as u8).collect();
    assert_eq!(mdr.send_directory_information(9, 0, entries, 0, &ids), Ok(true));
}

proptest! {
    #[test]
    fn prop_directory_pagination(
        entries in 1u8..=MAX_DIR_ENTRIES as u8,
        dir_index in 0u8..8,
    ) {
        let (mdr, _store) = service();
        populate(&mdr, entries);

        match mdr.get_directory_information(dir_index) {
            Ok(response) => {
                prop_assert!(dir_index <= entries);
                let returned = response[2];
                prop_assert_eq!(returned, entries - dir_index);
                prop_assert_eq!(response[3], 0);
                prop_assert_eq!(response.len(), 4 + returned as usize * 16);
            }
            Err(e) => {
                prop_assert!(dir_index > entries);
                prop_assert!(matches!(e, MdrError::InvalidParameter(_)));
            }
        }
    }

    #[test]
    fn prop_length_guard(
        dir_index in 0u8..MAX_DIR_ENTRIES as u8,
        returned in 1u8..=8,
        len in 0usize..160,
        remaining in any::<u8>(),
    ) {
        prop_assume!(len != returned as usize * 16);
        let (mdr, _store) = service();
        let before = mdr.directory();

        let ids = vec![0xA5; len];
        let result = mdr.send_directory_information(2, dir_index, returned, remaining, &ids);
        prop_assert!(matches!(result, Err(MdrError::InvalidParameter(_))));
        prop_assert_eq!(mdr.directory(), before);
    }

    #[test]
    fn prop_same_version_is_noop(
        dir_index in 0u8..MAX_DIR_ENTRIES as u8,
        returned in 1u8..=u8::MAX,
        remaining in any::<u8>(),
        fill in any::<u8>(),
    ) {
        let (mdr, _store) = service();
        let before = mdr.directory();
        let ids = vec![fill; returned as usize * 16];

        let result = mdr.send_directory_information(
            before.dir_version,
            dir_index,
            returned,
            remaining,
            &ids,
        );
        prop_assert_eq!(result, Ok(true));
        prop_assert_eq!(mdr.directory(), before);
    }

    #[test]
    fn prop_index_bounds(id_index in MAX_DIR_ENTRIES as u8..=u8::MAX, value in any::<u32>()) {
        let (mdr, _store) = service();
        prop_assert!(matches!(
            mdr.get_data_information(id_index),
            Err(MdrError::InvalidParameter(_))
        ));
        prop_assert!(matches!(
            mdr.send_data_information(id_index, 0, value, value, value),
            Err(MdrError::InvalidParameter(_))
        ));
        prop_assert!(matches!(
            mdr.synchronize_directory_common_data(id_index, value),
            Err(MdrError::InvalidParameter(_))
        ));
    }

    #[test]
    fn prop_find_id_rejects_bad_length(id in prop::collection::vec(any::<u8>(), 0..40)) {
        prop_assume!(id.len() != 16);
        let (mdr, _store) = service();
        prop_assert_eq!(mdr.find_id_index(&id), Err(MdrError::InvalidId));
    }

    #[test]
    fn prop_walk_terminates(
        buf in prop::collection::vec(any::<u8>(), 0..2048),
        ty in any::<u8>(),
    ) {
        let count = walker::count_of_type(&buf, ty, 0);
        prop_assert!(count <= MAX_ENTRY_COUNT);
        prop_assert!(walker::structures(&buf).count() <= MAX_ENTRY_COUNT);

        let mut last = None;
        for s in walker::structures(&buf) {
            if let Some(prev) = last {
                prop_assert!(s.offset() > prev);
            }
            last = Some(s.offset());
            let _ = s.strings();
        }
    }
}

#[test]
fn test_repeating_structures_stop_at_bound() {
    // every structure is type 17 with an empty string set
    let mut buf = Vec::new();
    for handle in 0..1000u16 {
        buf.extend_from_slice(&[17, 4]);
        buf.extend_from_slice(&handle.to_le_bytes());
        buf.extend_from_slice(&[0, 0]);
    }
    let table = ByteTable::from_bytes(&buf);

    assert_eq!(table.count_of_type(17, 0), MAX_ENTRY_COUNT);
    assert_eq!(table.structures_of_type(17).count(), MAX_ENTRY_COUNT);
    assert!(table.nth_of_type(17, MAX_ENTRY_COUNT).is_none());
    assert_eq!(table.structures().count(), MAX_ENTRY_COUNT);
    assert!(table.by_handle(MAX_ENTRY_COUNT as u16 - 1).is_some());
    assert!(table.by_handle(MAX_ENTRY_COUNT as u16).is_none());
    assert_eq!(table.records_of_type(17, 0).len(), MAX_ENTRY_COUNT);
}
