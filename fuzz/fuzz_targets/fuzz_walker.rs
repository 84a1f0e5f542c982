#![no_main]
use libfuzzer_sys::fuzz_target;
use smbios_mdr::core::walker;
use smbios_mdr::{ByteTable, Inventory, MemoryDevice, MAX_ENTRY_COUNT};

fuzz_target!(|data: &[u8]| {
    let mut walked = 0;
    for s in walker::structures(data) {
        walked += 1;
        let _ = s.strings();
        let _ = s.string_at(4);
        let _ = s.dword(s.length() as usize);
        let _ = MemoryDevice::decode(&s);
    }
    assert!(walked <= MAX_ENTRY_COUNT);

    if let Some(&ty) = data.first() {
        assert!(walker::count_of_type(data, ty, 0) <= MAX_ENTRY_COUNT);
        let _ = walker::nth_of_type(data, ty, data.len() % 300);
    }

    let table = ByteTable::from_bytes(data);
    let _ = Inventory::collect(&table);
    assert!(MemoryDevice::collect(&table).len() <= MAX_ENTRY_COUNT);
});
