//! Fixed-capacity storage for one SMBIOS table snapshot
//!
//! The table is only ever replaced wholesale: it is zeroed and refilled on each
//! synchronization pass. Decoders borrow it read-only through the walker.

use crate::core::walker::{self, Structure, Structures};

/// Capacity of the table storage region (64 KiB)
pub const TABLE_CAPACITY: usize = 64 * 1024;

/// Raw SMBIOS table image
///
/// The layout is the raw structure table as pushed by the host agent: a run of
/// variable-length structures followed by zero padding up to [`TABLE_CAPACITY`].
/// The zero padding doubles as the end-of-table marker for every walk.
pub struct ByteTable {
    bytes: Box<[u8]>,
}

impl ByteTable {
    /// Create a zeroed table
    pub fn new() -> Self {
        ByteTable {
            bytes: vec![0u8; TABLE_CAPACITY].into_boxed_slice(),
        }
    }

    /// Create a table holding `data`, truncated to capacity
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut table = ByteTable::new();
        table.fill(data);
        table
    }

    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    /// Full table view, including trailing zero padding
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Zero the whole table
    pub fn clear(&mut self) {
        self.bytes.fill(0);
    }

    /// Zero the table, then copy in as much of `data` as fits
    ///
    /// Returns the number of bytes copied.
    pub fn fill(&mut self, data: &[u8]) -> usize {
        self.clear();
        let len = data.len().min(self.bytes.len());
        self.bytes[..len].copy_from_slice(&data[..len]);
        len
    }

    /// Structure starting at `offset`, if a valid header lives there
    pub fn structure_at(&self, offset: usize) -> Option<Structure<'_>> {
        Structure::at(&self.bytes, offset)
    }

    /// First structure of `structure_type` whose length is at least `min_length`
    pub fn first_of_type(&self, structure_type: u8, min_length: u8) -> Option<Structure<'_>> {
        walker::first_of_type(&self.bytes, 0, structure_type, min_length)
            .and_then(|offset| self.structure_at(offset))
    }

    /// The `n`-th (0-based) structure of `structure_type`
    pub fn nth_of_type(&self, structure_type: u8, n: usize) -> Option<Structure<'_>> {
        walker::nth_of_type(&self.bytes, structure_type, n)
            .and_then(|offset| self.structure_at(offset))
    }

    /// Structure carrying `handle`, within the walk limit
    pub fn by_handle(&self, handle: u16) -> Option<Structure<'_>> {
        walker::by_handle(&self.bytes, handle).and_then(|offset| self.structure_at(offset))
    }

    /// Number of structures of `structure_type`, bounded by the walk limit
    pub fn count_of_type(&self, structure_type: u8, min_length: u8) -> usize {
        walker::count_of_type(&self.bytes, structure_type, min_length)
    }

    /// Iterate the structures in table order, bounded by the walk limit
    pub fn structures(&self) -> Structures<'_> {
        walker::structures(&self.bytes)
    }

    /// Iterate the structures of one type, bounded by the walk limit
    pub fn structures_of_type(&self, structure_type: u8) -> impl Iterator<Item = Structure<'_>> {
        self.structures()
            .filter(move |s| s.structure_type() == structure_type)
    }

    /// Structures of `structure_type` at least `min_length` long, in table order
    ///
    /// Shorter structures of the type are skipped. Stops after
    /// [`walker::MAX_ENTRY_COUNT`] matches.
    pub fn records_of_type(&self, structure_type: u8, min_length: u8) -> Vec<Structure<'_>> {
        let mut records = Vec::new();
        let mut offset = 0;
        while let Some(found) =
            walker::first_of_type(&self.bytes, offset, structure_type, min_length)
        {
            let Some(record) = self.structure_at(found) else {
                break;
            };
            records.push(record);
            if records.len() >= walker::MAX_ENTRY_COUNT {
                break;
            }
            match walker::next(&self.bytes, found) {
                Some(after) => offset = after,
                None => break,
            }
        }
        records
    }
}

impl Default for ByteTable {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ByteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let used = self
            .bytes
            .iter()
            .rposition(|&b| b != 0)
            .map_or(0, |pos| pos + 1);
        f.debug_struct("ByteTable")
            .field("capacity", &self.bytes.len())
            .field("used", &used)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_table_is_zeroed() {
        let table = ByteTable::new();
        assert_eq!(table.capacity(), TABLE_CAPACITY);
        assert!(table.as_bytes().iter().all(|&b| b == 0));
        assert!(table.structures().next().is_none());
    }

    #[test]
    fn test_fill_replaces_previous_contents() {
        let mut table = ByteTable::from_bytes(&[0xAA; 64]);
        let copied = table.fill(&[1, 2, 3]);
        assert_eq!(copied, 3);
        assert_eq!(&table.as_bytes()[..4], &[1, 2, 3, 0]);
        assert!(table.as_bytes()[3..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_fill_truncates_to_capacity() {
        let mut table = ByteTable::new();
        let data = vec![0x11u8; TABLE_CAPACITY + 100];
        assert_eq!(table.fill(&data), TABLE_CAPACITY);
        assert!(table.as_bytes().iter().all(|&b| b == 0x11));
    }

    #[test]
    fn test_lookup_helpers() {
        // type 1, len 4, handle 0x0010, "x"; type 4, len 6, handle 0x0020, no strings
        let data = [1, 4, 0x10, 0, b'x', 0, 0, 4, 6, 0x20, 0, 0xAB, 0xCD, 0, 0];
        let table = ByteTable::from_bytes(&data);

        let system = table.first_of_type(1, 0).unwrap();
        assert_eq!(system.offset(), 0);
        assert_eq!(system.string(1), "x");

        let cpu = table.by_handle(0x0020).unwrap();
        assert_eq!(cpu.structure_type(), 4);
        assert_eq!(cpu.byte(4), Some(0xAB));

        assert_eq!(table.count_of_type(4, 0), 1);
        assert_eq!(table.count_of_type(4, 7), 0);
        assert!(table.nth_of_type(4, 1).is_none());
        assert_eq!(table.structures_of_type(1).count(), 1);
    }

    #[test]
    fn test_records_of_type_skips_short_structures() {
        // type 17 len 4, type 17 len 6, type 2 len 6, type 17 len 8
        let data = [
            17, 4, 1, 0, 0, 0, //
            17, 6, 2, 0, 0, 0, 0, 0, //
            2, 6, 3, 0, 0, 0, 0, 0, //
            17, 8, 4, 0, 0, 0, 0, 0, 0, 0,
        ];
        let table = ByteTable::from_bytes(&data);

        let handles: Vec<u16> = table.records_of_type(17, 6).iter().map(|s| s.handle()).collect();
        assert_eq!(handles, vec![2, 4]);
        assert_eq!(table.records_of_type(17, 0).len(), 3);
        assert!(table.records_of_type(17, 9).is_empty());
    }
}
