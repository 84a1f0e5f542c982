//! Structure walking over a raw SMBIOS table
//!
//! A table has no index and no overall length prefix. Each structure is a
//! 4-byte header (`type`, `length`, `handle`), `length - 4` more bytes of
//! formatted fields, then a string set terminated by a double null. The table
//! ends at the first position whose type and length bytes are both zero, or
//! when the buffer runs out.
//!
//! All functions here are pure and work on offsets into a borrowed slice.
//! Offsets strictly increase from one structure to the next, so every scan
//! terminates. Every enumeration, the [`Structures`] iterator included, is
//! additionally capped at [`MAX_ENTRY_COUNT`] structures.

use crate::core::strings;

/// Upper bound on the number of matches any enumeration will report
pub const MAX_ENTRY_COUNT: usize = 255;

/// Fixed structure header shared by every SMBIOS structure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructureHeader {
    pub structure_type: u8,
    /// Length of the formatted area, header included
    pub length: u8,
    pub handle: u16,
}

impl StructureHeader {
    pub const SIZE: usize = 4;

    /// Read a header from the start of `bytes`
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let raw = bytes.get(..Self::SIZE)?;
        Some(StructureHeader {
            structure_type: raw[0],
            length: raw[1],
            handle: u16::from_le_bytes([raw[2], raw[3]]),
        })
    }

    /// Zero type and zero length: the padding after the last structure
    pub fn is_end_marker(&self) -> bool {
        self.structure_type == 0 && self.length == 0
    }
}

/// Header at `offset`, or `None` at the end of the table
///
/// A header whose declared length is shorter than the header itself cannot
/// describe a structure; the walk stops there.
pub fn header_at(buf: &[u8], offset: usize) -> Option<StructureHeader> {
    let header = StructureHeader::parse(buf.get(offset..)?)?;
    if header.is_end_marker() || (header.length as usize) < StructureHeader::SIZE {
        return None;
    }
    Some(header)
}

/// Offset of the structure following the one at `offset`
///
/// Skips the formatted area, then scans for the double null closing the
/// string set. Returns `None` if the buffer ends first.
pub fn next(buf: &[u8], offset: usize) -> Option<usize> {
    let length = *buf.get(offset.checked_add(1)?)? as usize;
    let mut cursor = offset + length;
    loop {
        let pair = buf.get(cursor..cursor.checked_add(2)?)?;
        if pair == [0, 0] {
            return Some(cursor + 2);
        }
        cursor += 1;
    }
}

/// First structure at or after `start` with a matching type and a length of at
/// least `min_length`
pub fn first_of_type(
    buf: &[u8],
    start: usize,
    structure_type: u8,
    min_length: u8,
) -> Option<usize> {
    let mut offset = start;
    loop {
        let header = header_at(buf, offset)?;
        if header.structure_type == structure_type && header.length >= min_length {
            return Some(offset);
        }
        offset = next(buf, offset)?;
    }
}

/// The `n`-th (0-based) structure of `structure_type`
pub fn nth_of_type(buf: &[u8], structure_type: u8, n: usize) -> Option<usize> {
    if n >= MAX_ENTRY_COUNT {
        return None;
    }
    let mut offset = first_of_type(buf, 0, structure_type, 0)?;
    for _ in 0..n {
        let after = next(buf, offset)?;
        offset = first_of_type(buf, after, structure_type, 0)?;
    }
    Some(offset)
}

/// Structure carrying `handle` among the first [`MAX_ENTRY_COUNT`]
pub fn by_handle(buf: &[u8], handle: u16) -> Option<usize> {
    structures(buf)
        .find(|s| s.handle() == handle)
        .map(|s| s.offset())
}

/// Number of structures matching `structure_type` and `min_length`
///
/// Stops counting at [`MAX_ENTRY_COUNT`].
pub fn count_of_type(buf: &[u8], structure_type: u8, min_length: u8) -> usize {
    let mut count = 0;
    let mut offset = 0;
    while let Some(found) = first_of_type(buf, offset, structure_type, min_length) {
        count += 1;
        if count >= MAX_ENTRY_COUNT {
            break;
        }
        match next(buf, found) {
            Some(after) => offset = after,
            None => break,
        }
    }
    count
}

/// Iterate the structures of `buf` in table order
///
/// Yields at most [`MAX_ENTRY_COUNT`] structures.
pub fn structures(buf: &[u8]) -> Structures<'_> {
    Structures {
        buf,
        offset: Some(0),
        yielded: 0,
    }
}

/// Iterator over the structures of a table
pub struct Structures<'a> {
    buf: &'a [u8],
    offset: Option<usize>,
    yielded: usize,
}

impl<'a> Iterator for Structures<'a> {
    type Item = Structure<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.yielded >= MAX_ENTRY_COUNT {
            return None;
        }
        let offset = self.offset?;
        let current = Structure::at(self.buf, offset);
        self.offset = current.and_then(|_| next(self.buf, offset));
        if current.is_some() {
            self.yielded += 1;
        }
        current
    }
}

/// Borrowed view of one structure
///
/// Field reads are checked against the declared length: a field past the end
/// of the formatted area reads as `None`, the same as a field past the end of
/// the buffer.
#[derive(Debug, Clone, Copy)]
pub struct Structure<'a> {
    buf: &'a [u8],
    offset: usize,
    header: StructureHeader,
}

impl<'a> Structure<'a> {
    /// View the structure starting at `offset`
    pub fn at(buf: &'a [u8], offset: usize) -> Option<Self> {
        let header = header_at(buf, offset)?;
        Some(Structure {
            buf,
            offset,
            header,
        })
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn header(&self) -> StructureHeader {
        self.header
    }

    pub fn structure_type(&self) -> u8 {
        self.header.structure_type
    }

    pub fn length(&self) -> u8 {
        self.header.length
    }

    pub fn handle(&self) -> u16 {
        self.header.handle
    }

    /// Formatted area (header included), clamped to the buffer
    pub fn formatted(&self) -> &'a [u8] {
        let end = (self.offset + self.header.length as usize).min(self.buf.len());
        &self.buf[self.offset..end]
    }

    /// Byte field at `field` offset within the formatted area
    pub fn byte(&self, field: usize) -> Option<u8> {
        self.formatted().get(field).copied()
    }

    /// Little-endian word at `field`
    pub fn word(&self, field: usize) -> Option<u16> {
        let raw = self.formatted().get(field..field.checked_add(2)?)?;
        Some(u16::from_le_bytes([raw[0], raw[1]]))
    }

    /// Little-endian dword at `field`
    pub fn dword(&self, field: usize) -> Option<u32> {
        let raw = self.formatted().get(field..field.checked_add(4)?)?;
        Some(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    /// Little-endian qword at `field`
    pub fn qword(&self, field: usize) -> Option<u64> {
        let raw = self.formatted().get(field..field.checked_add(8)?)?;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(raw);
        Some(u64::from_le_bytes(bytes))
    }

    /// String number `index` (1-based) from this structure's string set
    pub fn string(&self, index: u8) -> String {
        strings::resolve(self.buf, self.offset, self.header.length, index)
    }

    /// String referenced by the string-number byte at `field`
    pub fn string_at(&self, field: usize) -> String {
        self.byte(field)
            .map(|index| self.string(index))
            .unwrap_or_default()
    }

    /// Every string in the string set, in order
    pub fn strings(&self) -> Vec<String> {
        strings::all(self.buf, self.offset, self.header.length)
    }

    /// The structure following this one
    pub fn next(&self) -> Option<Structure<'a>> {
        next(self.buf, self.offset).and_then(|offset| Structure::at(self.buf, offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Append one structure with `fixed_len` formatted bytes and the given strings
    fn push_structure(
        buf: &mut Vec<u8>,
        structure_type: u8,
        fixed_len: u8,
        handle: u16,
        strings: &[&str],
    ) {
        buf.push(structure_type);
        buf.push(fixed_len);
        buf.extend_from_slice(&handle.to_le_bytes());
        buf.extend(std::iter::repeat(0xEE).take(fixed_len as usize - 4));
        if strings.is_empty() {
            buf.extend_from_slice(&[0, 0]);
        } else {
            for s in strings {
                buf.extend_from_slice(s.as_bytes());
                buf.push(0);
            }
            buf.push(0);
        }
    }

    fn padded(mut buf: Vec<u8>) -> Vec<u8> {
        buf.extend_from_slice(&[0; 16]);
        buf
    }

    #[test]
    fn test_two_structures_of_same_type() {
        let mut buf = Vec::new();
        push_structure(&mut buf, 7, 10, 1, &["abc"]);
        push_structure(&mut buf, 7, 12, 2, &["abc"]);
        let buf = padded(buf);

        assert_eq!(nth_of_type(&buf, 7, 0), Some(0));
        assert_eq!(nth_of_type(&buf, 7, 1), Some(15));
        assert_eq!(next(&buf, 0), Some(15));
        assert_eq!(nth_of_type(&buf, 7, 2), None);
    }

    #[test]
    fn test_empty_string_set() {
        let mut buf = Vec::new();
        push_structure(&mut buf, 4, 8, 1, &[]);
        push_structure(&mut buf, 4, 8, 2, &[]);
        let buf = padded(buf);

        assert_eq!(next(&buf, 0), Some(8 + 2));
        let s = Structure::at(&buf, 0).unwrap();
        assert_eq!(s.string(0), "");
        assert_eq!(s.string(1), "");
        assert!(s.strings().is_empty());
    }

    #[test]
    fn test_first_of_type_respects_min_length() {
        let mut buf = Vec::new();
        push_structure(&mut buf, 17, 8, 1, &[]);
        push_structure(&mut buf, 17, 40, 2, &["DIMM"]);
        let buf = padded(buf);

        assert_eq!(first_of_type(&buf, 0, 17, 0), Some(0));
        assert_eq!(first_of_type(&buf, 0, 17, 40), Some(10));
        assert_eq!(first_of_type(&buf, 0, 17, 41), None);
        assert_eq!(count_of_type(&buf, 17, 0), 2);
        assert_eq!(count_of_type(&buf, 17, 9), 1);
    }

    #[test]
    fn test_by_handle() {
        let mut buf = Vec::new();
        push_structure(&mut buf, 0, 6, 0x0000, &["vendor", "1.0"]);
        push_structure(&mut buf, 2, 8, 0x0200, &["board"]);
        push_structure(&mut buf, 4, 6, 0x0400, &[]);
        let buf = padded(buf);

        let offset = by_handle(&buf, 0x0400).unwrap();
        assert_eq!(Structure::at(&buf, offset).unwrap().structure_type(), 4);
        assert_eq!(by_handle(&buf, 0x0000), Some(0));
        assert_eq!(by_handle(&buf, 0x1234), None);
    }

    #[test]
    fn test_next_runs_off_buffer() {
        // string set never terminated
        let buf = [1u8, 4, 0, 0, b'a', b'b', b'c'];
        assert_eq!(next(&buf, 0), None);
        assert_eq!(next(&buf, 100), None);
    }

    #[test]
    fn test_end_marker_stops_walk() {
        let mut buf = Vec::new();
        push_structure(&mut buf, 1, 6, 1, &[]);
        let mut buf = padded(buf);
        // a structure hidden behind the zero padding is never reached
        push_structure(&mut buf, 3, 6, 2, &[]);

        assert_eq!(structures(&buf).count(), 1);
        assert_eq!(first_of_type(&buf, 0, 3, 0), None);
    }

    #[test]
    fn test_short_length_stops_walk() {
        let buf = [9u8, 2, 0, 0, 0, 0, 9, 6, 0, 0, 0, 0, 0, 0];
        assert_eq!(header_at(&buf, 0), None);
        assert_eq!(first_of_type(&buf, 0, 9, 0), None);
    }

    #[test]
    fn test_count_is_bounded() {
        let mut buf = Vec::new();
        for handle in 0..300u16 {
            push_structure(&mut buf, 17, 6, handle, &[]);
        }
        let buf = padded(buf);

        assert_eq!(structures(&buf).count(), MAX_ENTRY_COUNT);
        assert_eq!(by_handle(&buf, 254), Some(254 * 8));
        assert_eq!(by_handle(&buf, 299), None);
        assert_eq!(count_of_type(&buf, 17, 0), MAX_ENTRY_COUNT);
        assert!(nth_of_type(&buf, 17, MAX_ENTRY_COUNT - 1).is_some());
        assert_eq!(nth_of_type(&buf, 17, MAX_ENTRY_COUNT), None);
    }

    #[test]
    fn test_field_reads_bounded_by_length() {
        let mut buf = Vec::new();
        push_structure(&mut buf, 4, 8, 0x0102, &["CPU0"]);
        let buf = padded(buf);
        let s = Structure::at(&buf, 0).unwrap();

        assert_eq!(s.word(2), Some(0x0102));
        assert_eq!(s.byte(7), Some(0xEE));
        // offset 8 is the first string byte, outside the formatted area
        assert_eq!(s.byte(8), None);
        assert_eq!(s.dword(6), None);
        assert!(s.qword(0).is_some());
        assert_eq!(s.qword(1), None);
        assert_eq!(s.string_at(8), "");
    }

    #[test]
    fn test_iterator_yields_headers_in_order() {
        let mut buf = Vec::new();
        push_structure(&mut buf, 0, 6, 10, &["a"]);
        push_structure(&mut buf, 1, 8, 11, &["b", "c"]);
        push_structure(&mut buf, 127, 4, 12, &[]);
        let buf = padded(buf);

        let handles: Vec<u16> = structures(&buf).map(|s| s.handle()).collect();
        assert_eq!(handles, vec![10, 11, 12]);
        let system = structures(&buf).nth(1).unwrap();
        assert_eq!(system.strings(), vec!["b".to_string(), "c".to_string()]);
        assert_eq!(system.next().unwrap().structure_type(), 127);
    }
}
