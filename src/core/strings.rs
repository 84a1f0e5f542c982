//! String-set resolution for SMBIOS structures
//!
//! Formatted fields refer to text by a 1-based string number. The strings
//! follow the formatted area as consecutive null-terminated runs, closed by
//! an extra null. Index 0 means "no string".

/// Resolve string number `index` of the structure at `offset` with formatted
/// length `length`
///
/// Returns an empty string for index 0, for an index past the last string,
/// and for a string that runs off the end of the buffer. Non-UTF-8 bytes are
/// replaced rather than rejected.
pub fn resolve(buf: &[u8], offset: usize, length: u8, index: u8) -> String {
    if index == 0 {
        return String::new();
    }
    let mut cursor = offset.saturating_add(length as usize);
    for _ in 1..index {
        let Some(end) = terminator(buf, cursor) else {
            return String::new();
        };
        cursor = end + 1;
        // a null right after a terminator closes the string set
        if buf.get(cursor).map_or(true, |&b| b == 0) {
            return String::new();
        }
    }
    match terminator(buf, cursor) {
        Some(end) => String::from_utf8_lossy(&buf[cursor..end]).into_owned(),
        None => String::new(),
    }
}

/// Every string of the structure at `offset`, in order
pub fn all(buf: &[u8], offset: usize, length: u8) -> Vec<String> {
    let mut strings = Vec::new();
    let mut cursor = offset.saturating_add(length as usize);
    while let Some(&first) = buf.get(cursor) {
        if first == 0 {
            break;
        }
        let Some(end) = terminator(buf, cursor) else {
            break;
        };
        strings.push(String::from_utf8_lossy(&buf[cursor..end]).into_owned());
        cursor = end + 1;
    }
    strings
}

/// Position of the first null at or after `start`
fn terminator(buf: &[u8], start: usize) -> Option<usize> {
    buf.get(start..)?
        .iter()
        .position(|&b| b == 0)
        .map(|pos| start + pos)
}
