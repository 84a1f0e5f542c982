//! SMBIOS entry point detection and version gating
//!
//! A pushed table image carries the entry point structure somewhere in its
//! contents. The older 2.1 format is anchored by `_SM_`, the 3.0 format by
//! `_SM3_`. Only the version bytes are consulted; the rest of the entry point
//! is left to the host.

use crate::error::SyncError;
use serde::Serialize;
use std::fmt;
use tracing::{error, info};

pub const ANCHOR_21: &[u8] = b"_SM_";
pub const ANCHOR_30: &[u8] = b"_SM3_";

/// SMBIOS specification version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SmbiosVersion {
    pub major: u8,
    pub minor: u8,
}

impl SmbiosVersion {
    pub const fn new(major: u8, minor: u8) -> Self {
        SmbiosVersion { major, minor }
    }

    pub fn is_supported(&self) -> bool {
        SUPPORTED_VERSIONS.contains(self)
    }
}

impl fmt::Display for SmbiosVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Versions accepted by the version gate
pub const SUPPORTED_VERSIONS: [SmbiosVersion; 8] = [
    SmbiosVersion::new(3, 0),
    SmbiosVersion::new(3, 2),
    SmbiosVersion::new(3, 3),
    SmbiosVersion::new(3, 4),
    SmbiosVersion::new(3, 5),
    SmbiosVersion::new(3, 6),
    SmbiosVersion::new(3, 7),
    SmbiosVersion::new(3, 8),
];

/// Entry point format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EntryPointKind {
    /// 32-bit entry point, anchor `_SM_`
    Smbios21,
    /// 64-bit entry point, anchor `_SM3_`
    Smbios30,
}

impl EntryPointKind {
    pub fn anchor(&self) -> &'static [u8] {
        match self {
            Self::Smbios21 => ANCHOR_21,
            Self::Smbios30 => ANCHOR_30,
        }
    }

    /// Size of the packed entry point structure
    pub fn structure_len(&self) -> usize {
        match self {
            Self::Smbios21 => 31,
            Self::Smbios30 => 24,
        }
    }

    /// Offset of the major version byte; the minor version follows it
    fn version_offset(&self) -> usize {
        match self {
            Self::Smbios21 => 6,
            Self::Smbios30 => 7,
        }
    }
}

/// Located entry point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EntryPoint {
    pub kind: EntryPointKind,
    pub offset: usize,
    pub version: SmbiosVersion,
}

/// Find the entry point in `buf` and decode its version
///
/// The 2.1 anchor is searched first across the whole buffer; the 3.0 anchor
/// only if no 2.1 anchor exists.
pub fn locate(buf: &[u8]) -> Result<EntryPoint, SyncError> {
    let (kind, offset) = match find(buf, ANCHOR_21) {
        Some(offset) => (EntryPointKind::Smbios21, offset),
        None => {
            info!("SMBIOS 2.1 anchor string not found, looking for SMBIOS 3.0");
            let offset = find(buf, ANCHOR_30).ok_or(SyncError::AnchorNotFound)?;
            (EntryPointKind::Smbios30, offset)
        }
    };

    let available = buf.len() - offset;
    if available < kind.structure_len() {
        return Err(SyncError::EntryPointTruncated {
            offset,
            needed: kind.structure_len(),
            available,
        });
    }

    let at = offset + kind.version_offset();
    let version = SmbiosVersion::new(buf[at], buf[at + 1]);
    Ok(EntryPoint {
        kind,
        offset,
        version,
    })
}

/// Locate the entry point and reject unsupported versions
pub fn check_version(buf: &[u8]) -> Result<EntryPoint, SyncError> {
    let entry_point = locate(buf)?;
    info!(version = %entry_point.version, kind = ?entry_point.kind, "SMBIOS version");

    if !entry_point.version.is_supported() {
        error!(version = %entry_point.version, "Unsupported SMBIOS table version");
        return Err(SyncError::UnsupportedVersion {
            major: entry_point.version.major,
            minor: entry_point.version.minor,
        });
    }
    Ok(entry_point)
}

fn find(buf: &[u8], anchor: &[u8]) -> Option<usize> {
    buf.windows(anchor.len()).position(|window| window == anchor)
}

/// Build a minimal entry point of `kind` carrying `version`
///
/// Only the anchor and version bytes are meaningful; everything else is zero.
pub fn encode(kind: EntryPointKind, version: SmbiosVersion) -> Vec<u8> {
    let mut bytes = vec![0u8; kind.structure_len()];
    bytes[..kind.anchor().len()].copy_from_slice(kind.anchor());
    let at = kind.version_offset();
    // entry point length sits just before the version bytes in both formats
    bytes[at - 1] = kind.structure_len() as u8;
    bytes[at] = version.major;
    bytes[at + 1] = version.minor;
    bytes
}
