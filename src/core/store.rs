//! Backing store for pushed SMBIOS table images
//!
//! The host agent leaves the latest image in persistent storage as a 10-byte
//! packed header followed by the raw structure table. The service re-reads it
//! wholesale on every synchronization pass.

use parking_lot::RwLock;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Image header preceding the table content
///
/// ```text
/// offset 0: directory version (u8)
/// offset 1: MDR type           (u8)
/// offset 2: timestamp          (u32, little-endian)
/// offset 6: data size          (u32, little-endian)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreHeader {
    pub dir_version: u8,
    pub mdr_type: u8,
    pub timestamp: u32,
    pub data_size: u32,
}

impl StoreHeader {
    pub const SIZE: usize = 10;

    /// Decode a header from the start of `bytes`
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let raw = bytes.get(..Self::SIZE)?;
        Some(StoreHeader {
            dir_version: raw[0],
            mdr_type: raw[1],
            timestamp: u32::from_le_bytes([raw[2], raw[3], raw[4], raw[5]]),
            data_size: u32::from_le_bytes([raw[6], raw[7], raw[8], raw[9]]),
        })
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0] = self.dir_version;
        bytes[1] = self.mdr_type;
        bytes[2..6].copy_from_slice(&self.timestamp.to_le_bytes());
        bytes[6..10].copy_from_slice(&self.data_size.to_le_bytes());
        bytes
    }

    /// Header followed by `data`, with `data_size` set to its length
    pub fn encode_image(dir_version: u8, timestamp: u32, data: &[u8]) -> Vec<u8> {
        let header = StoreHeader {
            dir_version,
            mdr_type: 2,
            timestamp,
            data_size: data.len() as u32,
        };
        let mut image = header.to_bytes().to_vec();
        image.extend_from_slice(data);
        image
    }
}

/// Source of table images
pub trait BackingStore: Send + Sync {
    /// Read the complete image: header plus content
    fn read_image(&self) -> io::Result<Vec<u8>>;

    /// Whether the store can currently be opened
    fn is_readable(&self) -> bool;
}

/// Image stored in a file
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        FileStore {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BackingStore for FileStore {
    fn read_image(&self) -> io::Result<Vec<u8>> {
        fs::read(&self.path)
    }

    fn is_readable(&self) -> bool {
        fs::File::open(&self.path).is_ok()
    }
}

/// Image held in memory, replaceable while the service runs
///
/// Clones share the same image. An empty store reads as unavailable.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    image: Arc<RwLock<Option<Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(image: Vec<u8>) -> Self {
        let store = Self::new();
        store.replace(image);
        store
    }

    /// Install a new image
    pub fn replace(&self, image: Vec<u8>) {
        *self.image.write() = Some(image);
    }

    /// Remove the image, making the store unreadable
    pub fn clear(&self) {
        *self.image.write() = None;
    }
}

impl BackingStore for MemoryStore {
    fn read_image(&self) -> io::Result<Vec<u8>> {
        self.image
            .read()
            .clone()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no table image installed"))
    }

    fn is_readable(&self) -> bool {
        self.image.read().is_some()
    }
}
