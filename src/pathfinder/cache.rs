//! On-disk persistence for all-pairs pathfinder tables.
//!
//! A cache directory is named after the map's canonical configuration string
//! plus a prefix of its layout hash, and holds two files, `distances.bin` and
//! `directions.bin`. Files are written to a temporary name and renamed into
//! place, so concurrent readers never observe a partial table.
//!
//! File format:
//! ```text
//! [Magic: 4 bytes "FPTH"]
//! [Header length: 4 bytes (little-endian u32)]
//! [Header: bincode TableHeader]
//! [Entries: cell_count^2 little-endian values, entry_size bytes each]
//! ```
//!
//! Loaded tables are memory-mapped and read in place, so the bytes are shared
//! through the page cache by every worker holding the same table.

use crate::map::Map;
use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const DISTANCE_FILE: &str = "distances.bin";
pub const DIRECTION_FILE: &str = "directions.bin";

const MAGIC: &[u8; 4] = b"FPTH";
const PREFIX_SIZE: usize = 8;

/// Fixed-width little-endian table entry
pub trait Entry: Copy {
    const SIZE: usize;

    fn read(bytes: &[u8]) -> Self;

    fn write(self, out: &mut Vec<u8>);
}

impl Entry for u16 {
    const SIZE: usize = 2;

    #[inline]
    fn read(bytes: &[u8]) -> Self {
        u16::from_le_bytes([bytes[0], bytes[1]])
    }

    fn write(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
}

impl Entry for u8 {
    const SIZE: usize = 1;

    #[inline]
    fn read(bytes: &[u8]) -> Self {
        bytes[0]
    }

    fn write(self, out: &mut Vec<u8>) {
        out.push(self);
    }
}

/// Describes the table that follows it in a cache file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableHeader {
    pub version: u32,
    pub map_name: String,
    /// [`Map::layout_hash`] of the map the table was built for
    pub layout: String,
    pub cell_count: usize,
    pub entry_size: u32,
}

impl TableHeader {
    /// Current table format version
    pub const VERSION: u32 = 2;

    pub fn new<T: Entry>(map_name: &str, layout: &str, cell_count: usize) -> Self {
        Self {
            version: Self::VERSION,
            map_name: map_name.to_string(),
            layout: layout.to_string(),
            cell_count,
            entry_size: T::SIZE as u32,
        }
    }
}

enum Storage {
    Owned(Vec<u8>),
    Mapped(Mmap),
}

impl Storage {
    #[inline]
    fn bytes(&self) -> &[u8] {
        match self {
            Storage::Owned(bytes) => bytes.as_slice(),
            Storage::Mapped(mmap) => &mmap[..],
        }
    }
}

/// Dense table of `T`, rows indexed by source cell and columns by target
/// cell, both in the map's open-cell enumeration order. Clones share storage.
#[derive(Clone)]
pub struct Table<T> {
    storage: Arc<Storage>,
    offset: usize,
    len: usize,
    _entry: PhantomData<T>,
}

impl<T: Entry> Table<T> {
    pub fn from_entries(entries: &[T]) -> Self {
        let mut bytes = Vec::with_capacity(entries.len() * T::SIZE);
        for &entry in entries {
            entry.write(&mut bytes);
        }
        Self {
            storage: Arc::new(Storage::Owned(bytes)),
            offset: 0,
            len: entries.len(),
            _entry: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the entries are read from a mapped file
    pub fn is_mapped(&self) -> bool {
        matches!(*self.storage, Storage::Mapped(_))
    }

    #[inline]
    pub fn get(&self, i: usize) -> Option<T> {
        if i >= self.len {
            return None;
        }
        let start = self.offset + i * T::SIZE;
        self.storage.bytes().get(start..start + T::SIZE).map(T::read)
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.entry_bytes().chunks_exact(T::SIZE).map(T::read).collect()
    }

    fn entry_bytes(&self) -> &[u8] {
        let end = self.offset + self.len * T::SIZE;
        self.storage.bytes().get(self.offset..end).unwrap_or(&[])
    }

    /// Write atomically: temp file in the same directory, then rename
    pub fn save<P: AsRef<Path>>(&self, header: &TableHeader, path: P) -> Result<(), CacheError> {
        let path = path.as_ref();
        let encoded = bincode::serialize(header)?;
        let header_len = u32::try_from(encoded.len())
            .map_err(|_| CacheError::InvalidFormat("table header too large".to_string()))?;

        let temp = temp_path(path);
        {
            let file = File::create(&temp)?;
            let mut writer = BufWriter::new(file);
            writer.write_all(MAGIC)?;
            writer.write_all(&header_len.to_le_bytes())?;
            writer.write_all(&encoded)?;
            writer.write_all(self.entry_bytes())?;
            writer.flush()?;
        }
        fs::rename(&temp, path)?;
        Ok(())
    }

    /// Map a cache file and validate its header against its length
    pub fn open<P: AsRef<Path>>(path: P) -> Result<(TableHeader, Self), CacheError> {
        let file = File::open(path)?;
        // SAFETY: cache files are only replaced by rename, never modified in place
        let mmap = unsafe { Mmap::map(&file)? };

        if mmap.len() < PREFIX_SIZE {
            return Err(CacheError::Corrupt(format!(
                "file holds {} bytes, too short for a header",
                mmap.len()
            )));
        }
        if &mmap[..4] != MAGIC {
            return Err(CacheError::InvalidFormat("Invalid magic bytes".to_string()));
        }

        let header_len = u32::from_le_bytes([mmap[4], mmap[5], mmap[6], mmap[7]]) as usize;
        let header_end = PREFIX_SIZE
            .checked_add(header_len)
            .filter(|&end| end <= mmap.len())
            .ok_or_else(|| CacheError::Corrupt("header runs past the end of the file".to_string()))?;
        let header: TableHeader = bincode::deserialize(&mmap[PREFIX_SIZE..header_end])?;

        if header.version != TableHeader::VERSION {
            return Err(CacheError::VersionMismatch {
                expected: TableHeader::VERSION,
                found: header.version,
            });
        }
        if header.entry_size as usize != T::SIZE {
            return Err(CacheError::InvalidFormat(format!(
                "entries are {} bytes wide, expected {}",
                header.entry_size,
                T::SIZE
            )));
        }

        let len = header
            .cell_count
            .checked_mul(header.cell_count)
            .ok_or_else(|| CacheError::Corrupt(format!("cell count {} is too large", header.cell_count)))?;
        let expected = len
            .checked_mul(T::SIZE)
            .ok_or_else(|| CacheError::Corrupt(format!("cell count {} is too large", header.cell_count)))?;
        let found = mmap.len() - header_end;
        if found != expected {
            return Err(CacheError::Corrupt(format!(
                "table holds {} bytes, expected {}",
                found, expected
            )));
        }

        let table = Self {
            storage: Arc::new(Storage::Mapped(mmap)),
            offset: header_end,
            len,
            _entry: PhantomData,
        };
        Ok((header, table))
    }
}

impl<T> std::fmt::Debug for Table<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("len", &self.len)
            .field("mapped", &matches!(*self.storage, Storage::Mapped(_)))
            .finish()
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".tmp{}", std::process::id()));
    path.with_file_name(name)
}

/// Cache directory for a map under `root`. Maps sharing a canonical name but
/// differing in layout get different directories.
pub fn cache_dir(root: &Path, map: &Map) -> PathBuf {
    let hash = map.layout_hash();
    let short = hash.get(..16).unwrap_or(&hash);
    root.join(format!("{}-{}", map.name, short))
}

/// Errors that can occur reading or writing a pathfinder cache
#[derive(Debug)]
pub enum CacheError {
    Io(std::io::Error),
    Serialization(bincode::Error),
    InvalidFormat(String),
    Corrupt(String),
    VersionMismatch { expected: u32, found: u32 },
    MapMismatch { expected: usize, found: usize },
    StaleLayout { expected: String, found: String },
}

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "IO error: {}", e),
            Self::Serialization(e) => write!(f, "Serialization error: {}", e),
            Self::InvalidFormat(msg) => write!(f, "Invalid format: {}", msg),
            Self::Corrupt(msg) => write!(f, "Corrupt table: {}", msg),
            Self::VersionMismatch { expected, found } => {
                write!(f, "Version mismatch: expected {}, found {}", expected, found)
            }
            Self::MapMismatch { expected, found } => write!(
                f,
                "Cached table covers {} cells but the map has {} open cells",
                found, expected
            ),
            Self::StaleLayout { expected, found } => write!(
                f,
                "Cached table was built for layout {} but the map has layout {}",
                found, expected
            ),
        }
    }
}

impl std::error::Error for CacheError {}

impl From<std::io::Error> for CacheError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<bincode::Error> for CacheError {
    fn from(e: bincode::Error) -> Self {
        Self::Serialization(e)
    }
}
