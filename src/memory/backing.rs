use crate::error::{Error, Result};
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

/// Where the bytes of one run of physical memory actually live. Dump files are
/// memory-mapped so multi-gigabyte captures are never read in whole.
#[derive(Clone)]
pub enum Backing {
    Mapped {
        map: Arc<Mmap>,
        start: usize,
        len: usize,
    },
    Owned(Arc<[u8]>),
}

impl Backing {
    pub fn map_file(path: &Path) -> Result<Self> {
        let map = Arc::new(map_file(path)?);
        let len = map.len();
        Ok(Backing::Mapped { map, start: 0, len })
    }

    /// A window onto a file that is already mapped, e.g. one load segment of an ELF core.
    pub fn window(map: Arc<Mmap>, start: usize, len: usize) -> Result<Self> {
        match start.checked_add(len) {
            Some(end) if end <= map.len() => Ok(Backing::Mapped { map, start, len }),
            _ => Err(Error::Format(format!(
                "{len} bytes at offset {start:#x} are past the end of a {} byte file",
                map.len()
            ))),
        }
    }

    pub fn owned(bytes: Vec<u8>) -> Self {
        Backing::Owned(bytes.into())
    }

    pub fn bytes(&self) -> &[u8] {
        match self {
            Backing::Mapped { map, start, len } => &map[*start..*start + *len],
            Backing::Owned(bytes) => bytes,
        }
    }

    pub fn len(&self) -> u64 {
        match self {
            Backing::Mapped { len, .. } => *len as u64,
            Backing::Owned(bytes) => bytes.len() as u64,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn map_file(path: &Path) -> Result<Mmap> {
    let file = File::open(path)?;

    // This is unsafe because it has undefined behavior if the underlying file is
    // modified while the memory map is in use.
    let map = unsafe { Mmap::map(&file) }?;
    Ok(map)
}
