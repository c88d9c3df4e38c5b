use super::Backing;
use crate::error::{Error, Result};
use rangemap::RangeMap;
use tracing::{debug, warn};

/// One contiguous run of captured RAM, e.g. a DDR bank file or a minidump segment.
pub struct Chunk {
    pub name: String,
    pub base: u64,
    pub backing: Backing,
}

impl Chunk {
    pub fn end(&self) -> u64 {
        self.base + self.backing.len()
    }
}

/// The physical side of the address space: disjoint chunks keyed by physical address.
#[derive(Default)]
pub struct PhysicalMemory {
    chunks: Vec<Chunk>,
    index: RangeMap<u64, usize>,
}

impl PhysicalMemory {
    pub fn add(&mut self, name: impl Into<String>, base: u64, backing: Backing) -> Result<()> {
        let name = name.into();
        if backing.is_empty() {
            warn!("{name} is empty, not adding it to physical memory");
            return Ok(());
        }
        let end = base
            .checked_add(backing.len())
            .ok_or_else(|| Error::Format(format!("{name} wraps the physical address space")))?;
        if self.index.overlaps(&(base..end)) {
            return Err(Error::Format(format!(
                "{name} ({base:#x}..{end:#x}) overlaps memory that was already added"
            )));
        }
        debug!("adding {name} {base:#x}..{end:#x}");
        self.index.insert(base..end, self.chunks.len());
        self.chunks.push(Chunk {
            name,
            base,
            backing,
        });
        Ok(())
    }

    /// Reads never straddle two chunks, even when the chunks happen to be adjacent.
    pub fn read(&self, addr: u64, len: usize) -> Result<&[u8]> {
        let (range, &i) = self
            .index
            .get_key_value(&addr)
            .ok_or(Error::Unmapped { addr })?;
        let start = (addr - range.start) as usize;
        let available = (range.end - addr) as usize;
        if len > available {
            return Err(Error::OutOfRange { addr, len });
        }
        Ok(&self.chunks[i].backing.bytes()[start..start + len])
    }

    pub fn contains(&self, addr: u64) -> bool {
        self.index.contains_key(&addr)
    }

    /// Chunks ordered by physical address.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.index.iter().map(|(_, &i)| &self.chunks[i])
    }

    pub fn lowest_base(&self) -> Option<u64> {
        self.index.iter().next().map(|(range, _)| range.start)
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_inside_one_chunk() {
        let mut mem = PhysicalMemory::default();
        mem.add("DDRCS0.BIN", 0x8000_0000, Backing::owned((0..=255).collect()))
            .unwrap();
        assert_eq!(mem.read(0x8000_0010, 2).unwrap(), &[0x10, 0x11]);
        assert_eq!(mem.lowest_base(), Some(0x8000_0000));
    }

    #[test]
    fn adjacent_chunks_do_not_merge_reads() {
        let mut mem = PhysicalMemory::default();
        mem.add("a", 0x1000, Backing::owned(vec![1; 0x10])).unwrap();
        mem.add("b", 0x1010, Backing::owned(vec![2; 0x10])).unwrap();
        assert!(matches!(
            mem.read(0x100c, 8),
            Err(Error::OutOfRange { addr: 0x100c, len: 8 })
        ));
        assert_eq!(mem.read(0x1010, 1).unwrap(), &[2]);
        let names: Vec<&str> = mem.chunks().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn overlapping_chunks_are_rejected() {
        let mut mem = PhysicalMemory::default();
        mem.add("a", 0x1000, Backing::owned(vec![0; 0x100])).unwrap();
        assert!(mem.add("b", 0x10f0, Backing::owned(vec![0; 0x100])).is_err());
    }

    #[test]
    fn unmapped_reads_fail() {
        let mem = PhysicalMemory::default();
        assert!(matches!(mem.read(0x42, 1), Err(Error::Unmapped { addr: 0x42 })));
    }
}
