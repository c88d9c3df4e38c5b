//! ELF core dumps, e.g. from /proc/vmcore or a crash kernel.
use super::{ElfHeader, LoadSegment, ProgramHeader, Reader, SegmentType};
use crate::error::{Error, Result};
use crate::memory::{self, AddressSpaceBuilder, Backing, Endian, MemoryRegion};
use memmap2::Mmap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct ElfCore {
    pub path: PathBuf,
    pub header: ElfHeader,
    pub loads: Vec<LoadSegment>,
    pub sixty_four_bit: bool,
    pub little_endian: bool,
    map: Arc<Mmap>,
}

impl ElfCore {
    pub fn open(path: &Path) -> Result<Self> {
        let map = Arc::new(memory::map_file(path)?);
        let reader = Reader::new(&map)?;
        let header = ElfHeader::new(&reader)?;
        if !header.is_core() {
            warn!("{} is not a core file (type {})", path.display(), header.etype);
        }

        let loads = ElfCore::load_loads(&reader, &header);
        if loads.is_empty() {
            return Err(Error::Format(format!("{} has no load segments", path.display())));
        }
        let (sixty_four_bit, little_endian) = (reader.sixty_four_bit, reader.little_endian);
        Ok(ElfCore {
            path: path.to_path_buf(),
            header,
            loads,
            sixty_four_bit,
            little_endian,
            map,
        })
    }

    pub fn pointer_size(&self) -> usize {
        if self.sixty_four_bit { 8 } else { 4 }
    }

    pub fn endian(&self) -> Endian {
        if self.little_endian {
            Endian::Little
        } else {
            Endian::Big
        }
    }

    /// Some producers leave p_paddr zeroed. When that happens the virtual addresses are
    /// used as physical addresses so the segments still land in distinct places.
    fn physical_base(&self, load: &LoadSegment) -> u64 {
        if self.missing_paddrs() {
            load.vbytes.start.0
        } else {
            load.pbytes.start.0
        }
    }

    fn missing_paddrs(&self) -> bool {
        self.loads.len() > 1 && self.loads.iter().all(|l| l.pbytes.start.0 == 0)
    }

    pub fn regions(&self) -> Vec<MemoryRegion> {
        self.loads
            .iter()
            .map(|load| MemoryRegion {
                endian: self.endian(),
                ..MemoryRegion::new(load.vbytes.start.0, self.physical_base(load), load.vbytes.size)
            })
            .collect()
    }

    /// Adds each load segment as RAM plus the virtual region that maps it.
    pub fn add_to(&self, builder: &mut AddressSpaceBuilder) -> Result<()> {
        if self.missing_paddrs() {
            warn!("{} has no physical addresses, using virtual ones", self.path.display());
        }
        builder.pointer_size(self.pointer_size()).endian(self.endian());
        for (i, (load, region)) in self.loads.iter().zip(self.regions()).enumerate() {
            let backing = Backing::window(
                self.map.clone(),
                load.obytes.start.0 as usize,
                load.obytes.size as usize,
            )?;
            builder.add_ram(format!("load{i}"), region.physical_base, backing)?;
            builder.add_region(region);
        }
        Ok(())
    }

    fn load_loads(reader: &Reader, header: &ElfHeader) -> Vec<LoadSegment> {
        let mut loads = Vec::new();
        let mut offset = header.ph_offset as usize;

        for _ in 0..header.num_ph_entries {
            match ProgramHeader::new(reader, offset) {
                Ok(mut ph) if ph.stype == SegmentType::Load => {
                    // Truncated cores are common so keep whatever part of the segment made it.
                    let available = (reader.len() as u64).saturating_sub(ph.offset);
                    if ph.file_size > available {
                        warn!(
                            "load segment at {:#x} is truncated ({} of {} bytes)",
                            ph.vaddr, available, ph.file_size
                        );
                        ph.file_size = available;
                    }
                    if ph.mem_size > ph.file_size {
                        debug!(
                            "load segment at {:#x} has {} bytes that aren't in the file",
                            ph.vaddr,
                            ph.mem_size - ph.file_size
                        );
                    }
                    if ph.file_size > 0 {
                        loads.push(LoadSegment::from_header(&ph));
                    }
                }
                Ok(_) => (),
                Err(err) => warn!("failed to read program header at {offset}: {err}"),
            }
            offset += header.ph_entry_size as usize;
        }
        loads
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::AddressSpace;
    use std::io::Write;

    /// A little endian 64-bit core with one load segment per entry of (vaddr, paddr, bytes).
    fn write_core(loads: &[(u64, u64, &[u8])]) -> tempfile::NamedTempFile {
        let mut data = vec![0x7f, b'E', b'L', b'F', 2, 1, 1];
        data.resize(16, 0);
        data.extend(4u16.to_le_bytes()); // ET_CORE
        data.extend(183u16.to_le_bytes()); // aarch64
        data.extend(1u32.to_le_bytes());
        data.extend(0u64.to_le_bytes()); // entry
        data.extend(64u64.to_le_bytes()); // phoff
        data.extend(0u64.to_le_bytes()); // shoff
        data.extend(0u32.to_le_bytes());
        data.extend(64u16.to_le_bytes());
        data.extend(56u16.to_le_bytes());
        data.extend((loads.len() as u16).to_le_bytes());
        data.extend([0u8; 6]);

        let mut offset = 64 + 56 * loads.len() as u64;
        for (vaddr, paddr, bytes) in loads {
            data.extend(1u32.to_le_bytes()); // PT_LOAD
            data.extend(4u32.to_le_bytes()); // readable
            for field in [offset, *vaddr, *paddr, bytes.len() as u64, bytes.len() as u64, 0x1000] {
                data.extend(field.to_le_bytes());
            }
            offset += bytes.len() as u64;
        }
        for (_, _, bytes) in loads {
            data.extend(*bytes);
        }

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&data).unwrap();
        file
    }

    #[test]
    fn loads_become_regions() {
        let file = write_core(&[
            (0xffff_ff80_0000_0000, 0x8000_0000, b"linux"),
            (0xffff_ff80_1000_0000, 0x9000_0000, b"banner"),
        ]);
        let core = ElfCore::open(file.path()).unwrap();
        assert!(core.header.is_core());
        assert_eq!(core.loads.len(), 2);
        assert_eq!(core.loads[1].flags(), "r--");

        let mut builder = AddressSpace::builder();
        core.add_to(&mut builder).unwrap();
        let space = builder.build().unwrap();
        assert_eq!(space.translate(0xffff_ff80_1000_0002).unwrap(), 0x9000_0002);
        assert_eq!(space.read_cstring(0xffff_ff80_1000_0000, 6).unwrap(), "banner");
        assert_eq!(space.read_physical(0x8000_0000, 5).unwrap(), b"linux");
    }

    #[test]
    fn zero_paddrs_fall_back_to_vaddrs() {
        let file = write_core(&[(0x1000, 0, b"a"), (0x2000, 0, b"b")]);
        let core = ElfCore::open(file.path()).unwrap();
        let bases: Vec<u64> = core.regions().iter().map(|r| r.physical_base).collect();
        assert_eq!(bases, [0x1000, 0x2000]);
    }

    #[test]
    fn rejects_non_elf() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0u8; 128]).unwrap();
        assert!(ElfCore::open(file.path()).is_err());
    }
}
