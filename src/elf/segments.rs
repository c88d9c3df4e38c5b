//! Program headers. In a dump each PT_LOAD says which file bytes hold which RAM.
use super::{Reader, Stream};
use crate::elf::{Bytes, Offset, PhysAddr, VirtualAddr};
use crate::error::Result;

const PT_LOAD: u32 = 1;
const PT_NOTE: u32 = 4;

const PF_X: u32 = 0x1;
const PF_W: u32 = 0x2;
const PF_R: u32 = 0x4;

/// Dumps only ever carry loads and notes (registers, vmcoreinfo).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SegmentType {
    Load,
    Note,
    Other(u32),
}

impl From<u32> for SegmentType {
    fn from(value: u32) -> Self {
        match value {
            PT_LOAD => SegmentType::Load,
            PT_NOTE => SegmentType::Note,
            other => SegmentType::Other(other),
        }
    }
}

/// Elf64_Phdr or Elf32_Phdr.
#[derive(Clone, Debug)]
pub struct ProgramHeader {
    pub stype: SegmentType,
    pub flags: u32,
    pub offset: u64,
    pub vaddr: u64,
    pub paddr: u64,

    /// Bytes present in the file, may be less than `mem_size`.
    pub file_size: u64,
    pub mem_size: u64,
}

impl ProgramHeader {
    pub fn new(reader: &Reader, offset: usize) -> Result<Self> {
        let mut s = Stream::new(reader, offset);
        let stype = SegmentType::from(s.read_word()?);

        // 64-bit headers move p_flags up next to p_type so the xwords stay aligned.
        if reader.sixty_four_bit {
            let flags = s.read_word()?;
            Ok(ProgramHeader {
                stype,
                flags,
                offset: s.read_offset()?,
                vaddr: s.read_addr()?,
                paddr: s.read_addr()?,
                file_size: s.read_xword()?,
                mem_size: s.read_xword()?,
            })
        } else {
            let offset = s.read_offset()?;
            let vaddr = s.read_addr()?;
            let paddr = s.read_addr()?;
            let file_size = s.read_word()? as u64;
            let mem_size = s.read_word()? as u64;
            Ok(ProgramHeader {
                stype,
                flags: s.read_word()?,
                offset,
                vaddr,
                paddr,
                file_size,
                mem_size,
            })
        }
    }
}

/// A PT_LOAD segment: one run of dumped RAM, addressable three ways.
pub struct LoadSegment {
    pub obytes: Bytes<Offset>,
    pub vbytes: Bytes<VirtualAddr>,
    pub pbytes: Bytes<PhysAddr>,
    pub flags: u32,
}

impl LoadSegment {
    pub fn from_header(ph: &ProgramHeader) -> Self {
        LoadSegment {
            obytes: Bytes::new(Offset(ph.offset), ph.file_size),
            vbytes: Bytes::new(VirtualAddr(ph.vaddr), ph.file_size),
            pbytes: Bytes::new(PhysAddr(ph.paddr), ph.file_size),
            flags: ph.flags,
        }
    }

    /// ls style, e.g. "rw-".
    pub fn flags(&self) -> String {
        [(PF_R, 'r'), (PF_W, 'w'), (PF_X, 'x')]
            .iter()
            .map(|&(bit, ch)| if self.flags & bit != 0 { ch } else { '-' })
            .collect()
    }
}
