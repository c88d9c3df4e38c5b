use std::fmt;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Endian {
    #[default]
    Little,
    Big,
}

impl Endian {
    /// Decodes an unsigned integer of 1 to 8 bytes.
    pub fn decode(self, bytes: &[u8]) -> u64 {
        let fold = |acc: u64, b: &u8| (acc << 8) | *b as u64;
        match self {
            Endian::Little => bytes.iter().rev().fold(0, fold),
            Endian::Big => bytes.iter().fold(0, fold),
        }
    }
}

/// Maps `length` bytes of kernel virtual addresses onto physical memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryRegion {
    pub virtual_base: u64,
    pub physical_base: u64,
    pub length: u64,
    pub endian: Endian,
}

impl MemoryRegion {
    pub fn new(virtual_base: u64, physical_base: u64, length: u64) -> Self {
        MemoryRegion {
            virtual_base,
            physical_base,
            length,
            endian: Endian::Little,
        }
    }

    pub fn big_endian(mut self) -> Self {
        self.endian = Endian::Big;
        self
    }

    pub fn virtual_end(&self) -> u64 {
        self.virtual_base + self.length
    }

    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.virtual_base && addr < self.virtual_end()
    }

    /// Caller must have checked `contains`.
    pub fn to_physical(&self, addr: u64) -> u64 {
        self.physical_base + (addr - self.virtual_base)
    }
}

impl fmt::Display for MemoryRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:#x}..{:#x} -> {:#x}",
            self.virtual_base,
            self.virtual_end(),
            self.physical_base
        )
    }
}
