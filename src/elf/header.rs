use super::{Reader, Stream};
use crate::error::Result;
use crate::utils;

pub const ET_CORE: u16 = 4;

/// Elf64_Ehdr or Elf32_Ehdr. Only the fields needed to find the program headers are
/// kept around.
#[derive(Debug)]
pub struct ElfHeader {
    pub etype: u16,
    pub machine: u16,
    pub entry: u64,
    pub ph_offset: u64,
    pub sh_offset: u64,
    pub flags: u32,
    pub header_size: u16,
    pub ph_entry_size: u16,
    pub num_ph_entries: u16,
    pub sh_entry_size: u16,
    pub num_sh_entries: u16,
    pub string_table_index: u16,
}

impl ElfHeader {
    pub fn new(reader: &Reader) -> Result<Self> {
        // Field order is the same for 32 and 64-bit files, only the widths change.
        let mut s = Stream::new(reader, 0x10);
        let etype = s.read_half()?;
        let machine = s.read_half()?;
        let _version = s.read_word()?;
        let entry = s.read_addr()?;
        let ph_offset = s.read_offset()?;
        let sh_offset = s.read_offset()?;
        let flags = s.read_word()?;
        let header_size = s.read_half()?;
        let ph_entry_size = s.read_half()?;
        let num_ph_entries = s.read_half()?;
        let sh_entry_size = s.read_half()?;
        let num_sh_entries = s.read_half()?;
        let string_table_index = s.read_half()?;

        let min_entry = if reader.sixty_four_bit { 56 } else { 32 };
        utils::require(
            num_ph_entries == 0 || ph_entry_size as usize >= min_entry,
            &format!("program header entries are too small: {ph_entry_size}"),
        )?;

        Ok(ElfHeader {
            etype,
            machine,
            entry,
            ph_offset,
            sh_offset,
            flags,
            header_size,
            ph_entry_size,
            num_ph_entries,
            sh_entry_size,
            num_sh_entries,
            string_table_index,
        })
    }

    pub fn is_core(&self) -> bool {
        self.etype == ET_CORE
    }
}
