use crate::error::{Error, Result};
use crate::utils;

/// Random access to the raw bytes of an ELF file, usually a memory map.
pub struct Reader<'a> {
    pub little_endian: bool,
    pub sixty_four_bit: bool,
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    /// Note that these functions all return a Result because dumps are sometimes
    /// truncated and we want to continue to work as well as we can when that happens.
    pub fn new(bytes: &'a [u8]) -> Result<Self> {
        // see https://en.wikipedia.org/wiki/Executable_and_Linkable_Format
        utils::require(bytes.len() >= 52, "ELF file is much too small")?;
        utils::require(is_elf(bytes), "not an ELF file (bad magic)")?;

        let ei_class = bytes[0x04];
        let ei_data = bytes[0x05];
        let ei_version = bytes[0x06];
        utils::require(ei_version == 1, &format!("bad elf version: {ei_version}"))?;
        utils::require(
            ei_class == 1 || ei_class == 2,
            &format!("bad elf class: {ei_class}"),
        )?;

        Ok(Reader {
            bytes,
            sixty_four_bit: ei_class == 2,
            little_endian: ei_data == 1,
        })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn slice(&self, offset: usize, size: usize) -> Result<&'a [u8]> {
        offset
            .checked_add(size)
            .and_then(|end| self.bytes.get(offset..end))
            .ok_or_else(|| Error::Format(format!("{size} bytes at offset {offset:#x} are past the end of the file")))
    }

    pub fn read_byte(&self, offset: usize) -> Result<u8> {
        Ok(self.slice(offset, 1)?[0])
    }

    pub fn read_half(&self, offset: usize) -> Result<u16> {
        let slice = self.slice(offset, 2)?;
        let bytes = [slice[0], slice[1]];
        if self.little_endian {
            Ok(u16::from_le_bytes(bytes))
        } else {
            Ok(u16::from_be_bytes(bytes))
        }
    }

    pub fn read_word(&self, offset: usize) -> Result<u32> {
        let mut bytes = [0; 4];
        bytes.copy_from_slice(self.slice(offset, 4)?);
        if self.little_endian {
            Ok(u32::from_le_bytes(bytes))
        } else {
            Ok(u32::from_be_bytes(bytes))
        }
    }

    pub fn read_xword(&self, offset: usize) -> Result<u64> {
        let mut bytes = [0; 8];
        bytes.copy_from_slice(self.slice(offset, 8)?);
        if self.little_endian {
            Ok(u64::from_le_bytes(bytes))
        } else {
            Ok(u64::from_be_bytes(bytes))
        }
    }

    /// Read either a u32 or u64 word depending on whether the file is 64-bit.
    /// But, for sanity, always return the result as 64 bits.
    pub fn read_addr(&self, offset: usize) -> Result<u64> {
        if self.sixty_four_bit {
            self.read_xword(offset)
        } else {
            Ok(self.read_word(offset)? as u64)
        }
    }
}

pub fn is_elf(bytes: &[u8]) -> bool {
    bytes.starts_with(b"\x7fELF")
}

pub struct Stream<'r, 'a> {
    pub reader: &'r Reader<'a>,
    pub offset: usize,
}

impl<'r, 'a> Stream<'r, 'a> {
    pub fn new(reader: &'r Reader<'a>, offset: usize) -> Self {
        Stream { reader, offset }
    }

    pub fn skip(&mut self, count: usize) {
        self.offset += count;
    }

    pub fn read_byte(&mut self) -> Result<u8> {
        let byte = self.reader.read_byte(self.offset)?;
        self.offset += 1;
        Ok(byte)
    }

    pub fn read_half(&mut self) -> Result<u16> {
        let half = self.reader.read_half(self.offset)?;
        self.offset += 2;
        Ok(half)
    }

    pub fn read_word(&mut self) -> Result<u32> {
        let word = self.reader.read_word(self.offset)?;
        self.offset += 4;
        Ok(word)
    }

    pub fn read_xword(&mut self) -> Result<u64> {
        let xword = self.reader.read_xword(self.offset)?;
        self.offset += 8;
        Ok(xword)
    }

    /// Addresses and offsets are both 32 or 64 bits depending on the ELF class.
    pub fn read_addr(&mut self) -> Result<u64> {
        let word = self.reader.read_addr(self.offset)?;
        self.offset += if self.reader.sixty_four_bit { 8 } else { 4 };
        Ok(word)
    }

    pub fn read_offset(&mut self) -> Result<u64> {
        self.read_addr()
    }
}
