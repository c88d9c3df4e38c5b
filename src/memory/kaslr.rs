use super::{AddressSpace, Endian, offset_addr};
use crate::error::Result;
use tracing::{info, warn};

/// Written by the bootloader in front of the KASLR slide it picked.
pub const KASLR_MAGIC: u32 = 0xdead_4ead;

/// Reads the KASLR slide the bootloader left at physical address `addr`: a u32 magic
/// followed by the u64 offset. None when the magic isn't there.
pub fn read_kaslr_offset(space: &AddressSpace, addr: u64, endian: Endian) -> Result<Option<u64>> {
    let magic = endian.decode(space.read_physical(addr, 4)?) as u32;
    if magic != KASLR_MAGIC {
        warn!("no KASLR magic at {addr:#x} (found {magic:#x})");
        return Ok(None);
    }
    let offset = endian.decode(space.read_physical(offset_addr(addr, 4)?, 8)?);
    info!("KASLR offset is {offset:#x}");
    Ok(Some(offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Backing;

    fn imem(bytes: &[u8]) -> AddressSpace {
        let mut image = vec![0u8; 0x100];
        image[0x10..0x10 + bytes.len()].copy_from_slice(bytes);
        let mut builder = AddressSpace::builder();
        builder.add_ram("OCIMEM.BIN", 0x1466_0000, Backing::owned(image)).unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn offset_follows_the_magic() {
        let mut bytes = KASLR_MAGIC.to_le_bytes().to_vec();
        bytes.extend_from_slice(&0x1a_0000u64.to_le_bytes());
        let space = imem(&bytes);
        assert_eq!(read_kaslr_offset(&space, 0x1466_0010, Endian::Little).unwrap(), Some(0x1a_0000));
    }

    #[test]
    fn wrong_magic_is_no_offset() {
        let space = imem(&[0xad, 0xde, 0, 0, 1, 2, 3, 4]);
        assert_eq!(read_kaslr_offset(&space, 0x1466_0010, Endian::Little).unwrap(), None);
        assert!(read_kaslr_offset(&space, 0x2000, Endian::Little).is_err());
    }
}
