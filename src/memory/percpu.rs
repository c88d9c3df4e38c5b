use super::{AddressSpace, offset_addr};
use crate::debug::{KernelVersion, SymbolLookup, TypeLayouts};
use crate::error::{Error, Result};

/// Offsets that turn the address of a per-cpu variable into the address of one
/// cpu's copy. The kernel keeps these in `__per_cpu_offset`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PerCpuOffsetTable {
    offsets: Vec<i64>,
}

impl PerCpuOffsetTable {
    pub fn new(offsets: Vec<i64>) -> Self {
        PerCpuOffsetTable { offsets }
    }

    /// Reads `cpus` signed longs starting at `array` (usually the address of `__per_cpu_offset`).
    pub fn read_from(space: &AddressSpace, array: u64, cpus: usize) -> Result<Self> {
        let width = space.pointer_size();
        let offsets = (0..cpus)
            .map(|cpu| space.read_signed(array + (cpu * width) as u64, width))
            .collect::<Result<Vec<_>>>()?;
        Ok(PerCpuOffsetTable { offsets })
    }

    /// Reads the table out of the dump via the `__per_cpu_offset` symbol.
    pub fn from_symbol(space: &AddressSpace, symbols: &dyn SymbolLookup, cpus: usize) -> Result<Self> {
        let array = symbols.address_of("__per_cpu_offset")?;
        PerCpuOffsetTable::read_from(space, array, cpus)
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn offset(&self, cpu: usize) -> Option<i64> {
        self.offsets.get(cpu).copied()
    }

    pub fn apply(&self, addr: u64, cpu: usize) -> Result<u64> {
        let offset = self.offset(cpu).ok_or(Error::UnknownCpu(cpu))?;
        Ok(addr.wrapping_add_signed(offset))
    }
}

/// Counts the bits of the present cpu mask. Only the first word is read so at most
/// 32 or 64 cpus are found. The mask is `__cpu_present_mask` from 4.5 and
/// `cpu_present_bits` before that.
pub fn present_cpus(
    space: &AddressSpace,
    symbols: &dyn SymbolLookup,
    types: &TypeLayouts,
    version: KernelVersion,
) -> Result<usize> {
    let bits = if version >= KernelVersion::new(4, 5, 0) {
        let mask = symbols.address_of("__cpu_present_mask")?;
        let offset = types.field_offset("struct cpumask", "bits").unwrap_or(0);
        space.read_pointer(offset_addr(mask, offset)?)?
    } else {
        space.read_pointer(symbols.address_of("cpu_present_bits")?)?
    };
    match bits.count_ones() {
        0 => Err(Error::corrupt(bits, "no cpus are present")),
        count => Ok(count as usize),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug::{Symbol, SymbolTable};
    use crate::memory::Backing;

    #[test]
    fn offsets_may_be_negative() {
        let table = PerCpuOffsetTable::new(vec![0x1000, -0x1000]);
        assert_eq!(table.apply(0x8000, 0).unwrap(), 0x9000);
        assert_eq!(table.apply(0x8000, 1).unwrap(), 0x7000);
        assert!(matches!(table.apply(0x8000, 2), Err(Error::UnknownCpu(2))));
    }

    #[test]
    fn read_from_dump() {
        let mut bytes = Vec::new();
        bytes.extend(0x10_0000i64.to_le_bytes());
        bytes.extend((-0x20i64).to_le_bytes());
        let mut builder = AddressSpace::builder();
        builder.add_ram("ram", 0x8000, Backing::owned(bytes)).unwrap();
        builder.identity_map();
        let space = builder.build().unwrap();
        let symbols = SymbolTable::new(vec![Symbol {
            addr: 0x8000,
            kind: 'D',
            name: "__per_cpu_offset".to_string(),
        }]);

        let table = PerCpuOffsetTable::from_symbol(&space, &symbols, 2).unwrap();
        assert_eq!(table.offset(1), Some(-0x20));
        assert!(PerCpuOffsetTable::from_symbol(&space, &symbols, 3).is_err());
    }

    #[test]
    fn present_cpus_from_either_mask() {
        let mut bytes = vec![0u8; 0x20];
        bytes[0..8].copy_from_slice(&0b1111u64.to_le_bytes());
        bytes[0x10..0x18].copy_from_slice(&0xffu64.to_le_bytes());
        let mut builder = AddressSpace::builder();
        builder.add_ram("ram", 0x8000, Backing::owned(bytes)).unwrap();
        builder.identity_map();
        let space = builder.build().unwrap();
        let symbols = SymbolTable::new(vec![
            Symbol {
                addr: 0x8000,
                kind: 'D',
                name: "cpu_present_bits".to_string(),
            },
            Symbol {
                addr: 0x8010,
                kind: 'D',
                name: "__cpu_present_mask".to_string(),
            },
        ]);
        let types = TypeLayouts::default();

        assert_eq!(present_cpus(&space, &symbols, &types, KernelVersion::new(4, 4, 0)).unwrap(), 4);
        assert_eq!(present_cpus(&space, &symbols, &types, KernelVersion::new(5, 10, 0)).unwrap(), 8);

        let empty = SymbolTable::new(vec![Symbol {
            addr: 0x8018,
            kind: 'D',
            name: "__cpu_present_mask".to_string(),
        }]);
        assert!(present_cpus(&space, &empty, &types, KernelVersion::new(5, 10, 0)).is_err());
    }
}
