use super::{Backing, Endian, MemoryRegion, PerCpuOffsetTable, PhysicalMemory};
use crate::error::{Error, Result};
use rangemap::RangeMap;
use tracing::{debug, info};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddrKind {
    Virtual,
    Physical,
}

/// Translates kernel virtual addresses to physical ones and reads the backing bytes.
/// Immutable once built so it can be shared freely between report threads.
pub struct AddressSpace {
    physical: PhysicalMemory,
    regions: Vec<MemoryRegion>,
    index: RangeMap<u64, usize>,
    per_cpu: PerCpuOffsetTable,
    pointer_size: usize,
}

impl AddressSpace {
    pub fn builder() -> AddressSpaceBuilder {
        AddressSpaceBuilder::default()
    }

    pub fn pointer_size(&self) -> usize {
        self.pointer_size
    }

    /// Regions ordered by virtual base.
    pub fn regions(&self) -> &[MemoryRegion] {
        &self.regions
    }

    pub fn physical(&self) -> &PhysicalMemory {
        &self.physical
    }

    pub fn per_cpu_offsets(&self) -> &PerCpuOffsetTable {
        &self.per_cpu
    }

    /// Installs the per-cpu table once it has been read out of the dump itself.
    pub fn set_per_cpu_offsets(&mut self, table: PerCpuOffsetTable) {
        self.per_cpu = table;
    }

    pub fn region_of(&self, addr: u64) -> Result<&MemoryRegion> {
        self.index
            .get(&addr)
            .map(|&i| &self.regions[i])
            .ok_or(Error::Unmapped { addr })
    }

    pub fn translate(&self, addr: u64) -> Result<u64> {
        self.region_of(addr).map(|r| r.to_physical(addr))
    }

    pub fn is_mapped(&self, addr: u64) -> bool {
        self.index.contains_key(&addr)
    }

    pub fn read(&self, addr: u64, len: usize, kind: AddrKind) -> Result<&[u8]> {
        match kind {
            AddrKind::Virtual => self.read_virtual(addr, len),
            AddrKind::Physical => self.read_physical(addr, len),
        }
    }

    /// Reads may not run past the end of the region that `addr` falls in.
    pub fn read_virtual(&self, addr: u64, len: usize) -> Result<&[u8]> {
        let region = self.region_of(addr)?;
        if len as u64 > region.virtual_end() - addr {
            return Err(Error::OutOfRange { addr, len });
        }
        self.physical.read(region.to_physical(addr), len)
    }

    pub fn read_physical(&self, addr: u64, len: usize) -> Result<&[u8]> {
        self.physical.read(addr, len)
    }

    /// Reads an unsigned integer of `width` bytes using the region's byte order.
    pub fn read_uint(&self, addr: u64, width: usize) -> Result<u64> {
        if !matches!(width, 1 | 2 | 4 | 8) {
            return Err(Error::Format(format!("can't read a {width} byte integer")));
        }
        let endian = self.region_of(addr)?.endian;
        let bytes = self.read_virtual(addr, width)?;
        Ok(endian.decode(bytes))
    }

    pub fn read_signed(&self, addr: u64, width: usize) -> Result<i64> {
        let value = self.read_uint(addr, width)?;
        let shift = 64 - 8 * width as u32;
        Ok(((value << shift) as i64) >> shift)
    }

    pub fn read_u8(&self, addr: u64) -> Result<u8> {
        self.read_uint(addr, 1).map(|v| v as u8)
    }

    pub fn read_u16(&self, addr: u64) -> Result<u16> {
        self.read_uint(addr, 2).map(|v| v as u16)
    }

    pub fn read_u32(&self, addr: u64) -> Result<u32> {
        self.read_uint(addr, 4).map(|v| v as u32)
    }

    pub fn read_u64(&self, addr: u64) -> Result<u64> {
        self.read_uint(addr, 8)
    }

    /// Ok(0) is a real NULL pointer, failures to read are always errors.
    pub fn read_pointer(&self, addr: u64) -> Result<u64> {
        self.read_uint(addr, self.pointer_size)
    }

    /// Reads the pointer `offset` bytes into the struct at `addr`.
    pub fn read_pointer_at(&self, addr: u64, offset: u64) -> Result<u64> {
        self.read_pointer(offset_addr(addr, offset)?)
    }

    /// Reads a NUL terminated string of at most `max_len` bytes. Non-ASCII bytes are
    /// dropped. Strings that run into the end of the region are truncated there.
    pub fn read_cstring(&self, addr: u64, max_len: usize) -> Result<String> {
        let region = self.region_of(addr)?;
        let len = max_len.min((region.virtual_end() - addr) as usize);
        let bytes = self.read_virtual(addr, len)?;
        let end = memchr::memchr(0, bytes).unwrap_or(bytes.len());
        Ok(bytes[..end]
            .iter()
            .filter(|b| b.is_ascii())
            .map(|&b| b as char)
            .collect())
    }

    /// Address of `cpu`'s copy of the per-cpu variable at `addr`.
    pub fn per_cpu(&self, addr: u64, cpu: usize) -> Result<u64> {
        self.per_cpu.apply(addr, cpu)
    }
}

/// `addr + offset` for addresses that came out of the dump. Garbage pointers near the top
/// of the address space are reported as unmapped instead of wrapping.
pub fn offset_addr(addr: u64, offset: u64) -> Result<u64> {
    addr.checked_add(offset).ok_or(Error::Unmapped { addr })
}

/// Collects RAM and the virtual mappings over it. Linear and identity mappings are
/// expanded against whatever RAM has been added by the time `build` is called.
#[derive(Default)]
pub struct AddressSpaceBuilder {
    physical: PhysicalMemory,
    regions: Vec<MemoryRegion>,
    linear: Option<(u64, u64)>,
    kimage_voffset: Option<u64>,
    identity: bool,
    endian: Endian,
    pointer_size: Option<usize>,
    per_cpu: PerCpuOffsetTable,
}

impl AddressSpaceBuilder {
    pub fn pointer_size(&mut self, size: usize) -> &mut Self {
        self.pointer_size = Some(size);
        self
    }

    pub fn endian(&mut self, endian: Endian) -> &mut Self {
        self.endian = endian;
        self
    }

    pub fn add_ram(&mut self, name: impl Into<String>, base: u64, backing: Backing) -> Result<&mut Self> {
        self.physical.add(name, base, backing)?;
        Ok(self)
    }

    pub fn add_region(&mut self, region: MemoryRegion) -> &mut Self {
        self.regions.push(region);
        self
    }

    /// Maps every chunk at or above `phys_offset` to `page_offset + (phys - phys_offset)`.
    pub fn linear_map(&mut self, page_offset: u64, phys_offset: u64) -> &mut Self {
        self.linear = Some((page_offset, phys_offset));
        self
    }

    /// Maps every chunk again at `phys + voffset`, where arm64 links the kernel image
    /// separately from the linear map (`kimage_voffset` in the kernel).
    pub fn kimage_map(&mut self, voffset: u64) -> &mut Self {
        self.kimage_voffset = Some(voffset);
        self
    }

    /// Maps every chunk at its own physical address.
    pub fn identity_map(&mut self) -> &mut Self {
        self.identity = true;
        self
    }

    pub fn per_cpu(&mut self, table: PerCpuOffsetTable) -> &mut Self {
        self.per_cpu = table;
        self
    }

    pub fn has_ram(&self) -> bool {
        !self.physical.is_empty()
    }

    pub fn build(self) -> Result<AddressSpace> {
        let pointer_size = self.pointer_size.unwrap_or(8);
        if pointer_size != 4 && pointer_size != 8 {
            return Err(Error::Format(format!("pointer size must be 4 or 8, not {pointer_size}")));
        }

        let mut regions = self.regions;
        for chunk in self.physical.chunks() {
            let len = chunk.backing.len();
            if let Some((page_offset, phys_offset)) = self.linear
                && chunk.base >= phys_offset
            {
                let virtual_base = page_offset.checked_add(chunk.base - phys_offset).ok_or_else(|| {
                    Error::Format(format!("linear map of {:#x} wraps past the top of memory", chunk.base))
                })?;
                let region = MemoryRegion::new(virtual_base, chunk.base, len);
                regions.push(MemoryRegion { endian: self.endian, ..region });
            }
            if let Some(voffset) = self.kimage_voffset {
                let virtual_base = chunk.base.checked_add(voffset).ok_or_else(|| {
                    Error::Format(format!("kernel image map of {:#x} wraps past the top of memory", chunk.base))
                })?;
                let region = MemoryRegion::new(virtual_base, chunk.base, len);
                regions.push(MemoryRegion { endian: self.endian, ..region });
            }
            if self.identity {
                let region = MemoryRegion::new(chunk.base, chunk.base, len);
                regions.push(MemoryRegion { endian: self.endian, ..region });
            }
        }
        regions.retain(|r| r.length > 0);
        regions.sort_by_key(|r| r.virtual_base);

        let mut index = RangeMap::new();
        for (i, region) in regions.iter().enumerate() {
            let end = region
                .virtual_base
                .checked_add(region.length)
                .ok_or_else(|| Error::Format(format!("region {:#x} wraps", region.virtual_base)))?;
            if index.overlaps(&(region.virtual_base..end)) {
                return Err(Error::Format(format!("region {region} overlaps another region")));
            }
            debug!("region {region}");
            index.insert(region.virtual_base..end, i);
        }
        info!(
            "address space has {} regions over {} chunks of RAM",
            regions.len(),
            self.physical.chunks().count()
        );

        Ok(AddressSpace {
            physical: self.physical,
            regions,
            index,
            per_cpu: self.per_cpu,
            pointer_size,
        })
    }
}
