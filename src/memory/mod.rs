//! Address space translation: physical RAM captured in dump files plus the virtual
//! regions the kernel had mapped over it.
mod autodump;
mod backing;
mod kaslr;
mod percpu;
mod physical;
mod region;
mod space;

pub use autodump::{DumpFile, discover, is_ramdump_file};
pub use backing::{Backing, map_file};
pub use kaslr::{KASLR_MAGIC, read_kaslr_offset};
pub use percpu::{PerCpuOffsetTable, present_cpus};
pub use physical::{Chunk, PhysicalMemory};
pub use region::{Endian, MemoryRegion};
pub use space::{AddrKind, AddressSpace, AddressSpaceBuilder, offset_addr};
