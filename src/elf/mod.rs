//! Just enough ELF to use core dumps as a RAM source. A core's ELF header points at
//! the program headers and each PT_LOAD program header says which file bytes hold
//! which virtual and physical addresses.
//! Quick ELF reference: https://gist.github.com/x0nu11byt3/bcb35c3de461e5fb66173071a2379779
pub mod elf_file;
pub mod header;
pub mod io;
pub mod primitives;
pub mod segments;

pub use elf_file::*;
pub use header::*;
pub use io::*;
pub use primitives::*;
pub use segments::*;
