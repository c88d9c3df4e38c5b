//! Minidumps arrive as a pile of md_<name>.BIN files. The header's string table says
//! which segments exist and in what order they go back together.
mod reconstruct;
mod strtab;

pub use reconstruct::*;
pub use strtab::*;
