//! Handlers for the subcommands, e.g. `run` and `translate`.
pub mod elf;
pub mod memory;
pub mod minidump;
pub mod reports;
pub mod session;

pub use elf::*;
pub use memory::*;
pub use minidump::*;
pub use reports::*;
pub use session::*;
