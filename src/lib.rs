//! Postmortem analysis of Linux kernel RAM dumps: turns raw physical memory plus
//! separately supplied type and symbol information into per-subsystem text reports.
pub mod debug;
pub mod elf;
pub mod error;
pub mod memory;
pub mod minidump;
pub mod reports;
pub mod utils;
pub mod walk;

pub use error::{Error, Result};
