use crate::debug::{KernelVersion, VersionRange};
use std::path::PathBuf;
use thiserror::Error;

/// Almost everything here is recoverable: dumps are routinely partial or corrupted and
/// callers are expected to skip the field, branch, or report that failed and keep going.
#[derive(Debug, Error)]
pub enum Error {
    #[error("address {addr:#x} is not mapped")]
    Unmapped { addr: u64 },

    #[error("read of {len} bytes at {addr:#x} crosses the end of its region")]
    OutOfRange { addr: u64, len: usize },

    #[error("unknown type: {0}")]
    UnknownType(String),

    #[error("unknown field `{field}` in {type_name}")]
    UnknownField { type_name: String, field: String },

    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("no per-cpu offset for cpu {0}")]
    UnknownCpu(usize),

    #[error("corrupt structure at {addr:#x}: {reason}")]
    CorruptStructure { addr: u64, reason: String },

    #[error("segment {name} is missing ({})", path.display())]
    SegmentMissing { name: String, path: PathBuf },

    #[error("walk aborted")]
    Aborted,

    #[error("report {0} panicked")]
    Panicked(String),

    #[error("kernel {version} is outside the supported range {range}")]
    UnsupportedVersion {
        version: KernelVersion,
        range: VersionRange,
    },

    #[error("malformed input: {0}")]
    Format(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn corrupt(addr: u64, reason: impl Into<String>) -> Self {
        Error::CorruptStructure {
            addr,
            reason: reason.into(),
        }
    }

    /// False only for problems with the inputs themselves (unreadable files, bad
    /// metadata), never for problems found inside the dump.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::Io(_) | Error::Json(_) | Error::Format(_))
    }

    pub fn is_unmapped(&self) -> bool {
        matches!(self, Error::Unmapped { .. } | Error::OutOfRange { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dump_problems_are_recoverable() {
        assert!(Error::Unmapped { addr: 0x1000 }.is_recoverable());
        assert!(Error::corrupt(0x10, "cycle").is_recoverable());
        assert!(
            Error::UnknownField {
                type_name: "struct module".into(),
                field: "mem".into()
            }
            .is_recoverable()
        );
        assert!(!Error::Format("bad magic".into()).is_recoverable());
    }

    #[test]
    fn unmapped_covers_boundary_reads() {
        assert!(Error::OutOfRange { addr: 0x1ff8, len: 16 }.is_unmapped());
        assert!(!Error::UnknownSymbol("modules".into()).is_unmapped());
    }

    #[test]
    fn error_is_not_found() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        assert!(Error::Io(io_err).is_not_found());

        let other = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(!Error::Io(other).is_not_found());
    }
}
