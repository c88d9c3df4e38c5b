use super::{KernelVersion, TypeLayouts};
use crate::error::{Error, Result};
use crate::memory::AddressSpace;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Everything known about the kernel build ahead of time, usually extracted from its
/// vmlinux.
#[derive(Debug, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub kernel_version: Option<KernelVersion>,

    #[serde(default)]
    pub linux_banner: Option<String>,

    #[serde(default = "default_pointer_size")]
    pub pointer_size: usize,

    /// Used when the dump itself can't provide `__per_cpu_offset`.
    #[serde(default)]
    pub per_cpu_offsets: Vec<i64>,

    #[serde(default)]
    pub types: TypeLayouts,
}

fn default_pointer_size() -> usize {
    8
}

impl Metadata {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let metadata = Metadata::from_json(&text)?;
        info!("loaded {} types from {}", metadata.types.len(), path.display());
        Ok(metadata)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// An explicit version wins over the one in the banner.
    pub fn version(&self) -> Result<KernelVersion> {
        match (&self.kernel_version, &self.linux_banner) {
            (Some(version), _) => Ok(*version),
            (None, Some(banner)) => KernelVersion::from_banner(banner),
            (None, None) => Err(Error::Format(
                "metadata has neither kernel_version nor linux_banner".to_string(),
            )),
        }
    }
}

/// Compares the banner the metadata was generated from with the one in the dump at
/// `addr`. A mismatch means offsets may be silently wrong so it is logged loudly, but
/// the caller decides whether to carry on.
pub fn match_banner(expected: &str, space: &AddressSpace, addr: u64) -> Result<bool> {
    let actual = space.read_cstring(addr, expected.len() + 1)?;
    let matched = actual.trim_end() == expected.trim_end();
    if !matched {
        warn!("linux_banner in the dump doesn't match the metadata");
        warn!("   dump: {}", actual.trim_end());
        warn!("   metadata: {}", expected.trim_end());
    }
    Ok(matched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Backing;

    #[test]
    fn version_from_either_field() {
        let metadata = Metadata::from_json(r#"{"kernel_version": "5.4.210"}"#).unwrap();
        assert_eq!(metadata.version().unwrap(), KernelVersion::new(5, 4, 210));
        assert_eq!(metadata.pointer_size, 8);

        let metadata =
            Metadata::from_json(r#"{"linux_banner": "Linux version 4.19.157-perf (x@y) #1"}"#).unwrap();
        assert_eq!(metadata.version().unwrap(), KernelVersion::new(4, 19, 157));

        let metadata = Metadata::from_json("{}").unwrap();
        assert!(metadata.version().is_err());
    }

    #[test]
    fn banner_matching() {
        let banner = "Linux version 5.10.66 (a@b) #1 SMP\n";
        let mut bytes = banner.as_bytes().to_vec();
        bytes.resize(0x100, 0);
        let mut builder = AddressSpace::builder();
        builder.add_ram("ram", 0, Backing::owned(bytes)).unwrap();
        builder.identity_map();
        let space = builder.build().unwrap();

        assert!(match_banner("Linux version 5.10.66 (a@b) #1 SMP", &space, 0).unwrap());
        assert!(!match_banner("Linux version 5.10.67 (a@b) #1 SMP", &space, 0).unwrap());
    }
}
