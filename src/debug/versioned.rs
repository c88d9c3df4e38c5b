use super::{FieldLayout, KernelVersion, TypeLayouts, VersionRange};
use crate::error::{Error, Result};
use std::collections::HashMap;
use tracing::debug;

/// One way a logical field may be spelled in some range of kernels.
#[derive(Clone, Copy, Debug)]
pub struct Candidate {
    pub range: VersionRange,
    pub type_name: &'static str,
    pub field: &'static str,
}

impl Candidate {
    pub const fn new(range: VersionRange, type_name: &'static str, field: &'static str) -> Self {
        Candidate {
            range,
            type_name,
            field,
        }
    }
}

/// A logical key, e.g. "module.base", and the spellings it has had over time.
#[derive(Clone, Copy, Debug)]
pub struct LayoutEntry {
    pub key: &'static str,
    pub candidates: &'static [Candidate],
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedField {
    pub type_name: &'static str,
    pub field: &'static str,
    pub layout: FieldLayout,
}

/// Version dependent field names resolved once for a session so reports don't have
/// to branch on the kernel version themselves.
#[derive(Clone, Debug)]
pub struct VersionedLayout {
    version: KernelVersion,
    fields: HashMap<&'static str, ResolvedField>,
    missing: Vec<&'static str>,
}

impl VersionedLayout {
    /// For each entry the first candidate whose range covers `version` and whose field
    /// exists in `types` wins. Keys with no usable candidate are remembered as missing.
    pub fn resolve(table: &[LayoutEntry], version: KernelVersion, types: &TypeLayouts) -> Self {
        let mut fields = HashMap::new();
        let mut missing = Vec::new();
        for entry in table {
            let found = entry
                .candidates
                .iter()
                .filter(|c| c.range.contains(version))
                .find_map(|c| match types.field(c.type_name, c.field) {
                    Ok(layout) => Some(ResolvedField {
                        type_name: c.type_name,
                        field: c.field,
                        layout,
                    }),
                    Err(err) => {
                        debug!("{}: {err}", entry.key);
                        None
                    }
                });
            match found {
                Some(resolved) => {
                    fields.insert(entry.key, resolved);
                }
                None => missing.push(entry.key),
            }
        }
        VersionedLayout {
            version,
            fields,
            missing,
        }
    }

    pub fn version(&self) -> KernelVersion {
        self.version
    }

    pub fn get(&self, key: &str) -> Result<&ResolvedField> {
        self.fields.get(key).ok_or_else(|| Error::UnknownField {
            type_name: format!("layout for {}", self.version),
            field: key.to_string(),
        })
    }

    pub fn offset(&self, key: &str) -> Result<u64> {
        self.get(key).map(|f| f.layout.offset)
    }

    /// Keys that no candidate could satisfy.
    pub fn missing(&self) -> &[&'static str] {
        &self.missing
    }
}
