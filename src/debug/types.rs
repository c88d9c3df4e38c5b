//! Struct layouts for the exact kernel build that produced a dump. These come from an
//! external debug info provider (usually dumped out of vmlinux DWARF) as JSON.
use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct FieldLayout {
    pub offset: u64,
    pub size: u64,

    /// C type of the field, e.g. "struct list_head" or "struct module_memory[7]". Only
    /// needed for fields that dotted paths or array indexes go through.
    #[serde(rename = "type", default)]
    pub type_name: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub size: u64,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldLayout>,
}

impl TypeDescriptor {
    pub fn new(size: u64) -> Self {
        TypeDescriptor {
            size,
            fields: BTreeMap::new(),
        }
    }

    pub fn field(mut self, name: &str, offset: u64, size: u64) -> Self {
        let layout = FieldLayout {
            offset,
            size,
            type_name: None,
        };
        self.fields.insert(name.to_string(), layout);
        self
    }

    pub fn typed_field(mut self, name: &str, offset: u64, size: u64, type_name: &str) -> Self {
        let layout = FieldLayout {
            offset,
            size,
            type_name: Some(type_name.to_string()),
        };
        self.fields.insert(name.to_string(), layout);
        self
    }
}

/// Answers "where is this field" and "how big is this type". Names are exact and case
/// sensitive: "struct module", "struct list_head", etc. Loaded once per session and
/// never shared between sessions.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct TypeLayouts {
    types: HashMap<String, TypeDescriptor>,
}

impl TypeLayouts {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn insert(&mut self, type_name: impl Into<String>, descriptor: TypeDescriptor) -> &mut Self {
        self.types.insert(type_name.into(), descriptor);
        self
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn descriptor(&self, type_name: &str) -> Result<&TypeDescriptor> {
        self.types
            .get(type_name)
            .ok_or_else(|| Error::UnknownType(type_name.to_string()))
    }

    pub fn size_of(&self, type_name: &str) -> Result<u64> {
        self.descriptor(type_name).map(|d| d.size)
    }

    pub fn has_type(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    /// True if the field exists. Used to pick between layouts of different kernel versions.
    pub fn has_field(&self, type_name: &str, path: &str) -> bool {
        self.field(type_name, path).is_ok()
    }

    pub fn field_offset(&self, type_name: &str, path: &str) -> Result<u64> {
        self.field(type_name, path).map(|f| f.offset)
    }

    /// Resolves a path like "core_layout.base" or "mem[0].size" into a layout whose
    /// offset is relative to the start of `type_name`.
    pub fn field(&self, type_name: &str, path: &str) -> Result<FieldLayout> {
        let unknown = || Error::UnknownField {
            type_name: type_name.to_string(),
            field: path.to_string(),
        };

        let mut current = type_name.to_string();
        let mut result: Option<FieldLayout> = None;
        for component in path.split('.') {
            let (name, index) = split_index(component).ok_or_else(unknown)?;
            if let Some(prev) = &result {
                // Can only step into an embedded struct, not through a pointer.
                current = match &prev.type_name {
                    Some(t) if !t.ends_with('*') => t.clone(),
                    _ => return Err(unknown()),
                };
            }
            let descriptor = self.descriptor(&current)?;
            let field = descriptor.fields.get(name).ok_or_else(unknown)?;
            let base = result.as_ref().map_or(0, |r| r.offset);

            let layout = match index {
                None => FieldLayout {
                    offset: base + field.offset,
                    ..field.clone()
                },
                Some(index) => {
                    let element = field
                        .type_name
                        .as_deref()
                        .and_then(element_type)
                        .ok_or_else(unknown)?;
                    let size = self.size_of(element)?;
                    FieldLayout {
                        offset: base + field.offset + index * size,
                        size,
                        type_name: Some(element.to_string()),
                    }
                }
            };
            result = Some(layout);
        }
        result.ok_or_else(unknown)
    }

    /// Address of the record that embeds `member` at `ptr`.
    pub fn container_of(&self, ptr: u64, type_name: &str, member: &str) -> Result<u64> {
        let offset = self.field_offset(type_name, member)?;
        Ok(ptr.wrapping_sub(offset))
    }

    /// Address of element `index` of an array of `type_name` starting at `addr`.
    pub fn array_index(&self, addr: u64, type_name: &str, index: u64) -> Result<u64> {
        let size = self.size_of(type_name)?;
        index
            .checked_mul(size)
            .and_then(|delta| addr.checked_add(delta))
            .ok_or(Error::Unmapped { addr })
    }
}

fn split_index(component: &str) -> Option<(&str, Option<u64>)> {
    match component.split_once('[') {
        None if !component.is_empty() => Some((component, None)),
        None => None,
        Some((name, rest)) => {
            let index = rest.strip_suffix(']')?.trim().parse().ok()?;
            Some((name, Some(index)))
        }
    }
}

/// "struct module_memory[7]" => "struct module_memory"
fn element_type(array_type: &str) -> Option<&str> {
    array_type
        .rfind('[')
        .map(|i| array_type[..i].trim_end())
        .filter(|t| !t.is_empty())
}
