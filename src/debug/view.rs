use super::TypeLayouts;
use crate::error::Result;
use crate::memory::{AddressSpace, offset_addr};

/// A typed window onto one kernel struct in the dump so fields can be read by name.
#[derive(Clone, Copy)]
pub struct StructView<'a> {
    space: &'a AddressSpace,
    types: &'a TypeLayouts,
    addr: u64,
    type_name: &'a str,
}

impl<'a> StructView<'a> {
    pub fn new(space: &'a AddressSpace, types: &'a TypeLayouts, addr: u64, type_name: &'a str) -> Self {
        StructView {
            space,
            types,
            addr,
            type_name,
        }
    }

    pub fn addr(&self) -> u64 {
        self.addr
    }

    pub fn type_name(&self) -> &'a str {
        self.type_name
    }

    pub fn field_addr(&self, path: &str) -> Result<u64> {
        offset_addr(self.addr, self.types.field_offset(self.type_name, path)?)
    }

    /// Reads an integer field using the field's own size.
    pub fn read(&self, path: &str) -> Result<u64> {
        let field = self.types.field(self.type_name, path)?;
        self.space.read_uint(offset_addr(self.addr, field.offset)?, field.size as usize)
    }

    pub fn get_u8(&self, path: &str) -> Result<u8> {
        self.space.read_u8(self.field_addr(path)?)
    }

    pub fn get_u16(&self, path: &str) -> Result<u16> {
        self.space.read_u16(self.field_addr(path)?)
    }

    pub fn get_u32(&self, path: &str) -> Result<u32> {
        self.space.read_u32(self.field_addr(path)?)
    }

    pub fn get_u64(&self, path: &str) -> Result<u64> {
        self.space.read_u64(self.field_addr(path)?)
    }

    pub fn get_pointer(&self, path: &str) -> Result<u64> {
        self.space.read_pointer(self.field_addr(path)?)
    }

    /// For `char name[N]` fields.
    pub fn get_cstring(&self, path: &str) -> Result<String> {
        let field = self.types.field(self.type_name, path)?;
        self.space.read_cstring(offset_addr(self.addr, field.offset)?, field.size as usize)
    }

    /// For `const char *name` fields. None if the pointer is NULL.
    pub fn get_cstring_ptr(&self, path: &str, max_len: usize) -> Result<Option<String>> {
        match self.get_pointer(path)? {
            0 => Ok(None),
            ptr => self.space.read_cstring(ptr, max_len).map(Some),
        }
    }

    /// A struct embedded in this one.
    pub fn member(&self, path: &str, type_name: &'a str) -> Result<StructView<'a>> {
        Ok(StructView::new(self.space, self.types, self.field_addr(path)?, type_name))
    }

    /// A struct this one points at. None if the pointer is NULL.
    pub fn follow(&self, path: &str, type_name: &'a str) -> Result<Option<StructView<'a>>> {
        match self.get_pointer(path)? {
            0 => Ok(None),
            ptr => Ok(Some(StructView::new(self.space, self.types, ptr, type_name))),
        }
    }
}
