use super::tables::{TableBuilder, add_field};
use super::{Report, Session, write_problems};
use crate::debug::ResolvedField;
use crate::error::{Error, Result};
use crate::memory::offset_addr;
use crate::walk::ListWalker;
use std::io::Write;
use std::ops::ControlFlow;

pub struct Modules;

struct Module {
    addr: u64,
    name: String,
    base: u64,
    size: u64,
}

impl Report for Modules {
    fn name(&self) -> &'static str {
        "modules"
    }

    fn description(&self) -> &'static str {
        "loaded kernel modules sorted by load address"
    }

    fn generate(&self, session: &Session, out: &mut dyn Write) -> Result<()> {
        let head = session.symbol("modules")?;
        let link = session.types.field_offset("struct module", "list")?;
        let base = session.layout.get("module.base")?;
        let size = session.layout.get("module.size")?;

        let mut modules = Vec::new();
        let mut skipped = Vec::new();
        let walk = ListWalker::new(&session.space, head, link)
            .layout(session.list_layout())
            .limits(session.limits())
            .walk(|addr| {
                match read_module(session, addr, base, size) {
                    Ok(module) => modules.push(module),
                    Err(err) => skipped.push(Error::corrupt(addr, format!("skipped module: {err}"))),
                }
                ControlFlow::Continue(())
            });
        modules.sort_by_key(|m| (m.base, m.addr));

        let mut builder = TableBuilder::new();
        builder.add_col_l("name", "module name");
        builder.add_col_r("base", "address the module's core was loaded at");
        builder.add_col_r("size", "size of the module's core in bytes");
        builder.add_col_r("module", "address of the struct module");
        for m in &modules {
            add_field!(builder, "name", m.name);
            add_field!(builder, "base", "{:x}", m.base);
            add_field!(builder, "size", "{:x}", m.size);
            add_field!(builder, "module", "{:x}", m.addr);
        }
        builder.write(out, true, session.explain)?;
        write_problems(out, "modules", &walk, &skipped)
    }
}

fn read_module(session: &Session, addr: u64, base: &ResolvedField, size: &ResolvedField) -> Result<Module> {
    let module = session.view(addr, "struct module");
    Ok(Module {
        addr,
        name: module.get_cstring("name")?,
        base: session.space.read_pointer_at(addr, base.layout.offset)?,
        size: session
            .space
            .read_uint(offset_addr(addr, size.layout.offset)?, size.layout.size as usize)?,
    })
}
