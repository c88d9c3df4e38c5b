use super::tables::{TableBuilder, add_field};
use super::{Report, Session, write_problems};
use crate::debug::{KernelVersion, StructView, VersionRange};
use crate::error::{Error, Result};
use crate::walk::{RbOrder, RbWalker};
use std::io::Write;
use std::ops::ControlFlow;

pub struct Vmalloc;

struct Area {
    start: u64,
    end: u64,
    pages: Option<u64>,
    caller: Option<String>,
}

impl Report for Vmalloc {
    fn name(&self) -> &'static str {
        "vmalloc"
    }

    fn description(&self) -> &'static str {
        "busy vmalloc areas sorted by start address"
    }

    fn supported(&self) -> VersionRange {
        VersionRange::since(KernelVersion::new(5, 4, 0))
    }

    fn generate(&self, session: &Session, out: &mut dyn Write) -> Result<()> {
        let root = session.symbol("vmap_area_root")?;
        let node = session.types.field_offset("struct vmap_area", "rb_node")?;

        let mut areas = Vec::new();
        let mut skipped = Vec::new();
        let walk = RbWalker::new(&session.space, root, node)
            .layout(session.rb_layout())
            .order(RbOrder::InOrder)
            .limits(session.limits())
            .walk(|addr| {
                match read_area(session, session.view(addr, "struct vmap_area")) {
                    Ok(area) => areas.push(area),
                    Err(err) => skipped.push(Error::corrupt(addr, format!("skipped vmap_area: {err}"))),
                }
                ControlFlow::Continue(())
            });
        areas.sort_by_key(|a| a.start);

        let mut builder = TableBuilder::new();
        builder.add_col_r("start", "first address of the area");
        builder.add_col_r("end", "one past the last address of the area");
        builder.add_col_r("size", "end - start in bytes, including the guard page");
        builder.add_col_r("pages", "pages backing the area, blank for areas without a vm_struct");
        builder.add_col_l("caller", "function that allocated the area");
        for a in &areas {
            add_field!(builder, "start", "{:x}", a.start);
            add_field!(builder, "end", "{:x}", a.end);
            add_field!(builder, "size", "{:x}", a.end.wrapping_sub(a.start));
            add_field!(builder, "pages", a.pages.map(|p| p.to_string()).unwrap_or_default());
            add_field!(builder, "caller", a.caller.as_deref().unwrap_or(""));
        }
        builder.write(out, true, session.explain)?;
        write_problems(out, "vmap_area_root", &walk, &skipped)
    }
}

fn read_area(session: &Session, va: StructView<'_>) -> Result<Area> {
    let mut area = Area {
        start: va.read("va_start")?,
        end: va.read("va_end")?,
        pages: None,
        caller: None,
    };
    if let Some(vm) = va.follow("vm", "struct vm_struct")? {
        area.pages = Some(vm.read("nr_pages")?);
        area.caller = Some(session.symbols.describe(vm.get_pointer("caller")?));
    }
    Ok(area)
}
