use super::tables::{TableBuilder, add_field};
use super::{Report, Session, write_problems};
use crate::debug::StructView;
use crate::error::{Error, Result};
use crate::memory::offset_addr;
use crate::walk::{ListWalker, RadixWalker, WalkEnd};
use std::io::Write;
use std::ops::ControlFlow;

pub struct PageCache;

#[derive(Default)]
struct SuperBlock {
    addr: u64,
    id: String,
    inodes: u64,
    pages: u64,
    shadows: u64,
}

impl Report for PageCache {
    fn name(&self) -> &'static str {
        "pagecache"
    }

    fn description(&self) -> &'static str {
        "page cache usage per super block"
    }

    fn generate(&self, session: &Session, out: &mut dyn Write) -> Result<()> {
        let head = session.symbol("super_blocks")?;
        let link = session.types.field_offset("struct super_block", "s_list")?;
        let (sbs, walk) = ListWalker::new(&session.space, head, link)
            .layout(session.list_layout())
            .limits(session.limits())
            .collect();

        let mut problems = Vec::new();
        let mut rows = Vec::with_capacity(sbs.len());
        for addr in sbs {
            let sb = session.view(addr, "struct super_block");
            match count_super_block(session, sb, &mut problems) {
                Ok(row) => rows.push(row),
                Err(Error::Aborted) => return Err(Error::Aborted),
                Err(err) => problems.push(Error::corrupt(addr, format!("skipped super_block: {err}"))),
            }
        }
        rows.sort_by(|a, b| b.pages.cmp(&a.pages).then_with(|| a.id.cmp(&b.id)));

        let mut builder = TableBuilder::new();
        builder.add_col_r("super_block", "address of the struct super_block");
        builder.add_col_l("id", "s_id, usually the device name");
        builder.add_col_r("inodes", "inodes on the super block's s_inodes list");
        builder.add_col_r("pages", "page cache pages across all of those inodes");
        builder.add_col_r("shadows", "evicted page shadow entries");
        for sb in &rows {
            add_field!(builder, "super_block", "{:x}", sb.addr);
            add_field!(builder, "id", sb.id);
            add_field!(builder, "inodes", sb.inodes);
            add_field!(builder, "pages", sb.pages);
            add_field!(builder, "shadows", sb.shadows);
        }
        builder.write(out, true, session.explain)?;
        write_problems(out, "super_blocks", &walk, &problems)
    }
}

fn count_super_block(session: &Session, sb: StructView<'_>, problems: &mut Vec<Error>) -> Result<SuperBlock> {
    let mut row = SuperBlock {
        addr: sb.addr(),
        id: sb.get_cstring("s_id")?,
        ..SuperBlock::default()
    };
    let head = sb.field_addr("s_inodes")?;
    let link = session.types.field_offset("struct inode", "i_sb_list")?;
    let pages = session.layout.offset("address_space.pages")?;
    let schema = session.radix_schema();
    let layout = session.radix_layout();

    let inode_walk = ListWalker::new(&session.space, head, link)
        .layout(session.list_layout())
        .limits(session.limits())
        .walk(|inode| {
            row.inodes += 1;
            let mapping = match session.view(inode, "struct inode").get_pointer("i_mapping") {
                Ok(0) => return ControlFlow::Continue(()),
                Ok(mapping) => mapping,
                Err(err) => {
                    problems.push(Error::corrupt(inode, format!("no i_mapping: {err}")));
                    return ControlFlow::Continue(());
                }
            };
            let Ok(root) = offset_addr(mapping, pages) else {
                problems.push(Error::corrupt(inode, format!("bad i_mapping {mapping:#x}")));
                return ControlFlow::Continue(());
            };
            let walk = RadixWalker::new(&session.space, root, schema, layout)
                .limits(session.limits())
                .walk(|_, entry| {
                    if schema.is_value(entry) {
                        row.shadows += 1;
                    } else {
                        row.pages += 1;
                    }
                    ControlFlow::Continue(())
                });
            if walk.end == WalkEnd::Aborted {
                return ControlFlow::Break(());
            }
            problems.extend(walk.diagnostics);
            ControlFlow::Continue(())
        });

    if session.is_aborted() {
        return Err(Error::Aborted);
    }
    problems.extend(inode_walk.diagnostics);
    Ok(row)
}
