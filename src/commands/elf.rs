use crate::cli::ElfArgs;
use anyhow::Context;
use ramscope::elf::ElfCore;
use ramscope::reports::tables::{SimpleTableBuilder, TableBuilder};
use std::io::{self, Write};

pub fn elf_loads(args: &ElfArgs) -> anyhow::Result<()> {
    let core = ElfCore::open(&args.core).with_context(|| format!("opening {}", args.core.display()))?;
    let mut out = io::stdout().lock();

    let mut b = SimpleTableBuilder::new();
    b.add_str_row("core", core.header.is_core().to_string(), "ET_CORE file type");
    b.add_str_row("machine", core.header.machine.to_string(), "e_machine, e.g. 183 for aarch64");
    let bits = if core.sixty_four_bit { "64" } else { "32" };
    b.add_str_row("bits", bits.to_string(), "pointer width");
    let endian = if core.little_endian { "little" } else { "big" };
    b.add_str_row("endian", endian.to_string(), "byte order of the dumped machine");
    b.add_str_row("loads", core.loads.len().to_string(), "number of PT_LOAD segments");
    b.write(&mut out, args.explain)?;
    writeln!(out)?;

    let mut builder = TableBuilder::new();
    builder.add_col_r("vaddr", "the kernel virtual address the segment starts at");
    builder.add_col_r("paddr", "the physical address the segment starts at");
    builder.add_col_r("size", "the size of the segment in the core");
    builder.add_col_r("offset", "the offset into the ELF file at which the segment appears");
    builder.add_col_l("flags", "executable, writeable, and/or readable");
    for segment in &core.loads {
        builder.add_str_field("vaddr", format!("{:x}", segment.vbytes.start.0));
        builder.add_str_field("paddr", format!("{:x}", segment.pbytes.start.0));
        builder.add_str_field("size", format!("{:x}", segment.obytes.size));
        builder.add_str_field("offset", format!("{:x}", segment.obytes.start.0));
        builder.add_str_field("flags", segment.flags());
    }
    builder.write(&mut out, args.titles, args.explain)?;
    Ok(())
}
