use crate::cli::MinidumpArgs;
use anyhow::Context;
use ramscope::minidump::{ReconstructOptions, reconstruct};
use ramscope::reports::tables::TableBuilder;
use std::io::{self, Write};
use tracing::info;

pub fn minidump(args: &MinidumpArgs) -> anyhow::Result<()> {
    let options = ReconstructOptions {
        header: args.header.clone(),
        prepend: args.prepend.into(),
        ..ReconstructOptions::new(&args.dir)
    };
    let result = reconstruct(&options).with_context(|| format!("reconstructing {}", args.dir.display()))?;
    result.write_to(&args.output)?;
    info!("wrote {} bytes to {}", result.image.len(), args.output.display());

    let mut builder = TableBuilder::new();
    builder.add_col_l("segment", "name from the string table");
    builder.add_col_r("offset", "where the segment starts in the output");
    builder.add_col_r("size", "bytes copied from md_<segment>.BIN");
    if result.header_len > 0 {
        builder.add_str_field("segment", "header".to_string());
        builder.add_str_field("offset", "0".to_string());
        builder.add_str_field("size", format!("{:x}", result.header_len));
    }
    for segment in &result.segments {
        builder.add_str_field("segment", segment.name.clone());
        builder.add_str_field("offset", format!("{:x}", segment.offset));
        builder.add_str_field("size", format!("{:x}", segment.size));
    }

    let mut out = io::stdout().lock();
    builder.write(&mut out, true, args.explain)?;
    if !result.skipped.is_empty() {
        writeln!(out)?;
        for err in &result.skipped {
            writeln!(out, "skipped: {err}")?;
        }
    }
    Ok(())
}
