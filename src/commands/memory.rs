use super::open_space;
use crate::cli::{HexdumpArgs, TranslateArgs};
use ramscope::memory::AddrKind;
use ramscope::utils;
use std::io::{self, Write};

pub fn translate(args: &TranslateArgs) -> anyhow::Result<()> {
    let space = open_space(&args.session)?;
    let region = space.region_of(args.addr)?;
    let phys = space.translate(args.addr)?;
    let mut out = io::stdout().lock();
    writeln!(out, "{:#x} -> {phys:#x}", args.addr)?;
    writeln!(out, "region {region}")?;
    Ok(())
}

pub fn hexdump(args: &HexdumpArgs) -> anyhow::Result<()> {
    let space = open_space(&args.session)?;
    let kind = if args.physical { AddrKind::Physical } else { AddrKind::Virtual };
    let bytes = space.read(args.addr, args.count, kind)?;
    utils::hex_dump(io::stdout().lock(), args.addr, bytes)?;
    Ok(())
}
