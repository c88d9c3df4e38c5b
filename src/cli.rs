//! Definitions for the command line, e.g. `ramscope run --autodump dump/ modules`.
use clap::{Args, Parser, Subcommand, ValueEnum};
use ramscope::minidump::Prepend;
use ramscope::walk::DEFAULT_MAX_STEPS;
use std::fmt;
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about = "Postmortem analysis of Linux kernel RAM dumps", long_about = None)]
#[command(infer_subcommands(true))] // allow abreviations
pub struct Cli {
    /// Log more, -vv for even more. RUST_LOG overrides this.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: MainCommand,
}

#[derive(Subcommand)]
pub enum MainCommand {
    /// Rebuild one image from a minidump's md_*.BIN segment files
    Minidump(MinidumpArgs),

    /// List the reports that can be run
    Reports(ExplainArgs),

    /// Run reports against a dump
    Run(RunArgs),

    /// Translate a kernel virtual address into a physical address
    Translate(TranslateArgs),

    /// Print memory range as hex and ascii
    Hexdump(HexdumpArgs),

    /// Show the load segments of an ELF core
    Elf(ElfArgs),
}

#[derive(Args)]
pub struct ExplainArgs {
    /// Explain columns, fields, etc.
    #[arg(short, long)]
    pub explain: bool,
}

#[derive(Args)]
pub struct MinidumpArgs {
    /// Directory holding the md_*.BIN files
    pub dir: PathBuf,

    /// Where to write the image
    #[arg(short, long, default_value = "minidump.elf")]
    pub output: PathBuf,

    /// File with the string table, defaults to md_KELF_HEADER.BIN in DIR
    #[arg(long)]
    pub header: Option<PathBuf>,

    /// When to put the header at the start of the image
    #[arg(long, default_value_t = PrependArg::Auto)]
    pub prepend: PrependArg,

    /// Explain columns, fields, etc.
    #[arg(short, long)]
    pub explain: bool,
}

#[derive(Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum PrependArg {
    /// Only when the header starts with the ELF magic
    Auto,
    Always,
    Never,
}

impl From<PrependArg> for Prepend {
    fn from(arg: PrependArg) -> Self {
        match arg {
            PrependArg::Auto => Prepend::Auto,
            PrependArg::Always => Prepend::Always,
            PrependArg::Never => Prepend::Never,
        }
    }
}

impl fmt::Display for PrependArg {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PrependArg::Auto => fmt.write_str("auto"),
            PrependArg::Always => fmt.write_str("always"),
            PrependArg::Never => fmt.write_str("never"),
        }
    }
}

/// Where the dump is and how to interpret it.
#[derive(Args)]
pub struct SessionArgs {
    /// Raw RAM file loaded at a physical address, e.g. DDRCS0.BIN@0x80000000
    #[arg(long, value_parser = parse_ram)]
    pub ram: Vec<RamArg>,

    /// Dump directory with a dump_info.txt or load.cmm
    #[arg(long)]
    pub autodump: Option<PathBuf>,

    /// With --autodump: only map the minidump's shared memory files
    #[arg(long, requires = "autodump")]
    pub minidump: bool,

    /// ELF core, e.g. /proc/vmcore or the output of the minidump command
    #[arg(long)]
    pub elf: Option<PathBuf>,

    /// Explicit virtual mapping VIRT:PHYS:LEN
    #[arg(long, value_parser = parse_map)]
    pub map: Vec<MapArg>,

    /// Start of the kernel's linear map
    #[arg(long, value_parser = parse_u64_expr)]
    pub page_offset: Option<u64>,

    /// Physical address the linear map starts at, defaults to the lowest RAM base
    #[arg(long, value_parser = parse_u64_expr, requires = "page_offset")]
    pub phys_offset: Option<u64>,

    /// JSON with the kernel version and struct layouts
    #[arg(long)]
    pub metadata: Option<PathBuf>,

    /// System.map of the dumped kernel
    #[arg(long)]
    pub symbols: Option<PathBuf>,

    /// Added to every System.map address
    #[arg(long, value_parser = parse_u64_expr)]
    pub kaslr_offset: Option<u64>,

    /// Physical address where the bootloader saved the KASLR offset (after 0xdead4ead)
    #[arg(long, value_parser = parse_u64_expr, conflicts_with = "kaslr_offset")]
    pub kaslr_addr: Option<u64>,

    /// Kernel image mapping: image addresses translate to VIRT - KIMAGE_VOFFSET
    #[arg(long, value_parser = parse_u64_expr)]
    pub kimage_voffset: Option<u64>,

    /// Number of CPUs, counted from the present cpu mask if not given
    #[arg(long)]
    pub cpus: Option<usize>,

    /// The dump is from a big endian machine
    #[arg(long)]
    pub big_endian: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RamArg {
    pub path: PathBuf,
    pub base: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MapArg {
    pub virt: u64,
    pub phys: u64,
    pub len: u64,
}

#[derive(Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub session: SessionArgs,

    /// Reports to run, all of them if empty
    pub reports: Vec<String>,

    /// Directory the <report>.txt files are written to
    #[arg(short, long, default_value = "reports")]
    pub output: PathBuf,

    /// Run reports one after another instead of on worker threads
    #[arg(long)]
    pub serial: bool,

    /// Give up on a walk after this many nodes
    #[arg(long, default_value_t = DEFAULT_MAX_STEPS)]
    pub max_steps: usize,

    /// Add column explanations to each report
    #[arg(short, long)]
    pub explain: bool,
}

#[derive(Args)]
pub struct TranslateArgs {
    #[command(flatten)]
    pub session: SessionArgs,

    /// A kernel virtual address
    #[arg(value_parser = parse_u64_expr)]
    pub addr: u64,
}

#[derive(Args)]
pub struct HexdumpArgs {
    #[command(flatten)]
    pub session: SessionArgs,

    /// Number of bytes to dump
    #[arg(short, long)]
    #[arg(default_value_t = 64)]
    pub count: usize,

    /// Treat the address as physical
    #[arg(long)]
    pub physical: bool,

    /// Defaults to a virtual address
    #[arg(value_parser = parse_u64_expr)]
    pub addr: u64,
}

#[derive(Args)]
pub struct ElfArgs {
    /// Path to the core file
    pub core: PathBuf,

    /// Explain columns, fields, etc.
    #[arg(short, long)]
    pub explain: bool,

    /// Add column headers
    #[arg(short, long)]
    pub titles: bool,
}

pub fn parse_u64_expr(s: &str) -> Result<u64, String> {
    let err = || format!("`{s}` isn't a hex or decimal number");
    if let Some(t) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(&t.replace('_', ""), 16).map_err(|_| err())
    } else {
        s.replace('_', "").parse().map_err(|_| err())
    }
}

fn parse_ram(s: &str) -> Result<RamArg, String> {
    let (path, base) = s
        .rsplit_once('@')
        .ok_or_else(|| format!("`{s}` should look like FILE@ADDR"))?;
    Ok(RamArg {
        path: PathBuf::from(path),
        base: parse_u64_expr(base)?,
    })
}

fn parse_map(s: &str) -> Result<MapArg, String> {
    let parts: Vec<&str> = s.split(':').collect();
    let [virt, phys, len] = parts[..] else {
        return Err(format!("`{s}` should look like VIRT:PHYS:LEN"));
    };
    Ok(MapArg {
        virt: parse_u64_expr(virt)?,
        phys: parse_u64_expr(phys)?,
        len: parse_u64_expr(len)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn numbers() {
        assert_eq!(parse_u64_expr("0x80000000"), Ok(0x8000_0000));
        assert_eq!(parse_u64_expr("0xffff_ff80_0000_0000"), Ok(0xffff_ff80_0000_0000));
        assert_eq!(parse_u64_expr("4096"), Ok(4096));
        assert!(parse_u64_expr("0xzz").is_err());
    }

    #[test]
    fn ram_and_map_args() {
        assert_eq!(
            parse_ram("dump/DDRCS0.BIN@0x80000000"),
            Ok(RamArg {
                path: PathBuf::from("dump/DDRCS0.BIN"),
                base: 0x8000_0000
            })
        );
        assert!(parse_ram("DDRCS0.BIN").is_err());
        assert_eq!(
            parse_map("0xffffff8000000000:0x80000000:0x1000"),
            Ok(MapArg {
                virt: 0xffff_ff80_0000_0000,
                phys: 0x8000_0000,
                len: 0x1000
            })
        );
        assert!(parse_map("1:2").is_err());
    }

    #[test]
    fn run_args() {
        let cli = Cli::parse_from([
            "ramscope", "run", "--ram", "a.bin@0x1000", "--ram", "b.bin@0x9000", "--metadata", "m.json",
            "modules", "vmalloc",
        ]);
        let MainCommand::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.reports, ["modules", "vmalloc"]);
        assert_eq!(args.session.ram.len(), 2);
        assert_eq!(args.max_steps, DEFAULT_MAX_STEPS);
        assert!(!args.serial);
        assert_eq!(args.session.cpus, None);
        assert_eq!(args.session.kaslr_offset, None);
    }

    #[test]
    fn kaslr_offset_or_address() {
        let cli = Cli::parse_from(["ramscope", "translate", "--kaslr-addr", "0x146bf6d0", "0xffffffc010000000"]);
        let MainCommand::Translate(args) = cli.command else {
            panic!("expected translate");
        };
        assert_eq!(args.session.kaslr_addr, Some(0x146b_f6d0));

        let both = Cli::try_parse_from([
            "ramscope", "translate", "--kaslr-addr", "0x146bf6d0", "--kaslr-offset", "0x1000", "0x0",
        ]);
        assert!(both.is_err());
    }
}
