mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, MainCommand};
use tracing_subscriber::EnvFilter;

/// RUST_LOG wins over -v.
fn init_logging(verbose: u8) -> anyhow::Result<()> {
    let level = match verbose {
        0 => "ramscope=info",
        1 => "ramscope=debug",
        _ => "ramscope=trace",
    };
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("warn").add_directive(level.parse()?),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    use MainCommand::*;
    match cli.command {
        Minidump(args) => commands::minidump(&args),
        Reports(args) => commands::list_reports(&args),
        Run(args) => commands::run(&args),
        Translate(args) => commands::translate(&args),
        Hexdump(args) => commands::hexdump(&args),
        Elf(args) => commands::elf_loads(&args),
    }
}
