use crate::cli::SessionArgs;
use anyhow::{Context, bail};
use ramscope::debug::{KernelVersion, Metadata, SymbolLookup, SymbolTable, match_banner};
use ramscope::elf::ElfCore;
use ramscope::memory::{
    self, AddressSpace, Backing, Endian, MemoryRegion, PerCpuOffsetTable, present_cpus, read_kaslr_offset,
};
use ramscope::reports::Session;
use tracing::{info, warn};

/// Used when the cpu mask can't be read and the metadata has no per-cpu offsets.
const FALLBACK_CPUS: usize = 8;

/// Maps the dump's RAM and lays the virtual mappings over it.
pub fn build_space(args: &SessionArgs, metadata: Option<&Metadata>) -> anyhow::Result<AddressSpace> {
    let mut builder = AddressSpace::builder();
    let mut pointer_size = metadata.map_or(8, |m| m.pointer_size);
    let mut endian = if args.big_endian { Endian::Big } else { Endian::Little };
    let mut lowest_ram = None;

    for ram in &args.ram {
        let backing = Backing::map_file(&ram.path).with_context(|| format!("mapping {}", ram.path.display()))?;
        let name = ram.path.display().to_string();
        builder.add_ram(name, ram.base, backing)?;
        lowest_ram = Some(lowest_ram.map_or(ram.base, |l: u64| l.min(ram.base)));
    }

    if let Some(dir) = &args.autodump {
        let files = memory::discover(dir, args.minidump)?;
        if files.is_empty() {
            bail!("no RAM files found in {}", dir.display());
        }
        for file in &files {
            file.add_to(&mut builder)?;
        }
        let ddr = files.iter().filter(|f| !f.name().to_ascii_uppercase().contains("IMEM"));
        if let Some(lowest) = ddr.map(|f| f.base).min() {
            lowest_ram = Some(lowest_ram.map_or(lowest, |l: u64| l.min(lowest)));
        }
    }

    let mut mapped = false;
    if let Some(path) = &args.elf {
        let core = ElfCore::open(path).with_context(|| format!("opening {}", path.display()))?;
        core.add_to(&mut builder)?;
        pointer_size = core.pointer_size();
        endian = core.endian();
        mapped = true;
    }

    for map in &args.map {
        let region = MemoryRegion::new(map.virt, map.phys, map.len);
        builder.add_region(MemoryRegion { endian, ..region });
        mapped = true;
    }

    if let Some(page_offset) = args.page_offset {
        let phys_offset = match args.phys_offset.or(lowest_ram) {
            Some(offset) => offset,
            None => bail!("--page-offset needs --phys-offset when there is no --ram or --autodump"),
        };
        info!("linear map {page_offset:#x} -> {phys_offset:#x}");
        builder.linear_map(page_offset, phys_offset);
        mapped = true;
    }

    if let Some(voffset) = args.kimage_voffset {
        info!("kernel image map with kimage_voffset {voffset:#x}");
        builder.kimage_map(voffset);
        mapped = true;
    }

    if !builder.has_ram() {
        bail!("no RAM: use --ram, --autodump or --elf");
    }
    if !mapped {
        info!("no virtual mappings given, using physical addresses as virtual");
        builder.identity_map();
    }
    builder.pointer_size(pointer_size).endian(endian);
    Ok(builder.build()?)
}

/// Loads everything the reports need. Problems with the dump itself are logged and
/// left for the reports to trip over, problems with the inputs are errors.
pub fn open_session(args: &SessionArgs) -> anyhow::Result<Session> {
    let Some(path) = &args.metadata else {
        bail!("reports need --metadata");
    };
    let metadata = Metadata::load(path).with_context(|| format!("loading {}", path.display()))?;
    let version = metadata.version()?;
    info!("kernel {version}");

    let mut space = build_space(args, Some(&metadata))?;
    let symbols = match &args.symbols {
        Some(path) => SymbolTable::load(path)
            .with_context(|| format!("loading {}", path.display()))?
            .with_kaslr_offset(kaslr_offset(args, &space)),
        None => {
            warn!("no --symbols, reports that need a symbol will fail");
            SymbolTable::new(Vec::new())
        }
    };

    if let Some(banner) = &metadata.linux_banner {
        match symbols.address_of("linux_banner") {
            Ok(addr) => {
                if let Err(err) = match_banner(banner, &space, addr) {
                    warn!("couldn't read linux_banner: {err}");
                }
            }
            Err(err) => info!("can't check the banner: {err}"),
        }
    }

    let cpus = cpu_count(args, &space, &symbols, &metadata, version);
    match PerCpuOffsetTable::from_symbol(&space, &symbols, cpus) {
        Ok(table) => space.set_per_cpu_offsets(table),
        Err(err) if !metadata.per_cpu_offsets.is_empty() => {
            info!("using per-cpu offsets from the metadata ({err})");
            space.set_per_cpu_offsets(PerCpuOffsetTable::new(metadata.per_cpu_offsets.clone()));
        }
        Err(err) => info!("no per-cpu offsets: {err}"),
    }

    Ok(Session::new(space, metadata.types, Box::new(symbols), version))
}

/// An explicit offset wins, then whatever the bootloader saved at --kaslr-addr.
fn kaslr_offset(args: &SessionArgs, space: &AddressSpace) -> u64 {
    if let Some(offset) = args.kaslr_offset {
        return offset;
    }
    let Some(addr) = args.kaslr_addr else {
        return 0;
    };
    let endian = if args.big_endian { Endian::Big } else { Endian::Little };
    match read_kaslr_offset(space, addr, endian) {
        Ok(offset) => offset.unwrap_or(0),
        Err(err) => {
            warn!("couldn't read the KASLR offset: {err}");
            0
        }
    }
}

fn cpu_count(
    args: &SessionArgs,
    space: &AddressSpace,
    symbols: &dyn SymbolLookup,
    metadata: &Metadata,
    version: KernelVersion,
) -> usize {
    if let Some(cpus) = args.cpus {
        return cpus;
    }
    match present_cpus(space, symbols, &metadata.types, version) {
        Ok(cpus) => {
            info!("{cpus} cpus present");
            cpus
        }
        Err(err) if !metadata.per_cpu_offsets.is_empty() => {
            info!("counting cpus from the metadata ({err})");
            metadata.per_cpu_offsets.len()
        }
        Err(err) => {
            warn!("can't count cpus, assuming {FALLBACK_CPUS}: {err}");
            FALLBACK_CPUS
        }
    }
}

/// For commands that only need memory: metadata is used for the pointer size if given.
pub fn open_space(args: &SessionArgs) -> anyhow::Result<AddressSpace> {
    let metadata = match &args.metadata {
        Some(path) => Some(Metadata::load(path).with_context(|| format!("loading {}", path.display()))?),
        None => None,
    };
    build_space(args, metadata.as_ref())
}
