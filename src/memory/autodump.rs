//! Finds the RAM files of a full or mini dump directory by reading the load scripts
//! that the capture tools leave next to them.
use super::{AddressSpaceBuilder, Backing};
use crate::error::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DumpFile {
    pub path: PathBuf,
    pub base: u64,
    pub size: u64,
}

impl DumpFile {
    pub fn end(&self) -> u64 {
        self.base + self.size
    }

    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn add_to(&self, builder: &mut AddressSpaceBuilder) -> Result<()> {
        let backing = Backing::map_file(&self.path)?;
        builder.add_ram(self.name(), self.base, backing)?;
        Ok(())
    }
}

/// True for names like DDRCS0_0.BIN, EBI1.BIN or OCIMEM.BIN. Minidumps only carry
/// a couple of shared memory files that are worth mapping.
pub fn is_ramdump_file(name: &str, minidump: bool) -> bool {
    if minidump {
        return name == "MD_SMEMINFO.BIN" || name == "MD_SHRDIMEM.BIN";
    }
    let upper = name.to_ascii_uppercase();
    is_ddr_name(&upper) || is_imem_name(&upper)
}

fn is_ddr_name(upper: &str) -> bool {
    let Some(rest) = upper.strip_prefix("DDR").or_else(|| upper.strip_prefix("EBI")) else {
        return false;
    };
    let digits = rest
        .bytes()
        .take_while(|b| b.is_ascii_digit() || matches!(b, b'_' | b'C' | b'S'))
        .count();
    digits > 0 && rest[digits..].starts_with(".BIN")
}

fn is_imem_name(upper: &str) -> bool {
    upper
        .match_indices("IMEM")
        .any(|(i, _)| upper.get(i + 5..).is_some_and(|s| s.starts_with("BIN")))
}

/// dump_info.txt wins over load.cmm when both list usable files. Files are returned
/// lowest base first.
pub fn discover(dir: &Path, minidump: bool) -> Result<Vec<DumpFile>> {
    for (script, parse) in [
        ("dump_info.txt", parse_dump_info as fn(&Path, &str, bool) -> Vec<DumpFile>),
        ("load.cmm", parse_load_cmm),
    ] {
        let path = dir.join(script);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("no {script} in {}", dir.display());
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        let mut files = parse(dir, &text, minidump);
        if !files.is_empty() {
            files.sort_by_key(|f| f.base);
            for file in &files {
                info!("found {} {:#x}..{:#x}", file.name(), file.base, file.end());
            }
            return Ok(files);
        }
    }
    Ok(Vec::new())
}

fn parse_hex(word: &str) -> Option<u64> {
    let digits = word
        .strip_prefix("0x")
        .or_else(|| word.strip_prefix("0X"))
        .unwrap_or(word);
    u64::from_str_radix(digits, 16).ok()
}

fn file_size(path: &Path) -> Option<u64> {
    fs::metadata(path).ok().map(|m| m.len())
}

// Lines look like `1 0x80000000 2147483648 DDR CS0 part 0 DDRCS0_0.BIN`.
fn parse_dump_info(dir: &Path, text: &str, minidump: bool) -> Vec<DumpFile> {
    let mut files = Vec::new();
    for line in text.lines() {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some(name) = words.last() else { continue };
        if words.len() < 3 || !is_ramdump_file(name, minidump) {
            continue;
        }
        let (Some(base), Ok(size)) = (parse_hex(words[1]), words[2].parse::<u64>()) else {
            warn!("can't parse dump_info.txt line: {line}");
            continue;
        };
        let path = dir.join(name);
        match file_size(&path) {
            Some(actual) if actual == size => files.push(DumpFile { path, base, size }),
            Some(actual) => warn!(
                "size of {name} on disk ({actual}) doesn't match dump_info.txt ({size}), skipping it"
            ),
            None => warn!("{name} is listed in dump_info.txt but doesn't exist"),
        }
    }
    files
}

// Lines look like `d.load.binary DDRCS0_0.BIN 0x80000000 /noclear`.
fn parse_load_cmm(dir: &Path, text: &str, minidump: bool) -> Vec<DumpFile> {
    let mut files = Vec::new();
    for line in text.lines() {
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.len() != 4 || !is_ramdump_file(words[1], minidump) {
            continue;
        }
        let Some(base) = parse_hex(words[2]) else {
            warn!("can't parse load.cmm line: {line}");
            continue;
        };
        let path = dir.join(words[1]);
        if let Some(size) = file_size(&path) {
            files.push(DumpFile { path, base, size });
        }
    }
    files
}
