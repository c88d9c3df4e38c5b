//! Builds a small fake kernel dump on disk: one RAM file behind a linear map, a
//! System.map and a metadata JSON.
#![allow(dead_code)]
use ramscope::debug::{Metadata, SymbolTable};
use ramscope::memory::{AddressSpace, Backing};
use ramscope::reports::Session;
use serde_json::Value;
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub const PAGE_OFFSET: u64 = 0xffff_ff80_0000_0000;
pub const PHYS_OFFSET: u64 = 0x8000_0000;

pub struct Dump {
    pub dir: TempDir,
    ram: Vec<u8>,
    next: u64,
    symbols: Vec<(u64, String)>,
}

pub struct DumpFiles {
    pub ram: PathBuf,
    pub system_map: PathBuf,
    pub metadata: PathBuf,
}

impl Dump {
    pub fn new(size: usize) -> Self {
        Dump {
            dir: tempfile::tempdir().unwrap(),
            ram: vec![0; size],
            next: PAGE_OFFSET + 0x1000,
            symbols: Vec::new(),
        }
    }

    pub fn alloc(&mut self, size: u64) -> u64 {
        let addr = self.next;
        self.next += size.div_ceil(64) * 64;
        addr
    }

    fn at(&self, vaddr: u64) -> usize {
        (vaddr - PAGE_OFFSET) as usize
    }

    pub fn put_u64(&mut self, vaddr: u64, value: u64) {
        let at = self.at(vaddr);
        self.ram[at..at + 8].copy_from_slice(&value.to_le_bytes());
    }

    pub fn put_str(&mut self, vaddr: u64, s: &str) {
        let at = self.at(vaddr);
        self.ram[at..at + s.len()].copy_from_slice(s.as_bytes());
    }

    pub fn symbol(&mut self, name: &str, vaddr: u64) {
        self.symbols.push((vaddr, name.to_string()));
    }

    /// Makes a circular list out of `head` and `nodes`.
    pub fn link(&mut self, head: u64, nodes: &[u64]) {
        let mut all = vec![head];
        all.extend_from_slice(nodes);
        for (i, &node) in all.iter().enumerate() {
            let next = all[(i + 1) % all.len()];
            let prev = all[(i + all.len() - 1) % all.len()];
            self.put_u64(node, next);
            self.put_u64(node + 8, prev);
        }
    }

    pub fn write(&self, metadata: &Value) -> DumpFiles {
        let ram = self.dir.path().join("DDRCS0.BIN");
        fs::write(&ram, &self.ram).unwrap();

        let mut text = String::new();
        for (addr, name) in &self.symbols {
            writeln!(text, "{addr:016x} D {name}").unwrap();
        }
        let system_map = self.dir.path().join("System.map");
        fs::write(&system_map, text).unwrap();

        let path = self.dir.path().join("metadata.json");
        fs::write(&path, serde_json::to_string_pretty(metadata).unwrap()).unwrap();
        DumpFiles {
            ram,
            system_map,
            metadata: path,
        }
    }

    /// Writes everything out and opens it again the way the command line does.
    pub fn session(&self, metadata: &Value) -> Session {
        let files = self.write(metadata);
        let metadata = Metadata::load(&files.metadata).unwrap();
        let version = metadata.version().unwrap();

        let mut builder = AddressSpace::builder();
        builder
            .add_ram("DDRCS0.BIN", PHYS_OFFSET, Backing::map_file(&files.ram).unwrap())
            .unwrap();
        builder.linear_map(PAGE_OFFSET, PHYS_OFFSET);
        let space = builder.build().unwrap();

        let symbols = SymbolTable::load(&files.system_map).unwrap();
        Session::new(space, metadata.types, Box::new(symbols), version)
    }
}

pub fn list_head() -> Value {
    serde_json::json!({
        "size": 16,
        "fields": {
            "next": {"offset": 0, "size": 8},
            "prev": {"offset": 8, "size": 8}
        }
    })
}
