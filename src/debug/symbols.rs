//! Kernel symbols from a System.map file.
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Resolves well known globals (`modules`, `vmap_area_root`, ...) to addresses. Reports
/// only ever see this trait.
pub trait SymbolLookup: Sync {
    fn address_of(&self, name: &str) -> Result<u64>;

    /// Nearest symbol at or below `addr` along with the offset from it.
    fn symbol_at(&self, addr: u64) -> Option<(&str, u64)>;

    /// "name+0x10" or just the address when nothing covers it.
    fn describe(&self, addr: u64) -> String {
        match self.symbol_at(addr) {
            Some((name, 0)) => name.to_string(),
            Some((name, offset)) => format!("{name}+{offset:#x}"),
            None => format!("{addr:#x}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Symbol {
    pub addr: u64,

    /// nm style type letter, e.g. 'T' for text or 'D' for data.
    pub kind: char,
    pub name: String,
}

#[derive(Debug, Default)]
pub struct SymbolTable {
    /// Sorted by address.
    symbols: Vec<Symbol>,
    by_name: HashMap<String, usize>,
    kaslr_offset: u64,
}

impl SymbolTable {
    pub fn new(mut symbols: Vec<Symbol>) -> Self {
        symbols.sort_by_key(|s| s.addr);
        let mut by_name = HashMap::new();
        for (i, symbol) in symbols.iter().enumerate() {
            // Statics can share a name, the lowest address wins.
            by_name.entry(symbol.name.clone()).or_insert(i);
        }
        SymbolTable {
            symbols,
            by_name,
            kaslr_offset: 0,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let table = SymbolTable::parse(&text)?;
        info!("loaded {} symbols from {}", table.len(), path.display());
        Ok(table)
    }

    /// Lines look like `ffffffc010080000 T _text`. Module symbols have a trailing
    /// `[module]` which is ignored.
    pub fn parse(text: &str) -> Result<Self> {
        let mut symbols = Vec::new();
        for (number, line) in text.lines().enumerate() {
            let mut words = line.split_whitespace();
            let (Some(addr), Some(kind), Some(name)) = (words.next(), words.next(), words.next()) else {
                if !line.trim().is_empty() {
                    debug!("skipping System.map line {}: {line}", number + 1);
                }
                continue;
            };
            let addr = u64::from_str_radix(addr, 16)
                .map_err(|_| Error::Format(format!("bad address on System.map line {}: {line}", number + 1)))?;
            symbols.push(Symbol {
                addr,
                kind: kind.chars().next().unwrap_or('?'),
                name: name.to_string(),
            });
        }
        Ok(SymbolTable::new(symbols))
    }

    /// KASLR slide to add to every address in the map.
    pub fn with_kaslr_offset(mut self, offset: u64) -> Self {
        self.kaslr_offset = offset;
        self
    }

    pub fn kaslr_offset(&self) -> u64 {
        self.kaslr_offset
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.by_name.get(name).map(|&i| &self.symbols[i])
    }
}

impl SymbolLookup for SymbolTable {
    fn address_of(&self, name: &str) -> Result<u64> {
        self.get(name)
            .map(|s| s.addr.wrapping_add(self.kaslr_offset))
            .ok_or_else(|| Error::UnknownSymbol(name.to_string()))
    }

    fn symbol_at(&self, addr: u64) -> Option<(&str, u64)> {
        let addr = addr.wrapping_sub(self.kaslr_offset);
        let i = self.symbols.partition_point(|s| s.addr <= addr);
        let symbol = self.symbols.get(i.checked_sub(1)?)?;
        Some((symbol.name.as_str(), addr - symbol.addr))
    }
}
