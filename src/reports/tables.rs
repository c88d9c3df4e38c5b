//! Helpers for building report tables using the tabled crate.
use std::io::{self, Write};
use tabled::{
    builder::Builder,
    settings::{Alignment, Padding, Style, object::Columns},
};

struct TableCol {
    header: String,
    align: Alignment,
    help: String,
    fields: Vec<String>,
}

/// General table. They look like this:
/// name       base                size   if titles
/// ----       ----                ----
/// kgsl       ffffffc0089b0000   a3000
/// wlan       ffffffc008c00000  3c1000
///
/// name: module name                          if explain
/// base: address the module's text was loaded at
/// ...
/// Column order never changes: diff tools depend on it.
pub struct TableBuilder {
    cols: Vec<TableCol>,
}

impl TableBuilder {
    pub fn new() -> TableBuilder {
        TableBuilder { cols: Vec::new() }
    }

    /// Left aligned column
    pub fn add_col_l(&mut self, header: &str, help: &str) {
        self.add_col(header, help, Alignment::left());
    }

    /// Right aligned column
    pub fn add_col_r(&mut self, header: &str, help: &str) {
        self.add_col(header, help, Alignment::right());
    }

    fn add_col(&mut self, header: &str, help: &str, align: Alignment) {
        debug_assert!(!self.has_col(header));
        let col = TableCol {
            header: header.to_string(),
            align,
            help: help.to_string(),
            fields: Vec::new(),
        };
        self.cols.push(col);
    }

    /// Typically add_field! is used instead.
    pub fn add_str_field(&mut self, header: &str, value: String) {
        let Some(col) = self.cols.iter_mut().find(|c| c.header == header) else {
            debug_assert!(false, "no column named {header}");
            return;
        };
        if value.is_empty() {
            // Empty fields screw up tabled formatting.
            col.fields.push(" ".to_string());
        } else {
            col.fields.push(value);
        }
    }

    pub fn num_rows(&self) -> usize {
        self.cols.first().map_or(0, |c| c.fields.len())
    }

    pub fn write(&self, out: &mut dyn Write, titles: bool, explain: bool) -> io::Result<()> {
        writeln!(out, "{}", self.table_str(titles))?;

        if explain {
            writeln!(out)?;
            writeln!(out, "{}", self.explain_str())?;
        }
        Ok(())
    }

    // We need to preserve add_col ordering so we can't use a HashMap
    // but O(n) should be fine for tables.
    fn has_col(&self, header: &str) -> bool {
        self.cols.iter().any(|c| c.header == header)
    }

    fn table_str(&self, titles: bool) -> String {
        let height = self.num_rows();
        let mut builder = Builder::with_capacity(height + 2, self.cols.len());
        if titles {
            let names: Vec<String> = self.cols.iter().map(|c| c.header.to_string()).collect();
            let dashes: Vec<String> = names.iter().map(|s| "-".repeat(s.len())).collect();
            builder.push_record(&names);
            builder.push_record(&dashes);
        }
        for i in 0..height {
            let row: Vec<String> = self
                .cols
                .iter()
                .map(|c| c.fields.get(i).cloned().unwrap_or_default())
                .collect();
            builder.push_record(&row);
        }

        let mut table = builder.build();
        for (i, col) in self.cols.iter().enumerate() {
            table.modify(Columns::one(i), col.align);
        }
        table.modify(Columns::first(), Padding::new(0, 1, 0, 0));
        table.with(Style::empty());

        table.to_string()
    }

    fn explain_str(&self) -> String {
        let explains: Vec<String> = self
            .cols
            .iter()
            .map(|c| format!("{}: {}", c.header, c.help))
            .collect();
        explains.join("\n")
    }
}

impl Default for TableBuilder {
    fn default() -> Self {
        TableBuilder::new()
    }
}

macro_rules! add_field {
    ($builder:ident, $header:literal, $value:expr) => {
        let s = format!("{}", $value);
        $builder.add_str_field($header, s);
    };
    ($builder:ident, $header:literal, $format:literal, $value:expr) => {
        let s = format!($format, $value);
        $builder.add_str_field($header, s);
    };
}
pub(crate) use add_field;

struct SimpleRow {
    name: String,
    value: String,
    help: String,
}

/// Table with just name and value columns. They look like this:
/// kernel       5.10.66                 these have no titles
/// regions      12
///
/// kernel: version of the kernel that was dumped          if explain
/// regions: number of virtual memory regions
pub struct SimpleTableBuilder {
    rows: Vec<SimpleRow>,
}

impl SimpleTableBuilder {
    pub fn new() -> SimpleTableBuilder {
        SimpleTableBuilder { rows: Vec::new() }
    }

    /// Typically add_simple! is used instead.
    pub fn add_str_row(&mut self, name: &str, value: String, help: &str) {
        let row = SimpleRow {
            name: name.to_string(),
            value,
            help: help.to_string(),
        };
        self.rows.push(row);
    }

    pub fn write(&self, out: &mut dyn Write, explain: bool) -> io::Result<()> {
        writeln!(out, "{}", self.table_str())?;

        if explain {
            writeln!(out)?;
            writeln!(out, "{}", self.explain_str())?;
        }
        Ok(())
    }

    fn table_str(&self) -> String {
        let mut builder = Builder::with_capacity(self.rows.len(), 2);
        for row in self.rows.iter() {
            builder.push_record([row.name.clone(), row.value.clone()]);
        }

        let mut table = builder.build();
        table.modify(Columns::one(0), Alignment::left());
        table.modify(Columns::one(1), Alignment::left());
        table.modify(Columns::first(), Padding::new(0, 1, 0, 0));
        table.with(Style::empty());

        table.to_string()
    }

    fn explain_str(&self) -> String {
        let explains: Vec<String> = self
            .rows
            .iter()
            .map(|r| format!("{}: {}", r.name, r.help))
            .collect();
        explains.join("\n")
    }
}

impl Default for SimpleTableBuilder {
    fn default() -> Self {
        SimpleTableBuilder::new()
    }
}

macro_rules! add_simple {
    ($builder:ident, $name:literal, $value:expr, $help:expr) => {
        let s = format!("{}", $value);
        $builder.add_str_row($name, s, $help);
    };
}
pub(crate) use add_simple;

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(bytes: &[u8]) -> Vec<Vec<String>> {
        String::from_utf8_lossy(bytes)
            .lines()
            .map(|l| l.split_whitespace().map(str::to_string).collect())
            .collect()
    }

    #[test]
    fn columns_keep_their_order() {
        let mut b = TableBuilder::new();
        b.add_col_l("name", "module name");
        b.add_col_r("size", "bytes of text");
        add_field!(b, "name", "kgsl");
        add_field!(b, "size", "{:x}", 0xa3000);
        add_field!(b, "name", "");
        add_field!(b, "size", 16);

        let mut out = Vec::new();
        b.write(&mut out, true, true).unwrap();
        let lines = tokens(&out);
        assert_eq!(lines[0], ["name", "size"]);
        assert_eq!(lines[1], ["----", "----"]);
        assert_eq!(lines[2], ["kgsl", "a3000"]);
        assert_eq!(lines[3], ["16"]);
        let text = String::from_utf8(out).unwrap();
        assert!(text.ends_with("name: module name\nsize: bytes of text\n"));
    }

    #[test]
    fn simple_rows() {
        let mut b = SimpleTableBuilder::new();
        add_simple!(b, "kernel", "5.10.66", "kernel version");
        let mut out = Vec::new();
        b.write(&mut out, false).unwrap();
        assert_eq!(tokens(&out), [["kernel", "5.10.66"]]);
    }
}
