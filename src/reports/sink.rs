use crate::error::Result;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Mutex;

/// Where finished reports go.
pub trait ReportSink: Sync {
    fn open(&self, name: &str) -> Result<Box<dyn Write + '_>>;
}

/// Writes each report to `<dir>/<name>.txt`.
pub struct DirSink {
    dir: PathBuf,
}

impl DirSink {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(DirSink { dir })
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.txt"))
    }
}

impl ReportSink for DirSink {
    fn open(&self, name: &str) -> Result<Box<dyn Write + '_>> {
        let file = File::create(self.path(name))?;
        Ok(Box::new(BufWriter::new(file)))
    }
}

/// Keeps reports in memory, keyed by name.
#[derive(Default)]
pub struct MemorySink {
    reports: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        MemorySink::default()
    }

    pub fn get(&self, name: &str) -> Option<String> {
        let reports = self.reports.lock().unwrap_or_else(|e| e.into_inner());
        reports.get(name).map(|b| String::from_utf8_lossy(b).into_owned())
    }

    pub fn into_reports(self) -> BTreeMap<String, Vec<u8>> {
        self.reports.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

struct MemoryWriter<'a> {
    sink: &'a MemorySink,
    name: String,
    buffer: Vec<u8>,
}

impl Write for MemoryWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Drop for MemoryWriter<'_> {
    fn drop(&mut self) {
        let mut reports = self.sink.reports.lock().unwrap_or_else(|e| e.into_inner());
        reports.insert(std::mem::take(&mut self.name), std::mem::take(&mut self.buffer));
    }
}

impl ReportSink for MemorySink {
    fn open(&self, name: &str) -> Result<Box<dyn Write + '_>> {
        Ok(Box::new(MemoryWriter {
            sink: self,
            name: name.to_string(),
            buffer: Vec::new(),
        }))
    }
}
