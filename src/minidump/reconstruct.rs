use super::segment_names;
use crate::elf;
use crate::error::{Error, Result};
use crate::memory;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const DEFAULT_HEADER: &str = "md_KELF_HEADER.BIN";

/// Whether the header bytes go in front of the segments.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Prepend {
    /// Only when the header is an ELF header.
    #[default]
    Auto,
    Always,
    Never,
}

#[derive(Clone, Debug)]
pub struct ReconstructOptions {
    /// Directory holding the md_<name>.BIN files.
    pub dir: PathBuf,

    /// Header holding the string table. Either the dumped header segment or a whole
    /// ELF blob. Defaults to md_KELF_HEADER.BIN in `dir`.
    pub header: Option<PathBuf>,
    pub prepend: Prepend,
}

impl ReconstructOptions {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        ReconstructOptions {
            dir: dir.into(),
            header: None,
            prepend: Prepend::Auto,
        }
    }

    pub fn header_path(&self) -> PathBuf {
        self.header
            .clone()
            .unwrap_or_else(|| self.dir.join(DEFAULT_HEADER))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SegmentInfo {
    pub name: String,
    pub path: PathBuf,

    /// Where the segment starts in the image.
    pub offset: u64,
    pub size: u64,
}

/// The reassembled image plus a record of how it was put together.
#[derive(Debug)]
pub struct Reconstruction {
    pub image: Vec<u8>,
    pub header_len: u64,
    pub segments: Vec<SegmentInfo>,

    /// Segments named in the string table that couldn't be read.
    pub skipped: Vec<Error>,
}

pub fn segment_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("md_{name}.BIN"))
}

/// Concatenates every segment named by the header's string table, in table order.
/// Missing or unreadable segments are skipped, only a missing or table-less header
/// fails the whole thing.
pub fn reconstruct(options: &ReconstructOptions) -> Result<Reconstruction> {
    let header_path = options.header_path();
    let header = memory::map_file(&header_path)?;
    let names = segment_names(&header)?;
    info!("{} names {} segments", header_path.display(), names.len());

    let prepend = match options.prepend {
        Prepend::Auto => elf::is_elf(&header),
        Prepend::Always => true,
        Prepend::Never => false,
    };
    let mut image = Vec::new();
    if prepend {
        image.extend_from_slice(&header);
    }
    let header_len = image.len() as u64;

    let mut segments = Vec::new();
    let mut skipped = Vec::new();
    for name in names {
        let path = segment_path(&options.dir, &name);
        match append_segment(&mut image, &path) {
            Ok(size) => {
                debug!("{name}: {size} bytes at {:#x}", image.len() as u64 - size);
                segments.push(SegmentInfo {
                    offset: image.len() as u64 - size,
                    size,
                    name,
                    path,
                });
            }
            Err(err) => {
                let err = if err.is_not_found() {
                    Error::SegmentMissing { name, path }
                } else {
                    err
                };
                warn!("skipping segment: {err}");
                skipped.push(err);
            }
        }
    }

    Ok(Reconstruction {
        image,
        header_len,
        segments,
        skipped,
    })
}

fn append_segment(image: &mut Vec<u8>, path: &Path) -> Result<u64> {
    // Zero length files can't always be mapped.
    if fs::metadata(path)?.len() == 0 {
        return Ok(0);
    }
    let map = memory::map_file(path)?;
    image.extend_from_slice(&map);
    Ok(map.len() as u64)
}

impl Reconstruction {
    /// Writes the image next to `path` and renames it into place so a partial image
    /// never appears under the final name.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let mut partial = path.as_os_str().to_owned();
        partial.push(".partial");
        let partial = PathBuf::from(partial);

        let mut file = fs::File::create(&partial)?;
        file.write_all(&self.image)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&partial, path)?;
        info!("wrote {} bytes to {}", self.image.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(header: &[u8], segments: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(DEFAULT_HEADER), header).unwrap();
        for (name, bytes) in segments {
            fs::write(segment_path(dir.path(), name), bytes).unwrap();
        }
        dir
    }

    #[test]
    fn concatenates_in_table_order() {
        let dir = setup(
            b"STR_TBL\0zzz\0aaa\0mmm\0\0\0",
            &[("aaa", "AAAA"), ("zzz", "Z"), ("mmm", "")],
        );
        let result = reconstruct(&ReconstructOptions::new(dir.path())).unwrap();
        assert_eq!(result.image, b"ZAAAA");
        assert_eq!(result.header_len, 0);
        let layout: Vec<(&str, u64, u64)> = result
            .segments
            .iter()
            .map(|s| (s.name.as_str(), s.offset, s.size))
            .collect();
        assert_eq!(layout, [("zzz", 0, 1), ("aaa", 1, 4), ("mmm", 5, 0)]);
        assert!(result.skipped.is_empty());
    }

    #[test]
    fn missing_segments_are_skipped() {
        let dir = setup(b"STR_TBL\0tsens0\0rpm_log\0\0\0", &[("rpm_log", "log")]);
        let result = reconstruct(&ReconstructOptions::new(dir.path())).unwrap();
        assert_eq!(result.image, b"log");
        assert_eq!(result.skipped.len(), 1);
        assert!(matches!(&result.skipped[0], Error::SegmentMissing { name, .. } if name == "tsens0"));
    }

    #[test]
    fn elf_headers_are_prepended() {
        let mut header = b"\x7fELF\x02\x01\x01\0".to_vec();
        header.extend(b"STR_TBL\0seg\0\0\0");
        let dir = setup(&header, &[("seg", "data")]);

        let result = reconstruct(&ReconstructOptions::new(dir.path())).unwrap();
        assert_eq!(result.header_len, header.len() as u64);
        assert!(result.image.ends_with(b"data"));
        assert_eq!(result.segments[0].offset, header.len() as u64);

        let mut options = ReconstructOptions::new(dir.path());
        options.prepend = Prepend::Never;
        assert_eq!(reconstruct(&options).unwrap().image, b"data");
    }

    #[test]
    fn idempotent_and_atomic() {
        let dir = setup(b"STR_TBL\0one\0two\0\0\0", &[("one", "1111"), ("two", "22")]);
        let options = ReconstructOptions::new(dir.path());
        let out = dir.path().join("image.bin");
        reconstruct(&options).unwrap().write_to(&out).unwrap();
        let first = fs::read(&out).unwrap();
        reconstruct(&options).unwrap().write_to(&out).unwrap();
        assert_eq!(fs::read(&out).unwrap(), first);
        assert!(!dir.path().join("image.bin.partial").exists());
    }

    #[test]
    fn missing_header_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(reconstruct(&ReconstructOptions::new(dir.path())).unwrap_err().is_not_found());
    }
}
