use crate::error::{Error, Result};
use std::io::{self, Write};

pub fn require(predicate: bool, err: &str) -> Result<()> {
    if predicate {
        Ok(())
    } else {
        Err(Error::Format(err.to_string()))
    }
}

/// Writes bytes in the same layout xxd uses: address, two groups of eight hex bytes,
/// then the printable characters.
pub fn hex_dump(mut out: impl Write, addr: u64, bytes: &[u8]) -> io::Result<()> {
    for (row, chunk) in bytes.chunks(16).enumerate() {
        write!(out, "{:016x}: ", addr + (row * 16) as u64)?;
        for i in 0..16 {
            match chunk.get(i) {
                Some(b) => write!(out, "{b:02x} ")?,
                None => write!(out, "   ")?,
            }
            if i == 7 {
                write!(out, " ")?;
            }
        }
        write!(out, "  ")?;
        for b in chunk {
            let ch = *b as char;
            if ch.is_ascii_graphic() || ch == ' ' {
                write!(out, "{ch}")?;
            } else {
                write!(out, ".")?;
            }
        }
        writeln!(out)?;
    }
    Ok(())
}
