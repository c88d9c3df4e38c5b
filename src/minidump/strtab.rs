//! The minidump header embeds a string table naming every segment that was dumped, in
//! dump order. Nothing else records which segments exist.
use crate::error::{Error, Result};
use tracing::{debug, warn};

pub const MARKER: &[u8] = b"STR_TBL";

/// Names that show up in the table but aren't segments.
pub const EXCLUDED: [&str; 2] = ["STR_TBL", "KELF_HEADER"];

const MIN_NAME_LEN: usize = 3;

/// Three NULs in a row end the table.
const END_NULS: usize = 3;

fn is_name_byte(b: u8) -> bool {
    (0x30..=0x7f).contains(&b)
}

/// Extracts segment names from the bytes following the first STR_TBL marker in
/// `header`. Runs of name bytes shorter than three are ignored.
pub fn segment_names(header: &[u8]) -> Result<Vec<String>> {
    let start = memchr::memmem::find(header, MARKER)
        .ok_or_else(|| Error::Format("header has no STR_TBL marker".to_string()))?
        + MARKER.len();

    let mut names = Vec::new();
    let mut token = Vec::new();
    let mut nuls = 0;
    let mut terminated = false;
    for &b in &header[start..] {
        if is_name_byte(b) {
            token.push(b);
            nuls = 0;
            continue;
        }
        push_token(&mut names, &mut token);
        if b == 0 {
            nuls += 1;
            if nuls == END_NULS {
                terminated = true;
                break;
            }
        } else {
            nuls = 0;
        }
    }
    push_token(&mut names, &mut token);
    if !terminated {
        warn!("string table isn't terminated, using everything up to the end of the header");
    }
    Ok(names)
}

fn push_token(names: &mut Vec<String>, token: &mut Vec<u8>) {
    if token.len() >= MIN_NAME_LEN {
        // is_name_byte only accepts ASCII
        let name = String::from_utf8_lossy(token).into_owned();
        if EXCLUDED.contains(&name.as_str()) {
            debug!("ignoring {name} in the string table");
        } else {
            names.push(name);
        }
    }
    token.clear();
}
