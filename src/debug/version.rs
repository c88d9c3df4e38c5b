use crate::error::{Error, Result};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Major.minor.patch of the kernel that produced a dump.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KernelVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl KernelVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        KernelVersion {
            major,
            minor,
            patch,
        }
    }

    /// Parses the version out of a `linux_banner` like
    /// "Linux version 5.10.66-android12-9-g1f5a2a1 (build@host) ...".
    pub fn from_banner(banner: &str) -> Result<Self> {
        let rest = banner
            .split("Linux version ")
            .nth(1)
            .ok_or_else(|| Error::Format(format!("not a linux banner: {banner:?}")))?;
        let token = rest.split_whitespace().next().unwrap_or_default();
        token.parse()
    }
}

impl FromStr for KernelVersion {
    type Err = Error;

    /// Accepts "5.10", "5.10.66" and "5.10.66-android12-9".
    fn from_str(s: &str) -> Result<Self> {
        let bad = || Error::Format(format!("bad kernel version: {s:?}"));
        let mut parts = s.splitn(3, '.');
        let mut number = |required: bool| -> Result<u32> {
            match parts.next() {
                Some(part) => {
                    let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
                    digits.parse().map_err(|_| bad())
                }
                None if required => Err(bad()),
                None => Ok(0),
            }
        };
        let major = number(true)?;
        let minor = number(true)?;
        let patch = number(false).unwrap_or(0);
        Ok(KernelVersion::new(major, minor, patch))
    }
}

impl fmt::Display for KernelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl<'de> Deserialize<'de> for KernelVersion {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Half open range of kernel versions: `start` is included, `end` is not.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VersionRange {
    pub start: Option<KernelVersion>,
    pub end: Option<KernelVersion>,
}

impl VersionRange {
    pub const fn any() -> Self {
        VersionRange {
            start: None,
            end: None,
        }
    }

    pub const fn since(start: KernelVersion) -> Self {
        VersionRange {
            start: Some(start),
            end: None,
        }
    }

    pub const fn before(end: KernelVersion) -> Self {
        VersionRange {
            start: None,
            end: Some(end),
        }
    }

    pub const fn between(start: KernelVersion, end: KernelVersion) -> Self {
        VersionRange {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn contains(&self, version: KernelVersion) -> bool {
        self.start.is_none_or(|s| version >= s) && self.end.is_none_or(|e| version < e)
    }

    /// Errors with UnsupportedVersion when `version` is outside the range.
    pub fn check(&self, version: KernelVersion) -> Result<()> {
        if self.contains(version) {
            Ok(())
        } else {
            Err(Error::UnsupportedVersion {
                version,
                range: *self,
            })
        }
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.start, self.end) {
            (None, None) => write!(f, "any"),
            (Some(s), None) => write!(f, ">= {s}"),
            (None, Some(e)) => write!(f, "< {e}"),
            (Some(s), Some(e)) => write!(f, "{s}..{e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_versions() {
        assert_eq!("5.10.66".parse::<KernelVersion>().unwrap(), KernelVersion::new(5, 10, 66));
        assert_eq!("4.19".parse::<KernelVersion>().unwrap(), KernelVersion::new(4, 19, 0));
        assert_eq!(
            "5.15.41-android13-8-00055-g4f5025129fe8".parse::<KernelVersion>().unwrap(),
            KernelVersion::new(5, 15, 41)
        );
        assert!("linux".parse::<KernelVersion>().is_err());
    }

    #[test]
    fn parse_banner() {
        let banner = "Linux version 4.14.190-perf+ (builder@host) (clang version 10.0.7) #1 SMP PREEMPT";
        assert_eq!(KernelVersion::from_banner(banner).unwrap(), KernelVersion::new(4, 14, 190));
        assert!(KernelVersion::from_banner("Hello world").is_err());
    }

    #[test]
    fn ranges() {
        let v = KernelVersion::new(5, 4, 0);
        assert!(VersionRange::since(KernelVersion::new(5, 4, 0)).contains(v));
        assert!(!VersionRange::before(KernelVersion::new(5, 4, 0)).contains(v));
        assert!(VersionRange::any().contains(v));
        let range = VersionRange::between(KernelVersion::new(4, 5, 0), KernelVersion::new(6, 4, 0));
        assert!(range.contains(KernelVersion::new(6, 3, 99)));
        assert!(!range.contains(KernelVersion::new(6, 4, 0)));
        assert_eq!(range.to_string(), "4.5.0..6.4.0");
        insta::assert_snapshot!(
            range.check(KernelVersion::new(6, 6, 1)).unwrap_err().to_string(),
            @"kernel 6.6.1 is outside the supported range 4.5.0..6.4.0"
        );
    }
}
