use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AccessError;

// ---------------------------------------------------------------------------
// AccessMode
// ---------------------------------------------------------------------------

/// Combinable capability flags.
///
/// The same type tags both what an accessor declares it can do and what an
/// operation requests. `ReadWrite` is its own bit (4), not `Read | Write`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccessMode(u8);

impl AccessMode {
    /// No capability.
    pub const NONE: Self = Self(0);
    /// Read-only capability.
    pub const READ: Self = Self(1);
    /// Write-only capability.
    pub const WRITE: Self = Self(2);
    /// Combined read/write capability.
    pub const READ_WRITE: Self = Self(4);

    const KNOWN_BITS: u8 = 0b111;

    /// Raw flag bits.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Build from raw bits. Returns `None` if unknown bits are set.
    pub const fn from_bits(bits: u8) -> Option<Self> {
        if bits & !Self::KNOWN_BITS == 0 {
            Some(Self(bits))
        } else {
            None
        }
    }

    /// Returns `true` if no flag is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if every flag of `other` is set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if every flag of `self` is set in `other`.
    pub const fn is_subset_of(self, other: Self) -> bool {
        other.0 & self.0 == self.0
    }

    /// The request expanded to every capability tag that can serve it.
    ///
    /// A request for `READ` or `WRITE` is also served by `READ_WRITE`
    /// accessors; a request for `READ_WRITE` is served by any tag.
    pub const fn normalized(self) -> Self {
        if self.0 & Self::READ_WRITE.0 != 0 {
            Self(Self::KNOWN_BITS)
        } else if self.0 != 0 {
            Self(self.0 | Self::READ_WRITE.0)
        } else {
            Self::NONE
        }
    }

    /// Returns `true` if an accessor declaring `capability` may serve a
    /// request for `self`.
    pub const fn admits(self, capability: Self) -> bool {
        !capability.is_empty() && capability.is_subset_of(self.normalized())
    }
}

impl BitOr for AccessMode {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for AccessMode {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for AccessMode {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        let mut parts = Vec::with_capacity(3);
        if self.contains(Self::READ) {
            parts.push("read");
        }
        if self.contains(Self::WRITE) {
            parts.push("write");
        }
        if self.contains(Self::READ_WRITE) {
            parts.push("read_write");
        }
        write!(f, "{}", parts.join("|"))
    }
}

impl fmt::Debug for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessMode({self})")
    }
}

impl FromStr for AccessMode {
    type Err = AccessError;

    /// Parses `read`, `write`, `read_write` (or `readwrite`), `none`, and
    /// `|`-joined combinations of them.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut mode = Self::NONE;
        for part in s.split('|').map(str::trim) {
            mode |= match part.to_ascii_lowercase().as_str() {
                "read" => Self::READ,
                "write" => Self::WRITE,
                "read_write" | "readwrite" => Self::READ_WRITE,
                "none" => Self::NONE,
                other => {
                    return Err(AccessError::Configuration(format!(
                        "unknown access mode: {other}"
                    )))
                }
            };
        }
        Ok(mode)
    }
}

impl TryFrom<String> for AccessMode {
    type Error = AccessError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AccessMode> for String {
    fn from(mode: AccessMode) -> Self {
        mode.to_string()
    }
}

// ---------------------------------------------------------------------------
// RedundancyMode
// ---------------------------------------------------------------------------

/// Fan-out policy applied to a group of same-group accessors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedundancyMode {
    /// No wrapping: the highest-priority accessor serves alone.
    #[default]
    None,
    /// Every operation is replayed on every member.
    Compositing,
    /// Reads fail over, writes replicate to all.
    Mirroring,
    /// Each member holds a disjoint slice; reads aggregate.
    Striping,
}

impl fmt::Display for RedundancyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Compositing => write!(f, "compositing"),
            Self::Mirroring => write!(f, "mirroring"),
            Self::Striping => write!(f, "striping"),
        }
    }
}

impl FromStr for RedundancyMode {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "compositing" => Ok(Self::Compositing),
            "mirroring" => Ok(Self::Mirroring),
            "striping" => Ok(Self::Striping),
            other => Err(AccessError::Configuration(format!(
                "unknown redundancy mode: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn flag_values() {
        assert_eq!(AccessMode::READ.bits(), 1);
        assert_eq!(AccessMode::WRITE.bits(), 2);
        assert_eq!(AccessMode::READ_WRITE.bits(), 4);
        assert_eq!((AccessMode::READ | AccessMode::WRITE).bits(), 3);
    }

    #[test]
    fn from_bits_rejects_unknown() {
        assert_eq!(AccessMode::from_bits(5), Some(AccessMode::READ | AccessMode::READ_WRITE));
        assert!(AccessMode::from_bits(8).is_none());
    }

    #[test]
    fn subset_and_contains() {
        let rw = AccessMode::WRITE | AccessMode::READ_WRITE;
        assert!(AccessMode::WRITE.is_subset_of(rw));
        assert!(rw.contains(AccessMode::READ_WRITE));
        assert!(!AccessMode::READ.is_subset_of(rw));
    }

    #[test]
    fn write_request_admits_read_write_accessor() {
        assert!(AccessMode::WRITE.admits(AccessMode::READ_WRITE));
        assert!(AccessMode::WRITE.admits(AccessMode::WRITE));
        assert!(!AccessMode::WRITE.admits(AccessMode::READ));
    }

    #[test]
    fn read_write_request_admits_every_tag() {
        for cap in [AccessMode::READ, AccessMode::WRITE, AccessMode::READ_WRITE] {
            assert!(AccessMode::READ_WRITE.admits(cap));
        }
    }

    #[test]
    fn empty_capability_is_never_admitted() {
        assert!(!AccessMode::READ_WRITE.admits(AccessMode::NONE));
    }

    #[test]
    fn parse_and_display() {
        assert_eq!("read".parse::<AccessMode>().unwrap(), AccessMode::READ);
        assert_eq!(
            "write | read_write".parse::<AccessMode>().unwrap(),
            AccessMode::WRITE | AccessMode::READ_WRITE
        );
        assert_eq!(
            (AccessMode::WRITE | AccessMode::READ_WRITE).to_string(),
            "write|read_write"
        );
        assert_eq!(AccessMode::NONE.to_string(), "none");
        assert!("execute".parse::<AccessMode>().is_err());
    }

    #[test]
    fn serde_as_string() {
        let json = serde_json::to_string(&AccessMode::READ_WRITE).unwrap();
        assert_eq!(json, "\"read_write\"");
        let back: AccessMode = serde_json::from_str("\"read|write\"").unwrap();
        assert_eq!(back, AccessMode::READ | AccessMode::WRITE);
    }

    #[test]
    fn redundancy_mode_names() {
        for mode in [
            RedundancyMode::None,
            RedundancyMode::Compositing,
            RedundancyMode::Mirroring,
            RedundancyMode::Striping,
        ] {
            assert_eq!(mode.to_string().parse::<RedundancyMode>().unwrap(), mode);
        }
        assert_eq!(
            serde_json::to_string(&RedundancyMode::Mirroring).unwrap(),
            "\"mirroring\""
        );
        assert_eq!(RedundancyMode::default(), RedundancyMode::None);
    }

    proptest! {
        #[test]
        fn normalization_is_idempotent(bits in 0u8..8) {
            let mode = AccessMode::from_bits(bits).unwrap();
            prop_assert_eq!(mode.normalized().normalized(), mode.normalized());
        }

        #[test]
        fn request_always_admits_its_own_tags(bits in 1u8..8) {
            let mode = AccessMode::from_bits(bits).unwrap();
            prop_assert!(mode.admits(mode));
        }
    }
}
