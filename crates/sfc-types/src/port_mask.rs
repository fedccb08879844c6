//! L4 port value/mask pair.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A (value, mask) pair matching every port `p` with `p & mask == value`.
///
/// Displayed in the OpenFlow `tp_dst=80/0xfffc` style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PortMask {
    value: u16,
    mask: u16,
}

impl PortMask {
    /// Matches every port.
    pub const WILDCARD: PortMask = PortMask { value: 0, mask: 0 };

    /// Creates a pair; bits of `value` outside `mask` are cleared.
    pub const fn new(value: u16, mask: u16) -> Self {
        PortMask {
            value: value & mask,
            mask,
        }
    }

    /// Matches exactly one port.
    pub const fn exact(port: u16) -> Self {
        PortMask {
            value: port,
            mask: u16::MAX,
        }
    }

    pub const fn value(&self) -> u16 {
        self.value
    }

    pub const fn mask(&self) -> u16 {
        self.mask
    }

    pub const fn is_wildcard(&self) -> bool {
        self.mask == 0
    }

    pub const fn matches(&self, port: u16) -> bool {
        port & self.mask == self.value
    }

    /// Number of ports covered by this pair.
    pub const fn span(&self) -> u32 {
        1u32 << (!self.mask).count_ones()
    }
}

impl fmt::Display for PortMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{:#x}", self.value, self.mask)
    }
}

impl FromStr for PortMask {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::InvalidPortMask(s.to_string());
        let (value, mask) = s.split_once('/').ok_or_else(invalid)?;
        let value = value.parse::<u16>().map_err(|_| invalid())?;
        let mask = mask.strip_prefix("0x").ok_or_else(invalid)?;
        let mask = u16::from_str_radix(mask, 16).map_err(|_| invalid())?;
        Ok(PortMask::new(value, mask))
    }
}

impl TryFrom<String> for PortMask {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<PortMask> for String {
    fn from(mask: PortMask) -> String {
        mask.to_string()
    }
}
