//! IP match prefixes.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// An IPv4 prefix as used in a flow match (`nw_src` / `nw_dst`).
///
/// Accepts a bare address (host route), CIDR length (`10.0.0.0/24`) or a
/// dotted netmask (`10.0.0.0/255.255.255.0`). Host bits are cleared on
/// construction so two spellings of the same network compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ipv4Prefix {
    network: Ipv4Addr,
    prefix_len: u8,
}

impl Ipv4Prefix {
    /// Matches every IPv4 address (`0.0.0.0/0`).
    pub const ANY: Ipv4Prefix = Ipv4Prefix {
        network: Ipv4Addr::UNSPECIFIED,
        prefix_len: 0,
    };

    pub fn new(address: Ipv4Addr, prefix_len: u8) -> Result<Self, ParseError> {
        if prefix_len > 32 {
            return Err(ParseError::InvalidIpPrefix(format!(
                "{}/{} (length exceeds 32)",
                address, prefix_len
            )));
        }
        let network = Ipv4Addr::from(u32::from(address) & len_to_mask(prefix_len));
        Ok(Ipv4Prefix {
            network,
            prefix_len,
        })
    }

    /// A /32 prefix for a single host.
    pub fn host(address: Ipv4Addr) -> Self {
        Ipv4Prefix {
            network: address,
            prefix_len: 32,
        }
    }

    pub const fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub const fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub fn netmask(&self) -> Ipv4Addr {
        Ipv4Addr::from(len_to_mask(self.prefix_len))
    }

    pub const fn is_any(&self) -> bool {
        self.prefix_len == 0
    }

    pub fn contains(&self, address: Ipv4Addr) -> bool {
        u32::from(address) & len_to_mask(self.prefix_len) == u32::from(self.network)
    }
}

impl Default for Ipv4Prefix {
    fn default() -> Self {
        Ipv4Prefix::ANY
    }
}

fn len_to_mask(prefix_len: u8) -> u32 {
    match prefix_len {
        0 => 0,
        len => u32::MAX << (32 - u32::from(len)),
    }
}

fn mask_to_len(mask: Ipv4Addr) -> Option<u8> {
    let bits = u32::from(mask);
    let len = bits.leading_ones();
    // Non-contiguous netmasks cannot be expressed as a prefix.
    (bits.checked_shl(len).unwrap_or(0) == 0).then_some(len as u8)
}

impl fmt::Display for Ipv4Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

impl FromStr for Ipv4Prefix {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::InvalidIpPrefix(s.to_string());

        let Some((addr_str, len_str)) = s.trim().split_once('/') else {
            let address = s.trim().parse::<Ipv4Addr>().map_err(|_| invalid())?;
            return Ok(Ipv4Prefix::host(address));
        };

        let address = addr_str.parse::<Ipv4Addr>().map_err(|_| invalid())?;
        let prefix_len = if len_str.contains('.') {
            let mask = len_str.parse::<Ipv4Addr>().map_err(|_| invalid())?;
            mask_to_len(mask).ok_or_else(invalid)?
        } else {
            len_str.parse::<u8>().map_err(|_| invalid())?
        };

        Ipv4Prefix::new(address, prefix_len)
    }
}

impl TryFrom<String> for Ipv4Prefix {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Ipv4Prefix> for String {
    fn from(prefix: Ipv4Prefix) -> String {
        prefix.to_string()
    }
}

/// A classifier prefix of either address family.
///
/// Only IPv4 prefixes ever reach a flow match; IPv6 ones are carried so a
/// classifier can be stored and reported as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum IpPrefix {
    V4(Ipv4Prefix),
    V6 { network: Ipv6Addr, prefix_len: u8 },
}

impl IpPrefix {
    pub fn as_v4(&self) -> Option<Ipv4Prefix> {
        match self {
            IpPrefix::V4(prefix) => Some(*prefix),
            IpPrefix::V6 { .. } => None,
        }
    }

    pub fn is_v6(&self) -> bool {
        matches!(self, IpPrefix::V6 { .. })
    }
}

impl From<Ipv4Prefix> for IpPrefix {
    fn from(prefix: Ipv4Prefix) -> Self {
        IpPrefix::V4(prefix)
    }
}

impl fmt::Display for IpPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpPrefix::V4(prefix) => write!(f, "{}", prefix),
            IpPrefix::V6 {
                network,
                prefix_len,
            } => write!(f, "{}/{}", network, prefix_len),
        }
    }
}

impl FromStr for IpPrefix {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !s.contains(':') {
            return s.parse().map(IpPrefix::V4);
        }

        let invalid = || ParseError::InvalidIpPrefix(s.to_string());
        let (addr_str, len) = match s.trim().split_once('/') {
            Some((addr, len)) => (addr, len.parse::<u8>().map_err(|_| invalid())?),
            None => (s.trim(), 128),
        };
        let address = addr_str.parse::<Ipv6Addr>().map_err(|_| invalid())?;
        if len > 128 {
            return Err(invalid());
        }
        let bits = match len {
            0 => 0,
            len => u128::MAX << (128 - u32::from(len)),
        };
        Ok(IpPrefix::V6 {
            network: Ipv6Addr::from(u128::from(address) & bits),
            prefix_len: len,
        })
    }
}

impl TryFrom<String> for IpPrefix {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<IpPrefix> for String {
    fn from(prefix: IpPrefix) -> String {
        prefix.to_string()
    }
}
