//! Network primitives used by the service function chain flow compiler.
//!
//! - [`MacAddress`]: 48-bit Ethernet MAC addresses
//! - [`Ipv4Prefix`]: IPv4 match prefixes (CIDR or dotted-mask notation)
//! - [`IpPrefix`]: a classifier prefix of either address family
//! - [`EtherType`] / [`IpProtocol`]: classifier protocol selectors
//! - [`PortMask`]: a (value, mask) pair matching a block of L4 ports
//! - [`SegmentId`]: the chain-wide VLAN-style tag carried between hops

mod ip;
mod mac;
mod port_mask;
mod proto;
mod segment;

pub use ip::{IpPrefix, Ipv4Prefix};
pub use mac::MacAddress;
pub use port_mask::PortMask;
pub use proto::{EtherType, IpProtocol};
pub use segment::SegmentId;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("invalid IP prefix: {0}")]
    InvalidIpPrefix(String),

    #[error("invalid segment id: {0} (must be 1-4094)")]
    InvalidSegmentId(u32),

    #[error("unknown ethertype: {0}")]
    InvalidEtherType(String),

    #[error("unknown IP protocol: {0}")]
    InvalidProtocol(String),

    #[error("invalid port mask: {0}")]
    InvalidPortMask(String),
}
