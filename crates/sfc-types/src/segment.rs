//! Chain segment identifier.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Encapsulation segment carried as the chain-wide VLAN tag (1-4094).
///
/// ```
/// use sfc_types::SegmentId;
///
/// assert_eq!(SegmentId::new(100).unwrap().vid(), 100);
/// assert!(SegmentId::new(0).is_err());
/// assert!(SegmentId::new(4095).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct SegmentId(u16);

impl SegmentId {
    pub const MIN: u32 = 1;
    pub const MAX: u32 = 4094;

    pub const fn new(id: u32) -> Result<Self, ParseError> {
        if id >= Self::MIN && id <= Self::MAX {
            Ok(SegmentId(id as u16))
        } else {
            Err(ParseError::InvalidSegmentId(id))
        }
    }

    /// The VLAN id written by `mod_vlan_vid` and matched by `dl_vlan`.
    pub const fn vid(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u32> for SegmentId {
    type Error = ParseError;

    fn try_from(id: u32) -> Result<Self, Self::Error> {
        SegmentId::new(id)
    }
}

impl From<SegmentId> for u32 {
    fn from(id: SegmentId) -> u32 {
        u32::from(id.0)
    }
}
