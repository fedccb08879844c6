//! Next-hop group types.

use serde::{Deserialize, Serialize};
use sfc_types::MacAddress;

/// One weighted member of a next-hop group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NextHop {
    /// Port detail of the member's port pair.
    pub portpair_id: String,
    pub mac_address: MacAddress,
    pub weight: u32,
    /// Binding host of the member's ingress port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_id: Option<String>,
}

impl NextHop {
    pub fn new(portpair_id: impl Into<String>, mac_address: MacAddress, weight: u32) -> Self {
        Self {
            portpair_id: portpair_id.into(),
            mac_address,
            weight,
            host_id: None,
        }
    }

    pub fn on_host(mut self, host_id: impl Into<String>) -> Self {
        self.host_id = Some(host_id.into());
        self
    }
}

/// Weighted fan-out towards the next hop of a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextHopGroup {
    pub group_id: u32,
    pub members: Vec<NextHop>,
}

impl NextHopGroup {
    pub fn new(group_id: u32, members: Vec<NextHop>) -> Self {
        Self { group_id, members }
    }

    /// A group is only programmed when it has somewhere to send traffic.
    pub fn is_programmable(&self) -> bool {
        self.group_id != 0 && !self.members.is_empty()
    }
}
