//! Chain topology types.

use crate::classifier::ClassifierError;
use crate::flow::NodeRole;
use crate::group::NextHopGroup;
use serde::{Deserialize, Serialize};
use sfc_types::{Ipv4Prefix, MacAddress};
use std::fmt;
use std::net::Ipv4Addr;
use thiserror::Error;

/// Longest chain whose tail index still fits in a byte.
pub const MAX_CHAIN_LENGTH: usize = 254;

/// Hop index of the chain head.
pub const HEAD_NSI: u8 = 0xff;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("Port chain not found: {0}")]
    ChainNotFound(String),
    #[error("Port chain already has a path: {0}")]
    ChainExists(String),
    #[error("Port chain {0} has no port pair groups")]
    EmptyChain(String),
    #[error("Port chain {chain} has {length} hops, at most {max} are supported", max = MAX_CHAIN_LENGTH)]
    ChainTooLong { chain: String, length: usize },
    #[error("Port pair group not found: {0}")]
    PortPairGroupNotFound(String),
    #[error("Port pair not found: {0}")]
    PortPairNotFound(String),
    #[error("Flow classifier not found: {0}")]
    FlowClassifierNotFound(String),
    #[error("Port {0} has no binding")]
    PortNotBound(String),
    #[error("Cross-subnet chain not supported: {egress_port} ({egress_subnet}) -> {ingress_port} ({ingress_subnet})")]
    CrossSubnet {
        egress_port: String,
        egress_subnet: Ipv4Prefix,
        ingress_port: String,
        ingress_subnet: Ipv4Prefix,
    },
    #[error("Port detail {0} has no usable segmentation id")]
    InvalidSegment(String),
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
}

pub type Result<T> = std::result::Result<T, TopologyError>;

/// An ordered chain of port pair groups plus the classifiers feeding it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortChain {
    pub id: String,
    /// Chain path identifier (nsp).
    pub chain_id: u32,
    pub port_pair_groups: Vec<String>,
    #[serde(default)]
    pub flow_classifiers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortPairGroup {
    pub id: String,
    /// Select group id programmed when the group fans out.
    pub group_id: u32,
    pub port_pairs: Vec<String>,
}

fn default_weight() -> u32 {
    1
}

/// One service function instance: the port traffic enters and the port it
/// leaves through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortPair {
    pub id: String,
    pub ingress: String,
    pub egress: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

impl PortPair {
    pub fn new(id: impl Into<String>, ingress: impl Into<String>, egress: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ingress: ingress.into(),
            egress: egress.into(),
            weight: default_weight(),
        }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    Vlan,
    Vxlan,
    Flat,
    Local,
}

impl NetworkType {
    /// Chains can only be carried over VLAN and VXLAN segments.
    pub const fn is_supported(&self) -> bool {
        matches!(self, NetworkType::Vlan | NetworkType::Vxlan)
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkType::Vlan => write!(f, "vlan"),
            NetworkType::Vxlan => write!(f, "vxlan"),
            NetworkType::Flat => write!(f, "flat"),
            NetworkType::Local => write!(f, "local"),
        }
    }
}

/// What the port-binding resolver knows about one logical port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortBinding {
    pub port_id: String,
    #[serde(default)]
    pub host_id: Option<String>,
    pub network_type: NetworkType,
    #[serde(default)]
    pub segment_id: Option<u32>,
    pub mac_address: MacAddress,
    #[serde(default)]
    pub fixed_ip: Option<Ipv4Addr>,
    #[serde(default)]
    pub subnet: Option<Ipv4Prefix>,
}

impl PortBinding {
    pub fn vlan(port_id: impl Into<String>, host_id: impl Into<String>, segment_id: u32, mac_address: MacAddress) -> Self {
        Self {
            port_id: port_id.into(),
            host_id: Some(host_id.into()),
            network_type: NetworkType::Vlan,
            segment_id: Some(segment_id),
            mac_address,
            fixed_ip: None,
            subnet: None,
        }
    }

    pub fn with_address(mut self, fixed_ip: Ipv4Addr, subnet: Ipv4Prefix) -> Self {
        self.fixed_ip = Some(fixed_ip);
        self.subnet = Some(subnet);
        self
    }
}

/// How a port detail takes part in a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortRole {
    /// Traffic source of a classifier.
    Egress,
    /// Traffic destination of a classifier.
    Ingress,
    /// A service function port pair.
    Pair,
    Unbound,
}

/// A port (or port pair) bound into a chain, with its binding resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDetail {
    pub id: String,
    #[serde(default)]
    pub ingress: Option<String>,
    #[serde(default)]
    pub egress: Option<String>,
    #[serde(default)]
    pub host_id: Option<String>,
    #[serde(default)]
    pub segment_id: Option<u32>,
    #[serde(default)]
    pub network_type: Option<NetworkType>,
    #[serde(default)]
    pub mac_address: Option<MacAddress>,
}

impl PortDetail {
    fn unbound(id: impl Into<String>, ingress: Option<String>, egress: Option<String>) -> Self {
        Self {
            id: id.into(),
            ingress,
            egress,
            host_id: None,
            segment_id: None,
            network_type: None,
            mac_address: None,
        }
    }

    pub fn for_egress(id: impl Into<String>, port: impl Into<String>) -> Self {
        Self::unbound(id, None, Some(port.into()))
    }

    pub fn for_ingress(id: impl Into<String>, port: impl Into<String>) -> Self {
        Self::unbound(id, Some(port.into()), None)
    }

    pub fn for_pair(id: impl Into<String>, pair: &PortPair) -> Self {
        Self::unbound(id, Some(pair.ingress.clone()), Some(pair.egress.clone()))
    }

    /// The port whose binding describes this detail.
    pub fn key_port(&self) -> Option<&str> {
        self.ingress.as_deref().or(self.egress.as_deref())
    }

    /// Fills in the binding. Ports on unsupported networks stay hostless
    /// and are never programmed.
    pub fn bind(mut self, binding: &PortBinding) -> Self {
        self.mac_address = Some(binding.mac_address);
        self.network_type = Some(binding.network_type);
        self.segment_id = binding.segment_id;
        if binding.network_type.is_supported() {
            self.host_id = binding.host_id.clone();
        }
        self
    }

    pub fn role(&self) -> PortRole {
        match (&self.ingress, &self.egress) {
            (Some(_), Some(_)) => PortRole::Pair,
            (None, Some(_)) => PortRole::Egress,
            (Some(_), None) => PortRole::Ingress,
            (None, None) => PortRole::Unbound,
        }
    }

    pub fn is_bound(&self) -> bool {
        self.host_id.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Building,
    Active,
    Error,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeStatus::Building => write!(f, "building"),
            NodeStatus::Active => write!(f, "active"),
            NodeStatus::Error => write!(f, "error"),
        }
    }
}

/// One hop of a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathNode {
    pub id: String,
    pub role: NodeRole,
    pub nsp: u32,
    pub nsi: u8,
    pub chain_id: String,
    pub status: NodeStatus,
    #[serde(default)]
    pub next_group: Option<NextHopGroup>,
    #[serde(default)]
    pub reverse_path: bool,
    /// Bound port detail ids, in association order.
    #[serde(default)]
    pub port_details: Vec<String>,
}

impl PathNode {
    pub fn new(role: NodeRole, nsp: u32, nsi: u8, chain_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            nsp,
            nsi,
            chain_id: chain_id.into(),
            status: NodeStatus::Building,
            next_group: None,
            reverse_path: false,
            port_details: Vec::new(),
        }
    }

    pub fn group_id(&self) -> Option<u32> {
        self.next_group.as_ref().map(|g| g.group_id)
    }
}

/// Association of a port detail with a path node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathPortAssoc {
    pub node_id: String,
    pub port_detail_id: String,
    pub weight: u32,
}
