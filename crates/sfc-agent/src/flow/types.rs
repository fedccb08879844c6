//! Flow rule types.

use crate::classifier::{ClassifierError, FlowClassifier};
use crate::dataplane::DataplaneError;
use crate::group::NextHopGroup;
use serde::{Deserialize, Serialize};
use sfc_types::SegmentId;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("Port {0} is not attached to the bridge")]
    PortNotFound(String),
    #[error("Flow rule has no {role} port")]
    MissingPort { role: &'static str },
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
}

/// Why applying one flow rule failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowRuleError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Dataplane(#[from] DataplaneError),
}

/// Position of a path node in its chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeRole {
    #[serde(rename = "src_node")]
    Source,
    #[serde(rename = "sf_node")]
    ServiceFunction,
    #[serde(rename = "dst_node")]
    Destination,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Source => write!(f, "src_node"),
            NodeRole::ServiceFunction => write!(f, "sf_node"),
            NodeRole::Destination => write!(f, "dst_node"),
        }
    }
}

/// Everything one bound port of one path node needs programmed.
///
/// Built fresh for every programming call and never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowRule {
    /// `<node-id>:<port-detail-id>`
    pub id: String,
    pub node_role: NodeRole,
    pub nsp: u32,
    pub nsi: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub egress: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_id: Option<String>,
    pub segment_id: SegmentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_hop_group: Option<NextHopGroup>,
    /// Number of path nodes citing `next_hop_group` when the node is being
    /// deleted. `None` keeps the group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_refcnt: Option<u32>,
    #[serde(default)]
    pub add_fcs: Vec<FlowClassifier>,
    #[serde(default)]
    pub del_fcs: Vec<FlowClassifier>,
    #[serde(default)]
    pub reverse_path: bool,
    /// Install rules of other live chains bound to the same port detail.
    /// Entries they program survive the deletion of this rule.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shared_with: Vec<FlowRule>,
}

impl FlowRule {
    pub fn new(id: impl Into<String>, node_role: NodeRole, nsp: u32, nsi: u8, segment_id: SegmentId) -> Self {
        Self {
            id: id.into(),
            node_role,
            nsp,
            nsi,
            ingress: None,
            egress: None,
            host_id: None,
            segment_id,
            next_hop_group: None,
            group_refcnt: None,
            add_fcs: Vec::new(),
            del_fcs: Vec::new(),
            reverse_path: false,
            shared_with: Vec::new(),
        }
    }

    /// Id of the path node this rule was built for.
    pub fn node_id(&self) -> &str {
        self.id.split_once(':').map_or(self.id.as_str(), |(node, _)| node)
    }

    /// The group to forward to, if it has any members.
    pub fn active_group(&self) -> Option<&NextHopGroup> {
        self.next_hop_group.as_ref().filter(|g| g.is_programmable())
    }

    /// True when deleting this rule releases the last reference to its group.
    pub fn releases_group(&self) -> bool {
        self.active_group().is_some() && matches!(self.group_refcnt, Some(n) if n <= 1)
    }

    /// MPLS label identifying this hop: `(nsp << 8) | (nsi + 1)`.
    pub fn mpls_label(&self) -> u32 {
        (self.nsp << 8) | (u32::from(self.nsi) + 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleStatus {
    Active,
    Error,
}

impl fmt::Display for RuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleStatus::Active => write!(f, "active"),
            RuleStatus::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowRuleStatus {
    pub id: String,
    pub status: RuleStatus,
}

impl FlowRuleStatus {
    pub fn active(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: RuleStatus::Active,
        }
    }

    pub fn error(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: RuleStatus::Error,
        }
    }
}
