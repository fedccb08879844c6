//! Declarative flow and group mutations.
//!
//! The compiler never talks to the switch directly: it returns a list of
//! [`DataplaneOp`] records and [`super::execute`] replays them against a
//! [`super::Dataplane`]. Installing and removing an entry use the same
//! (table, priority, match) triple, so every add has an exact inverse.

use serde::{Deserialize, Serialize};
use sfc_types::{Ipv4Prefix, MacAddress, PortMask};
use std::fmt;

/// The three chain tables of the integration bridge, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    /// Ingress classification (OpenFlow table 0).
    LocalSwitching,
    /// Multipath / encapsulation decision.
    CrossSubnet,
    /// Final delivery to a hop's ingress port.
    ChainIngress,
}

impl Table {
    pub const fn id(&self) -> u8 {
        match self {
            Table::LocalSwitching => 0,
            Table::CrossSubnet => 5,
            Table::ChainIngress => 10,
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// Table-miss drop in the chain-ingress table.
pub const PRIORITY_DROP: u16 = 0;
/// Static pipeline entries and classification without a known inbound port.
pub const PRIORITY_DEFAULT: u16 = 20;
/// Group-member cross-subnet entries and classification on a known inbound port.
pub const PRIORITY_INGRESS: u16 = 30;
/// Per-hop steering.
pub const PRIORITY_STEERING: u16 = 50;
/// Resubmit from a service function and strip-and-deliver.
pub const PRIORITY_DELIVERY: u16 = 60;

/// Match criteria of one flow entry. Unset fields are wildcards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlowMatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_port: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dl_type: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dl_vlan: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dl_dst: Option<MacAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mpls_label: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nw_proto: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nw_src: Option<Ipv4Prefix>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nw_dst: Option<Ipv4Prefix>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tp_src: Option<PortMask>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tp_dst: Option<PortMask>,
}

impl FlowMatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_port(mut self, ofport: u32) -> Self {
        self.in_port = Some(ofport);
        self
    }

    /// Sets `in_port` only when the port is known.
    pub fn maybe_in_port(mut self, ofport: Option<u32>) -> Self {
        self.in_port = ofport;
        self
    }

    pub fn dl_type(mut self, ethertype: u16) -> Self {
        self.dl_type = Some(ethertype);
        self
    }

    pub fn dl_vlan(mut self, vid: u16) -> Self {
        self.dl_vlan = Some(vid);
        self
    }

    pub fn dl_dst(mut self, mac: MacAddress) -> Self {
        self.dl_dst = Some(mac);
        self
    }

    pub fn mpls_label(mut self, label: u32) -> Self {
        self.mpls_label = Some(label);
        self
    }

    pub fn nw_proto(mut self, proto: Option<u8>) -> Self {
        self.nw_proto = proto;
        self
    }

    pub fn nw_src(mut self, prefix: Ipv4Prefix) -> Self {
        self.nw_src = Some(prefix);
        self
    }

    pub fn nw_dst(mut self, prefix: Ipv4Prefix) -> Self {
        self.nw_dst = Some(prefix);
        self
    }

    /// Wildcard masks are left unset rather than matched as `0/0x0`.
    pub fn tp_src(mut self, mask: PortMask) -> Self {
        self.tp_src = (!mask.is_wildcard()).then_some(mask);
        self
    }

    pub fn tp_dst(mut self, mask: PortMask) -> Self {
        self.tp_dst = (!mask.is_wildcard()).then_some(mask);
        self
    }

    /// True when every field set in `self` is set to the same value in
    /// `other`. This is the OpenFlow non-strict delete relation.
    pub fn is_subset_of(&self, other: &FlowMatch) -> bool {
        fn covers<T: PartialEq>(mine: &Option<T>, theirs: &Option<T>) -> bool {
            mine.is_none() || mine == theirs
        }

        covers(&self.in_port, &other.in_port)
            && covers(&self.dl_type, &other.dl_type)
            && covers(&self.dl_vlan, &other.dl_vlan)
            && covers(&self.dl_dst, &other.dl_dst)
            && covers(&self.mpls_label, &other.mpls_label)
            && covers(&self.nw_proto, &other.nw_proto)
            && covers(&self.nw_src, &other.nw_src)
            && covers(&self.nw_dst, &other.nw_dst)
            && covers(&self.tp_src, &other.tp_src)
            && covers(&self.tp_dst, &other.tp_dst)
    }
}

impl fmt::Display for FlowMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut fields = Vec::new();
        if let Some(port) = self.in_port {
            fields.push(format!("in_port={port}"));
        }
        if let Some(ethertype) = self.dl_type {
            fields.push(format!("dl_type={ethertype:#06x}"));
        }
        if let Some(vid) = self.dl_vlan {
            fields.push(format!("dl_vlan={vid}"));
        }
        if let Some(mac) = self.dl_dst {
            fields.push(format!("dl_dst={mac}"));
        }
        if let Some(label) = self.mpls_label {
            fields.push(format!("mpls_label={label}"));
        }
        if let Some(proto) = self.nw_proto {
            fields.push(format!("nw_proto={proto}"));
        }
        if let Some(prefix) = self.nw_src {
            fields.push(format!("nw_src={prefix}"));
        }
        if let Some(prefix) = self.nw_dst {
            fields.push(format!("nw_dst={prefix}"));
        }
        if let Some(mask) = self.tp_src {
            fields.push(format!("tp_src={mask}"));
        }
        if let Some(mask) = self.tp_dst {
            fields.push(format!("tp_dst={mask}"));
        }
        write!(f, "{}", fields.join(","))
    }
}

/// One action of a flow entry or group bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowAction {
    ModVlanVid(u16),
    StripVlan,
    ModDlSrc(MacAddress),
    ModDlDst(MacAddress),
    Output(u32),
    Resubmit(Table),
    GotoTable(Table),
    Group(u32),
    Drop,
}

impl fmt::Display for FlowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowAction::ModVlanVid(vid) => write!(f, "mod_vlan_vid:{vid}"),
            FlowAction::StripVlan => write!(f, "strip_vlan"),
            FlowAction::ModDlSrc(mac) => write!(f, "mod_dl_src:{mac}"),
            FlowAction::ModDlDst(mac) => write!(f, "mod_dl_dst:{mac}"),
            FlowAction::Output(port) => write!(f, "output:{port}"),
            FlowAction::Resubmit(table) => write!(f, "resubmit(,{table})"),
            FlowAction::GotoTable(table) => write!(f, "goto_table:{table}"),
            FlowAction::Group(id) => write!(f, "group:{id}"),
            FlowAction::Drop => write!(f, "drop"),
        }
    }
}

/// Renders an action list in `ovs-ofctl` syntax.
pub fn format_actions(actions: &[FlowAction]) -> String {
    actions
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// A fully specified flow entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowEntry {
    pub table: Table,
    pub priority: u16,
    pub matches: FlowMatch,
    pub actions: Vec<FlowAction>,
}

impl fmt::Display for FlowEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table={},priority={},", self.table, self.priority)?;
        if self.matches != FlowMatch::default() {
            write!(f, "{},", self.matches)?;
        }
        write!(f, "actions={}", format_actions(&self.actions))
    }
}

/// Group selection policy. Chains only use weighted hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupType {
    Select,
}

impl fmt::Display for GroupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupType::Select => write!(f, "select"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub weight: u32,
    pub actions: Vec<FlowAction>,
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bucket=weight={},{}", self.weight, format_actions(&self.actions))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSpec {
    pub group_id: u32,
    pub group_type: GroupType,
    pub buckets: Vec<Bucket>,
}

/// A single mutation against the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DataplaneOp {
    /// Install or replace the entry keyed by (table, priority, match).
    AddFlow(FlowEntry),
    /// Remove flows. With a priority the delete is strict on
    /// (table, priority, match); without one every entry whose match
    /// contains `matches` goes. `table: None` spans all tables.
    DeleteFlows {
        table: Option<Table>,
        priority: Option<u16>,
        matches: FlowMatch,
    },
    /// Create the group, or replace its buckets if it already exists.
    EnsureGroup(GroupSpec),
    DeleteGroup(u32),
    DeleteAllGroups,
}

impl DataplaneOp {
    /// Builds either the install or the strict removal of one entry.
    pub fn flow(
        add: bool,
        table: Table,
        priority: u16,
        matches: FlowMatch,
        actions: Vec<FlowAction>,
    ) -> Self {
        if add {
            DataplaneOp::AddFlow(FlowEntry {
                table,
                priority,
                matches,
                actions,
            })
        } else {
            DataplaneOp::DeleteFlows {
                table: Some(table),
                priority: Some(priority),
                matches,
            }
        }
    }

    /// Returns the flow entry if this op installs one.
    pub fn as_add_flow(&self) -> Option<&FlowEntry> {
        match self {
            DataplaneOp::AddFlow(entry) => Some(entry),
            _ => None,
        }
    }

    /// (table, priority, match) of the single entry an install or a strict
    /// delete targets.
    pub fn flow_key(&self) -> Option<(Table, u16, &FlowMatch)> {
        match self {
            DataplaneOp::AddFlow(entry) => Some((entry.table, entry.priority, &entry.matches)),
            DataplaneOp::DeleteFlows {
                table: Some(table),
                priority: Some(priority),
                matches,
            } => Some((*table, *priority, matches)),
            _ => None,
        }
    }

    pub fn is_group_op(&self) -> bool {
        matches!(
            self,
            DataplaneOp::EnsureGroup(_) | DataplaneOp::DeleteGroup(_) | DataplaneOp::DeleteAllGroups
        )
    }

    /// Operation name used in logs and error reports.
    pub fn name(&self) -> &'static str {
        match self {
            DataplaneOp::AddFlow(_) => "add_flow",
            DataplaneOp::DeleteFlows { .. } => "delete_flows",
            DataplaneOp::EnsureGroup(_) => "ensure_group",
            DataplaneOp::DeleteGroup(_) => "delete_group",
            DataplaneOp::DeleteAllGroups => "delete_all_groups",
        }
    }
}
