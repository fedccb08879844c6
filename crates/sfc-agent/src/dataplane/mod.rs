//! Switch control surface.
//!
//! [`Dataplane`] is the only side-effecting boundary of the agent. The
//! compiler produces [`DataplaneOp`] lists and [`execute`] replays them
//! in order, stopping at the first failure.

mod memory;
mod ops;

pub use memory::{BridgeSnapshot, MemoryBridge};
pub use ops::{
    format_actions, Bucket, DataplaneOp, FlowAction, FlowEntry, FlowMatch, GroupSpec, GroupType,
    Table, PRIORITY_DEFAULT, PRIORITY_DELIVERY, PRIORITY_DROP, PRIORITY_INGRESS,
    PRIORITY_STEERING,
};

use crate::debug_log;
use crate::group::{ensure_group, GroupApply};
use sfc_types::MacAddress;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Dataplane {op} failed: {message}")]
pub struct DataplaneError {
    pub op: &'static str,
    pub message: String,
}

impl DataplaneError {
    pub fn new(op: &'static str, message: impl Into<String>) -> Self {
        Self {
            op,
            message: message.into(),
        }
    }
}

/// A logical port attached to the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortInfo {
    pub ofport: u32,
    pub mac: MacAddress,
}

/// Resolves logical port ids to bridge ports. A port that is not attached
/// to this bridge resolves to `None`.
pub trait PortLookup {
    fn resolve_port(&self, port_id: &str) -> Option<PortInfo>;
}

/// Flow and group primitives of one bridge.
pub trait Dataplane: PortLookup {
    /// Installs the entry, replacing any entry with the same
    /// (table, priority, match).
    fn add_flow(&mut self, flow: &FlowEntry) -> Result<(), DataplaneError>;

    /// Strict delete when `priority` is given, non-strict otherwise.
    fn delete_flows(
        &mut self,
        table: Option<Table>,
        priority: Option<u16>,
        matches: &FlowMatch,
    ) -> Result<(), DataplaneError>;

    fn add_group(&mut self, group: &GroupSpec) -> Result<(), DataplaneError>;
    fn modify_group(&mut self, group: &GroupSpec) -> Result<(), DataplaneError>;
    fn delete_group(&mut self, group_id: u32) -> Result<(), DataplaneError>;
    fn delete_all_groups(&mut self) -> Result<(), DataplaneError>;
    fn dump_group(&self, group_id: u32) -> Result<Option<GroupSpec>, DataplaneError>;
}

/// Counts of what one [`execute`] call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionSummary {
    pub flows_added: u64,
    pub flow_deletes: u64,
    pub groups_created: u64,
    pub groups_modified: u64,
    pub groups_deleted: u64,
}

pub fn execute(
    dataplane: &mut dyn Dataplane,
    ops: &[DataplaneOp],
) -> Result<ExecutionSummary, DataplaneError> {
    let mut summary = ExecutionSummary::default();

    for op in ops {
        match op {
            DataplaneOp::AddFlow(entry) => {
                debug_log!("Dataplane", flow = %entry, "add-flow");
                dataplane.add_flow(entry)?;
                summary.flows_added += 1;
            }
            DataplaneOp::DeleteFlows {
                table,
                priority,
                matches,
            } => {
                debug_log!(
                    "Dataplane",
                    table = ?table.map(|t| t.id()),
                    priority = ?priority,
                    matches = %matches,
                    "del-flows"
                );
                dataplane.delete_flows(*table, *priority, matches)?;
                summary.flow_deletes += 1;
            }
            DataplaneOp::EnsureGroup(group) => match ensure_group(dataplane, group)? {
                GroupApply::Created => summary.groups_created += 1,
                GroupApply::Modified => summary.groups_modified += 1,
            },
            DataplaneOp::DeleteGroup(group_id) => {
                debug_log!("Dataplane", group_id = *group_id, "del-group");
                dataplane.delete_group(*group_id)?;
                summary.groups_deleted += 1;
            }
            DataplaneOp::DeleteAllGroups => {
                debug_log!("Dataplane", "del-groups all");
                dataplane.delete_all_groups()?;
            }
        }
    }
    Ok(summary)
}
