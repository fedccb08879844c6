//! Select-group programming.
//!
//! The manager is stateless: whether a group may be deleted depends on a
//! reference count the caller computes and passes in with the flow rule.

use super::types::NextHopGroup;
use crate::config::CompilerContext;
use crate::dataplane::{
    Bucket, Dataplane, DataplaneError, DataplaneOp, FlowAction, FlowMatch, GroupSpec, GroupType,
    Table, PRIORITY_INGRESS,
};
use crate::{audit_log, audit::{AuditCategory, AuditOutcome, AuditRecord}, debug_log};
use sfc_types::{EtherType, MacAddress, SegmentId};

/// Whether [`ensure_group`] created the group or replaced its buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupApply {
    Created,
    Modified,
}

/// One bucket per member: rewrite the destination MAC to the member and
/// continue in the cross-subnet table.
pub fn build_buckets(group: &NextHopGroup) -> Vec<Bucket> {
    group
        .members
        .iter()
        .map(|member| Bucket {
            weight: member.weight,
            actions: vec![
                FlowAction::ModDlDst(member.mac_address),
                FlowAction::Resubmit(Table::CrossSubnet),
            ],
        })
        .collect()
}

pub fn group_spec(group: &NextHopGroup) -> GroupSpec {
    GroupSpec {
        group_id: group.group_id,
        group_type: GroupType::Select,
        buckets: build_buckets(group),
    }
}

/// Cross-subnet entries for every member followed by the group itself.
///
/// A member bound to this host is re-tagged and handed to the chain-ingress
/// table; any other member leaves through the transport port.
pub fn ensure_ops(group: &NextHopGroup, segment: SegmentId, ctx: &CompilerContext) -> Vec<DataplaneOp> {
    let mut ops: Vec<DataplaneOp> = group
        .members
        .iter()
        .map(|member| {
            let actions = if ctx.is_local(member.host_id.as_deref()) {
                vec![
                    FlowAction::ModVlanVid(segment.vid()),
                    FlowAction::Resubmit(Table::ChainIngress),
                ]
            } else {
                vec![FlowAction::Output(ctx.transport_ofport)]
            };
            DataplaneOp::flow(
                true,
                Table::CrossSubnet,
                PRIORITY_INGRESS,
                member_match(member.mac_address),
                actions,
            )
        })
        .collect();
    ops.push(DataplaneOp::EnsureGroup(group_spec(group)));
    ops
}

/// Removes the group and the member entries [`ensure_ops`] installed.
pub fn teardown_ops(group: &NextHopGroup) -> Vec<DataplaneOp> {
    let mut ops = vec![DataplaneOp::DeleteGroup(group.group_id)];
    ops.extend(group.members.iter().map(|member| {
        DataplaneOp::flow(
            false,
            Table::CrossSubnet,
            PRIORITY_INGRESS,
            member_match(member.mac_address),
            Vec::new(),
        )
    }));
    ops
}

fn member_match(mac: MacAddress) -> FlowMatch {
    FlowMatch::new().dl_type(EtherType::Ipv4.value()).dl_dst(mac)
}

/// Creates the group, or replaces the buckets of an existing one.
pub fn ensure_group(dataplane: &mut dyn Dataplane, group: &GroupSpec) -> Result<GroupApply, DataplaneError> {
    let existing = dataplane.dump_group(group.group_id)?;
    let (result, action) = match existing {
        None => (dataplane.add_group(group).map(|_| GroupApply::Created), "add_group"),
        Some(_) => (dataplane.modify_group(group).map(|_| GroupApply::Modified), "modify_group"),
    };

    match &result {
        Ok(_) => {
            debug_log!(
                "GroupManager",
                group_id = group.group_id,
                buckets = group.buckets.len(),
                "{}",
                action
            );
            audit_log!(
                AuditRecord::new(AuditCategory::GroupLifecycle, "GroupManager", action)
                    .with_outcome(AuditOutcome::Success)
                    .with_object_id(group.group_id.to_string())
                    .with_object_type("select_group")
                    .with_details(serde_json::json!({
                        "buckets": group.buckets.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    }))
            );
        }
        Err(e) => {
            audit_log!(
                AuditRecord::new(AuditCategory::GroupLifecycle, "GroupManager", action)
                    .with_object_id(group.group_id.to_string())
                    .with_object_type("select_group")
                    .with_error(e.to_string())
            );
        }
    }
    result
}
