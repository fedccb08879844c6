//! Path node flow compilation.
//!
//! Turns one [`FlowRule`] into the ordered [`DataplaneOp`] list that
//! installs (or removes) its entries in the three chain tables:
//!
//! ```text
//! local-switching (0) ──> cross-subnet (5) ──> chain-ingress (10)
//!   classify / tag          member MAC,           strip tag and
//!   resubmit / group        local or transport    deliver to the hop
//! ```
//!
//! Every entry goes through [`DataplaneOp::flow`], so compiling the same
//! rule with `add = false` yields strict deletes of exactly the entries an
//! `add = true` compilation installs.

use super::types::{CompileError, FlowRule, NodeRole};
use crate::classifier::{self, ipv4_or_any, FlowClassifier};
use crate::config::CompilerContext;
use crate::dataplane::{
    DataplaneOp, FlowAction, FlowMatch, PortInfo, PortLookup, Table, PRIORITY_DEFAULT,
    PRIORITY_DELIVERY, PRIORITY_INGRESS, PRIORITY_STEERING,
};
use crate::debug_log;
use crate::group;
use sfc_types::{EtherType, MacAddress};
use std::collections::HashSet;

const IPV4: u16 = EtherType::Ipv4.value();

pub type Result<T> = std::result::Result<T, CompileError>;

/// Compiles flow rules against the ports of one bridge.
pub struct FlowCompiler<'a> {
    ctx: &'a CompilerContext,
    ports: &'a dyn PortLookup,
}

impl<'a> FlowCompiler<'a> {
    pub fn new(ctx: &'a CompilerContext, ports: &'a dyn PortLookup) -> Self {
        Self { ctx, ports }
    }

    /// Entries for `rule.add_fcs`, forward and (when bidirectional) reverse.
    pub fn compile_update(&self, rule: &FlowRule) -> Result<Vec<DataplaneOp>> {
        let mut ops = Vec::new();

        if rule.egress.is_some() {
            ops.extend(self.compile_egress(rule, &rule.add_fcs, true)?);
            if rule.reverse_path {
                let rev = rule.reversed();
                ops.extend(self.compile_destination(&rev, &rev.add_fcs, true)?);
            }
        }

        if rule.ingress.is_some() {
            ops.extend(self.compile_destination(rule, &rule.add_fcs, true)?);
            if rule.reverse_path {
                let rev = rule.reversed();
                ops.extend(self.compile_egress(&rev, &rev.add_fcs, true)?);
            }
        }

        Ok(ops)
    }

    /// Removes the entries for `rule.del_fcs`, plus the next-hop group when
    /// this rule held its last reference.
    pub fn compile_delete(&self, rule: &FlowRule) -> Result<Vec<DataplaneOp>> {
        let mut ops = Vec::new();
        let mut egress_side = false;

        if rule.egress.is_some() {
            ops.extend(self.compile_egress(rule, &rule.del_fcs, false)?);
            egress_side = true;
        }

        if let Some(port_id) = rule.ingress.as_deref() {
            ops.extend(self.compile_destination(rule, &rule.del_fcs, false)?);
            ops.extend(self.legacy_mpls_cleanup(rule, port_id));
        }

        if rule.reverse_path {
            let rev = rule.reversed();
            let mid_chain = rule.node_role == NodeRole::ServiceFunction;
            if rule.ingress.is_some() || mid_chain {
                ops.extend(self.compile_egress(&rev, &rev.del_fcs, false)?);
                egress_side = true;
            }
            if rule.egress.is_some() || mid_chain {
                ops.extend(self.compile_destination(&rev, &rev.del_fcs, false)?);
            }
        }

        if egress_side && rule.releases_group() {
            if let Some(group) = rule.active_group() {
                debug_log!(
                    "FlowCompiler",
                    rule = %rule.id,
                    group_id = group.group_id,
                    refcnt = ?rule.group_refcnt,
                    "releasing next-hop group"
                );
                ops.extend(group::teardown_ops(group));
            }
        }

        self.keep_shared_entries(rule, &mut ops);
        Ok(ops)
    }

    /// Drops strict deletes of entries another chain on the same port
    /// detail still installs.
    fn keep_shared_entries(&self, rule: &FlowRule, ops: &mut Vec<DataplaneOp>) {
        if rule.shared_with.is_empty() {
            return;
        }
        let installs: Vec<DataplaneOp> = rule
            .shared_with
            .iter()
            .filter_map(|shared| self.compile_update(shared).ok())
            .flatten()
            .collect();
        let kept: HashSet<_> = installs.iter().filter_map(DataplaneOp::flow_key).collect();

        let before = ops.len();
        ops.retain(|op| {
            !matches!(op, DataplaneOp::DeleteFlows { .. })
                || op.flow_key().map_or(true, |key| !kept.contains(&key))
        });
        if ops.len() < before {
            debug_log!(
                "FlowCompiler",
                rule = %rule.id,
                kept = before - ops.len(),
                "keeping entries shared with other chains"
            );
        }
    }

    /// Egress side of a hop: group members and the group (install only),
    /// head classification entries, then the source-based set.
    pub fn compile_egress(
        &self,
        rule: &FlowRule,
        fcs: &[FlowClassifier],
        add: bool,
    ) -> Result<Vec<DataplaneOp>> {
        let mut ops = Vec::new();

        if add {
            if let Some(group) = rule.active_group() {
                ops.extend(group::ensure_ops(group, rule.segment_id, self.ctx));
            }
        }

        if rule.node_role == NodeRole::Source {
            ops.extend(self.compile_classification(rule, fcs, add)?);
        }

        ops.extend(self.compile_source(rule, fcs, add)?);
        Ok(ops)
    }

    /// Source-based set, shared by the head and service-function nodes.
    pub fn compile_source(
        &self,
        rule: &FlowRule,
        fcs: &[FlowClassifier],
        add: bool,
    ) -> Result<Vec<DataplaneOp>> {
        let mut ops = Vec::new();
        let vid = rule.segment_id.vid();
        let in_port = self.inbound_ofport(rule)?;

        if let Some(group) = rule.active_group() {
            let ldp_mac = fcs.iter().find_map(|fc| fc.ldp_mac_address);
            if in_port.is_none() && ldp_mac.is_none() {
                // Nothing narrower than "all IPv4" to key the entry on.
                return Ok(ops);
            }
            let mut matches = FlowMatch::new().maybe_in_port(in_port).dl_type(IPV4);
            if let Some(mac) = ldp_mac {
                matches = matches.dl_dst(mac);
            }
            ops.push(DataplaneOp::flow(
                add,
                Table::LocalSwitching,
                PRIORITY_STEERING,
                matches,
                vec![FlowAction::ModVlanVid(vid), FlowAction::Group(group.group_id)],
            ));
            return Ok(ops);
        }

        if rule.node_role != NodeRole::Source {
            if let Some(ofport) = in_port {
                ops.push(DataplaneOp::flow(
                    add,
                    Table::LocalSwitching,
                    PRIORITY_DELIVERY,
                    FlowMatch::new().in_port(ofport).dl_type(IPV4),
                    vec![
                        FlowAction::ModVlanVid(vid),
                        FlowAction::Resubmit(Table::CrossSubnet),
                    ],
                ));
            }
        }

        if fcs.is_empty() {
            return Ok(ops);
        }

        let node_mac = self.node_mac(rule)?;
        for fc in fcs {
            let Some(nw_dst) = self.ipv4_destination(fc) else {
                continue;
            };
            let local_ldp = fc
                .logical_destination_port
                .as_deref()
                .and_then(|port_id| self.ports.resolve_port(port_id));
            let ldp_mac = fc.ldp_mac_address.or(local_ldp.map(|port| port.mac));

            let actions = match local_ldp {
                Some(port) => {
                    let mut actions = vec![FlowAction::StripVlan];
                    actions.extend(ldp_mac.map(FlowAction::ModDlDst));
                    actions.push(FlowAction::Output(port.ofport));
                    actions
                }
                None => {
                    let mut actions = vec![FlowAction::ModVlanVid(vid), FlowAction::ModDlSrc(node_mac)];
                    actions.extend(ldp_mac.map(FlowAction::ModDlDst));
                    actions.push(FlowAction::Output(self.ctx.transport_ofport));
                    actions
                }
            };

            ops.push(DataplaneOp::flow(
                add,
                Table::CrossSubnet,
                PRIORITY_STEERING,
                FlowMatch::new()
                    .dl_type(IPV4)
                    .dl_vlan(vid)
                    .dl_dst(node_mac)
                    .nw_dst(nw_dst),
                actions,
            ));
        }

        Ok(ops)
    }

    /// Destination-based set at a hop's ingress port.
    pub fn compile_destination(
        &self,
        rule: &FlowRule,
        fcs: &[FlowClassifier],
        add: bool,
    ) -> Result<Vec<DataplaneOp>> {
        let mut ops = Vec::new();
        let vid = rule.segment_id.vid();
        let port = self.required_port(rule.ingress.as_deref(), "ingress")?;

        if rule.active_group().is_none() {
            for fc in fcs {
                let Some(nw_dst) = self.ipv4_destination(fc) else {
                    continue;
                };
                ops.push(DataplaneOp::flow(
                    add,
                    Table::ChainIngress,
                    PRIORITY_DELIVERY,
                    FlowMatch::new()
                        .dl_type(IPV4)
                        .dl_vlan(vid)
                        .dl_dst(port.mac)
                        .nw_dst(nw_dst),
                    vec![FlowAction::StripVlan, FlowAction::Output(port.ofport)],
                ));
            }

            if !fcs.is_empty() {
                ops.push(DataplaneOp::flow(
                    add,
                    Table::LocalSwitching,
                    PRIORITY_STEERING,
                    FlowMatch::new()
                        .in_port(self.ctx.transport_ofport)
                        .dl_type(IPV4)
                        .dl_vlan(vid)
                        .dl_dst(port.mac),
                    vec![FlowAction::Resubmit(Table::ChainIngress)],
                ));
            }
            return Ok(ops);
        }

        let Some(fc) = fcs.first() else {
            return Ok(ops);
        };
        let Some(nw_src) = ipv4_or_any(fc.source_ip_prefix.as_ref()) else {
            debug_log!("FlowCompiler", classifier = %fc.id, "no IPv4 source prefix, skipping");
            return Ok(ops);
        };

        let mut actions = vec![FlowAction::StripVlan];
        actions.extend(fc.lsp_mac_address.map(FlowAction::ModDlSrc));
        actions.push(FlowAction::Output(port.ofport));
        ops.push(DataplaneOp::flow(
            add,
            Table::ChainIngress,
            PRIORITY_STEERING,
            FlowMatch::new()
                .dl_type(IPV4)
                .dl_vlan(vid)
                .dl_dst(port.mac)
                .nw_src(nw_src),
            actions,
        ));
        ops.push(DataplaneOp::flow(
            add,
            Table::LocalSwitching,
            PRIORITY_STEERING,
            FlowMatch::new().dl_type(IPV4).dl_vlan(vid).dl_dst(port.mac),
            vec![FlowAction::Resubmit(Table::ChainIngress)],
        ));
        Ok(ops)
    }

    /// Head classification: one local-switching entry per compiled match
    /// field set, tagging traffic into the chain.
    fn compile_classification(
        &self,
        rule: &FlowRule,
        fcs: &[FlowClassifier],
        add: bool,
    ) -> Result<Vec<DataplaneOp>> {
        let in_port = self.inbound_ofport(rule)?;
        let priority = if in_port.is_some() {
            PRIORITY_INGRESS
        } else {
            PRIORITY_DEFAULT
        };
        let vid = rule.segment_id.vid();
        let forward = match rule.active_group() {
            Some(group) => vec![FlowAction::ModVlanVid(vid), FlowAction::Group(group.group_id)],
            None => vec![
                FlowAction::ModVlanVid(vid),
                FlowAction::Resubmit(Table::CrossSubnet),
            ],
        };

        let mut ops = Vec::new();
        for fc in fcs {
            for fields in classifier::compile(fc)? {
                ops.push(DataplaneOp::flow(
                    add,
                    Table::LocalSwitching,
                    priority,
                    fields.apply_to(FlowMatch::new().maybe_in_port(in_port)),
                    forward.clone(),
                ));
            }
        }
        Ok(ops)
    }

    /// Removes ingress entries left by the MPLS-encapsulating pipeline.
    fn legacy_mpls_cleanup(&self, rule: &FlowRule, port_id: &str) -> Option<DataplaneOp> {
        let port = self.ports.resolve_port(port_id)?;
        Some(DataplaneOp::DeleteFlows {
            table: Some(Table::ChainIngress),
            priority: None,
            matches: FlowMatch::new()
                .dl_type(EtherType::MPLS_UNICAST)
                .dl_dst(port.mac)
                .mpls_label(rule.mpls_label()),
        })
    }

    /// OpenFlow port of the node's egress. Service-function egress ports
    /// must be on this bridge; the head may classify without one.
    fn inbound_ofport(&self, rule: &FlowRule) -> Result<Option<u32>> {
        let Some(port_id) = rule.egress.as_deref() else {
            return Ok(None);
        };
        match self.ports.resolve_port(port_id) {
            Some(port) => Ok(Some(port.ofport)),
            None if rule.node_role == NodeRole::Source => Ok(None),
            None => Err(CompileError::PortNotFound(port_id.to_string())),
        }
    }

    /// MAC the chain addresses this node by: its ingress port if attached,
    /// otherwise its egress port.
    fn node_mac(&self, rule: &FlowRule) -> Result<MacAddress> {
        [rule.ingress.as_deref(), rule.egress.as_deref()]
            .into_iter()
            .flatten()
            .find_map(|port_id| self.ports.resolve_port(port_id))
            .map(|port| port.mac)
            .ok_or_else(|| match rule.ingress.as_deref().or(rule.egress.as_deref()) {
                Some(port_id) => CompileError::PortNotFound(port_id.to_string()),
                None => CompileError::MissingPort { role: "ingress or egress" },
            })
    }

    fn required_port(&self, port_id: Option<&str>, role: &'static str) -> Result<PortInfo> {
        let port_id = port_id.ok_or(CompileError::MissingPort { role })?;
        self.ports
            .resolve_port(port_id)
            .ok_or_else(|| CompileError::PortNotFound(port_id.to_string()))
    }

    fn ipv4_destination(&self, fc: &FlowClassifier) -> Option<sfc_types::Ipv4Prefix> {
        if fc.ethertype == EtherType::Ipv6 {
            debug_log!("FlowCompiler", classifier = %fc.id, "IPv6 classifier, skipping");
            return None;
        }
        ipv4_or_any(fc.destination_ip_prefix.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataplane::{execute, MemoryBridge};
    use crate::group::{NextHop, NextHopGroup};
    use pretty_assertions::assert_eq;
    use sfc_types::{IpProtocol, SegmentId};

    fn mac(last: u8) -> MacAddress {
        MacAddress::new([0xfa, 0x16, 0x3e, 0, 0, last])
    }

    fn bridge() -> MemoryBridge {
        MemoryBridge::new()
            .with_port("vm-src", 11, mac(0x11))
            .with_port("vm-dst", 12, mac(0x12))
            .with_port("sf-in", 21, mac(0x21))
            .with_port("sf-out", 22, mac(0x22))
    }

    fn ctx() -> CompilerContext {
        CompilerContext::new("compute-1", 2)
    }

    fn web() -> FlowClassifier {
        FlowClassifier {
            protocol: Some(IpProtocol::Tcp),
            destination_port_range_min: Some(80),
            destination_port_range_max: Some(83),
            destination_ip_prefix: Some("10.0.0.12/32".parse().unwrap()),
            logical_source_port: Some("vm-src".to_string()),
            logical_destination_port: Some("vm-dst".to_string()),
            lsp_mac_address: Some(mac(0x11)),
            ldp_mac_address: Some(mac(0x12)),
            ..FlowClassifier::new("web")
        }
    }

    fn head() -> FlowRule {
        let mut rule = FlowRule::new("head:pd-src", NodeRole::Source, 1, 0xff, SegmentId::new(100).unwrap());
        rule.egress = Some("vm-src".to_string());
        rule.add_fcs = vec![web()];
        rule.del_fcs = vec![web()];
        rule
    }

    fn sf() -> FlowRule {
        let mut rule = FlowRule::new("sf1:pd-pp", NodeRole::ServiceFunction, 1, 0xfe, SegmentId::new(100).unwrap());
        rule.ingress = Some("sf-in".to_string());
        rule.egress = Some("sf-out".to_string());
        rule.add_fcs = vec![web()];
        rule.del_fcs = vec![web()];
        rule
    }

    fn two_way_group() -> NextHopGroup {
        NextHopGroup::new(
            1,
            vec![
                NextHop::new("pp-a", mac(0x21), 3).on_host("compute-1"),
                NextHop::new("pp-b", mac(0x31), 1).on_host("compute-2"),
            ],
        )
    }

    fn rendered(ops: &[DataplaneOp]) -> Vec<String> {
        ops.iter()
            .filter_map(DataplaneOp::as_add_flow)
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn test_single_path_head() {
        let bridge = bridge();
        let ctx = ctx();
        let ops = FlowCompiler::new(&ctx, &bridge).compile_update(&head()).unwrap();

        assert_eq!(
            rendered(&ops),
            vec![
                "table=0,priority=30,in_port=11,dl_type=0x0800,nw_proto=6,nw_src=0.0.0.0/0,nw_dst=10.0.0.12/32,tp_dst=80/0xfffc,actions=mod_vlan_vid:100,resubmit(,5)",
                "table=5,priority=50,dl_type=0x0800,dl_vlan=100,dl_dst=fa:16:3e:00:00:11,nw_dst=10.0.0.12/32,actions=strip_vlan,mod_dl_dst:fa:16:3e:00:00:12,output:12",
            ]
        );
        assert!(!ops.iter().any(DataplaneOp::is_group_op));
    }

    #[test]
    fn test_head_with_group() {
        let bridge = bridge();
        let ctx = ctx();
        let mut rule = head();
        rule.next_hop_group = Some(two_way_group());

        let ops = FlowCompiler::new(&ctx, &bridge).compile_update(&rule).unwrap();
        assert_eq!(
            rendered(&ops),
            vec![
                "table=5,priority=30,dl_type=0x0800,dl_dst=fa:16:3e:00:00:21,actions=mod_vlan_vid:100,resubmit(,10)",
                "table=5,priority=30,dl_type=0x0800,dl_dst=fa:16:3e:00:00:31,actions=output:2",
                "table=0,priority=30,in_port=11,dl_type=0x0800,nw_proto=6,nw_src=0.0.0.0/0,nw_dst=10.0.0.12/32,tp_dst=80/0xfffc,actions=mod_vlan_vid:100,group:1",
                "table=0,priority=50,in_port=11,dl_type=0x0800,dl_dst=fa:16:3e:00:00:12,actions=mod_vlan_vid:100,group:1",
            ]
        );
        let groups: Vec<_> = ops
            .iter()
            .filter_map(|op| match op {
                DataplaneOp::EnsureGroup(spec) => Some(spec),
                _ => None,
            })
            .collect();
        assert_eq!(groups.len(), 1);
        assert_eq!(
            groups[0].buckets.iter().map(|b| b.weight).collect::<Vec<_>>(),
            vec![3, 1]
        );
    }

    #[test]
    fn test_head_without_local_port_uses_default_priority() {
        let bridge = MemoryBridge::new();
        let ctx = ctx();
        let mut rule = head();
        rule.add_fcs[0].logical_destination_port = None;

        let err = FlowCompiler::new(&ctx, &bridge).compile_update(&rule).unwrap_err();
        // classification still compiles, the source-based set needs a node MAC
        assert_eq!(err, CompileError::PortNotFound("vm-src".to_string()));

        let ops = FlowCompiler::new(&ctx, &bridge)
            .compile_classification(&rule, &rule.add_fcs, true)
            .unwrap();
        assert_eq!(ops[0].as_add_flow().unwrap().priority, PRIORITY_DEFAULT);
    }

    #[test]
    fn test_service_function_hop() {
        let bridge = bridge();
        let ctx = ctx();
        let ops = FlowCompiler::new(&ctx, &bridge).compile_update(&sf()).unwrap();

        assert_eq!(
            rendered(&ops),
            vec![
                "table=0,priority=60,in_port=22,dl_type=0x0800,actions=mod_vlan_vid:100,resubmit(,5)",
                "table=5,priority=50,dl_type=0x0800,dl_vlan=100,dl_dst=fa:16:3e:00:00:21,nw_dst=10.0.0.12/32,actions=strip_vlan,mod_dl_dst:fa:16:3e:00:00:12,output:12",
                "table=10,priority=60,dl_type=0x0800,dl_vlan=100,dl_dst=fa:16:3e:00:00:21,nw_dst=10.0.0.12/32,actions=strip_vlan,output:21",
                "table=0,priority=50,in_port=2,dl_type=0x0800,dl_vlan=100,dl_dst=fa:16:3e:00:00:21,actions=resubmit(,10)",
            ]
        );
    }

    #[test]
    fn test_remote_destination_uses_transport() {
        let mut bridge = bridge();
        bridge.remove_port("vm-dst");
        let ctx = ctx();

        let ops = FlowCompiler::new(&ctx, &bridge)
            .compile_source(&sf(), &[web()], true)
            .unwrap();
        assert_eq!(
            ops[1].as_add_flow().unwrap().actions,
            vec![
                FlowAction::ModVlanVid(100),
                FlowAction::ModDlSrc(mac(0x21)),
                FlowAction::ModDlDst(mac(0x12)),
                FlowAction::Output(2),
            ]
        );
    }

    #[test]
    fn test_destination_with_group_guards_source_ip() {
        let bridge = bridge();
        let ctx = ctx();
        let mut rule = sf();
        rule.next_hop_group = Some(two_way_group());
        let mut fc = web();
        fc.source_ip_prefix = Some("10.0.0.11".parse().unwrap());

        let ops = FlowCompiler::new(&ctx, &bridge)
            .compile_destination(&rule, &[fc], true)
            .unwrap();
        assert_eq!(
            rendered(&ops),
            vec![
                "table=10,priority=50,dl_type=0x0800,dl_vlan=100,dl_dst=fa:16:3e:00:00:21,nw_src=10.0.0.11/32,actions=strip_vlan,mod_dl_src:fa:16:3e:00:00:11,output:21",
                "table=0,priority=50,dl_type=0x0800,dl_vlan=100,dl_dst=fa:16:3e:00:00:21,actions=resubmit(,10)",
            ]
        );
    }

    #[test]
    fn test_destination_requires_attached_ingress() {
        let bridge = MemoryBridge::new();
        let ctx = ctx();
        let compiler = FlowCompiler::new(&ctx, &bridge);

        assert_eq!(
            compiler.compile_destination(&sf(), &[web()], true).unwrap_err(),
            CompileError::PortNotFound("sf-in".to_string())
        );
        assert_eq!(
            compiler.compile_destination(&head(), &[web()], true).unwrap_err(),
            CompileError::MissingPort { role: "ingress" }
        );
    }

    #[test]
    fn test_delete_mirrors_update() {
        let ctx = ctx();
        for mut rule in [head(), sf()] {
            for bidirectional in [false, true] {
                rule.reverse_path = bidirectional;
                let mut bridge = bridge();
                let before = bridge.snapshot();

                let add = FlowCompiler::new(&ctx, &bridge).compile_update(&rule).unwrap();
                execute(&mut bridge, &add).unwrap();
                assert!(bridge.flow_count() > 0);

                let del = FlowCompiler::new(&ctx, &bridge).compile_delete(&rule).unwrap();
                execute(&mut bridge, &del).unwrap();
                assert_eq!(bridge.snapshot(), before, "{} reverse={}", rule.id, bidirectional);
            }
        }
    }

    #[test]
    fn test_group_kept_while_shared() {
        let ctx = ctx();
        let mut rule = head();
        rule.next_hop_group = Some(two_way_group());
        let mut bridge = bridge();

        let add = FlowCompiler::new(&ctx, &bridge).compile_update(&rule).unwrap();
        execute(&mut bridge, &add).unwrap();

        rule.group_refcnt = Some(2);
        let del = FlowCompiler::new(&ctx, &bridge).compile_delete(&rule).unwrap();
        execute(&mut bridge, &del).unwrap();
        assert_eq!(bridge.group_count(), 1);
        assert_eq!(bridge.flows_in(Table::CrossSubnet).len(), 2);

        rule.group_refcnt = Some(1);
        let del = FlowCompiler::new(&ctx, &bridge).compile_delete(&rule).unwrap();
        execute(&mut bridge, &del).unwrap();
        assert_eq!(bridge.group_count(), 0);
        assert_eq!(bridge.flow_count(), 0);
    }

    #[test]
    fn test_delete_keeps_entries_of_sharing_rule() {
        let ctx = ctx();
        let mut bridge = bridge();
        let ours = sf();
        let mut theirs = sf();
        theirs.id = "sf9:pd-pp".to_string();
        theirs.nsp = 9;
        let mut other = web();
        other.id = "other".to_string();
        other.destination_ip_prefix = Some("10.0.0.99/32".parse().unwrap());
        theirs.add_fcs = vec![web(), other];

        for rule in [&ours, &theirs] {
            let add = FlowCompiler::new(&ctx, &bridge).compile_update(rule).unwrap();
            execute(&mut bridge, &add).unwrap();
        }
        let mut only_theirs = self::bridge();
        let add = FlowCompiler::new(&ctx, &only_theirs).compile_update(&theirs).unwrap();
        execute(&mut only_theirs, &add).unwrap();

        let mut deleting = ours.clone();
        deleting.shared_with = vec![theirs.clone()];
        let del = FlowCompiler::new(&ctx, &bridge).compile_delete(&deleting).unwrap();
        execute(&mut bridge, &del).unwrap();
        assert_eq!(bridge.snapshot(), only_theirs.snapshot());

        // without the sharing rule every entry goes
        let del = FlowCompiler::new(&ctx, &bridge).compile_delete(&ours).unwrap();
        assert_eq!(del.iter().filter(|op| op.flow_key().is_some()).count(), 4);
    }

    #[test]
    fn test_ipv6_classifier_programs_nothing() {
        let bridge = bridge();
        let ctx = ctx();
        let mut rule = head();
        rule.add_fcs[0].ethertype = EtherType::Ipv6;
        rule.add_fcs[0].destination_ip_prefix = Some("2001:db8::/64".parse().unwrap());

        let ops = FlowCompiler::new(&ctx, &bridge).compile_update(&rule).unwrap();
        assert_eq!(ops, vec![]);
    }
}
