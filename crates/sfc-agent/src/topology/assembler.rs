//! Chain topology assembly.
//!
//! The assembler owns the path nodes of every chain and the port details
//! bound to them. It never touches the dataplane: every operation returns
//! the flow rules an agent has to apply or delete.

use super::store::{ChainStore, PortBindingResolver};
use super::types::{
    NetworkType, NodeStatus, PathNode, PathPortAssoc, PortBinding, PortDetail, PortPair, Result,
    TopologyError, HEAD_NSI, MAX_CHAIN_LENGTH,
};
use crate::classifier::{ClassifierPolicy, FlowClassifier};
use crate::flow::{FlowRule, FlowRuleStatus, NodeRole, RuleStatus};
use crate::group::{NextHop, NextHopGroup};
use crate::reverse::is_bidirectional;
use crate::{
    audit::{AuditCategory, AuditOutcome, AuditRecord},
    audit_log, debug_log, info_log, warn_log,
};
use sfc_types::{Ipv4Prefix, SegmentId};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopologyStats {
    pub chains_created: u64,
    pub chains_deleted: u64,
    pub chains_rejected: u64,
    pub nodes_created: u64,
    pub nodes_removed: u64,
    pub classifier_updates: u64,
}

/// Flow rules produced by a classifier change on a live chain. `delete`
/// must be applied before `apply`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassifierUpdate {
    pub delete: Vec<FlowRule>,
    pub apply: Vec<FlowRule>,
}

#[derive(Debug, Clone)]
struct ChainState {
    classifiers: Vec<FlowClassifier>,
    nodes: Vec<PathNode>,
}

impl ChainState {
    fn head(&self) -> Option<&PathNode> {
        self.nodes.iter().find(|n| n.role == NodeRole::Source)
    }

    fn head_mut(&mut self) -> Option<&mut PathNode> {
        self.nodes.iter_mut().find(|n| n.role == NodeRole::Source)
    }
}

struct ResolvedPair {
    pair: PortPair,
    ingress: PortBinding,
    egress: PortBinding,
}

/// One port pair group with every binding resolved.
struct Hop {
    group_id: u32,
    pairs: Vec<ResolvedPair>,
}

impl Hop {
    fn members(&self) -> Vec<NextHop> {
        self.pairs
            .iter()
            .map(|rp| {
                let member = NextHop::new(rp.pair.id.clone(), rp.ingress.mac_address, rp.pair.weight);
                match &rp.ingress.host_id {
                    Some(host) if rp.ingress.network_type.is_supported() => member.on_host(host.clone()),
                    _ => member,
                }
            })
            .collect()
    }

    /// Only a hop that fans out gets a select group.
    fn next_group(&self) -> Option<NextHopGroup> {
        (self.pairs.len() > 1).then(|| NextHopGroup::new(self.group_id, self.members()))
    }

    fn port_details(&self) -> Vec<(PortDetail, u32)> {
        self.pairs
            .iter()
            .map(|rp| {
                (
                    PortDetail::for_pair(rp.pair.id.clone(), &rp.pair).bind(&rp.ingress),
                    rp.pair.weight,
                )
            })
            .collect()
    }
}

/// Path nodes and port details of every chain known to this controller.
pub struct Topology {
    store: Arc<dyn ChainStore>,
    resolver: Arc<dyn PortBindingResolver>,
    policy: ClassifierPolicy,
    chains: BTreeMap<String, ChainState>,
    port_details: HashMap<String, PortDetail>,
    assocs: Vec<PathPortAssoc>,
    /// Chain VLAN held for each VXLAN segment (VNI) still in use.
    local_tags: BTreeMap<u32, SegmentId>,
    stats: TopologyStats,
}

impl Topology {
    pub fn new(
        store: Arc<dyn ChainStore>,
        resolver: Arc<dyn PortBindingResolver>,
        policy: ClassifierPolicy,
    ) -> Self {
        Self {
            store,
            resolver,
            policy,
            chains: BTreeMap::new(),
            port_details: HashMap::new(),
            assocs: Vec::new(),
            local_tags: BTreeMap::new(),
            stats: TopologyStats::default(),
        }
    }

    pub fn stats(&self) -> &TopologyStats {
        &self.stats
    }

    pub fn chain_count(&self) -> usize {
        self.chains.len()
    }

    pub fn path_nodes(&self, chain_id: &str) -> Option<&[PathNode]> {
        self.chains.get(chain_id).map(|c| c.nodes.as_slice())
    }

    pub fn classifiers(&self, chain_id: &str) -> Option<&[FlowClassifier]> {
        self.chains.get(chain_id).map(|c| c.classifiers.as_slice())
    }

    pub fn port_detail(&self, id: &str) -> Option<&PortDetail> {
        self.port_details.get(id)
    }

    pub fn port_detail_count(&self) -> usize {
        self.port_details.len()
    }

    pub fn associations(&self) -> &[PathPortAssoc] {
        &self.assocs
    }

    /// Chain VLAN carrying the traffic of a VXLAN segment.
    pub fn local_tag(&self, vni: u32) -> Option<SegmentId> {
        self.local_tags.get(&vni).copied()
    }

    /// Builds the path of a chain and returns the flow rules installing it.
    ///
    /// Everything is validated before any node is created: a rejected chain
    /// leaves no state behind.
    pub fn create_chain(&mut self, chain_id: &str) -> Result<Vec<FlowRule>> {
        match self.build_chain(chain_id) {
            Ok(rules) => {
                self.stats.chains_created += 1;
                let nodes = self.path_nodes(chain_id).map_or(0, <[PathNode]>::len);
                info_log!("Topology", chain = chain_id, nodes, rules = rules.len(), "port chain path created");
                audit_log!(
                    AuditRecord::new(AuditCategory::ChainLifecycle, "Topology", "create_chain")
                        .with_outcome(AuditOutcome::Success)
                        .with_object_id(chain_id)
                        .with_object_type("port_chain")
                        .with_details(serde_json::json!({
                            "nodes": nodes,
                            "flow_rules": rules.len(),
                        }))
                );
                Ok(rules)
            }
            Err(e) => {
                self.stats.chains_rejected += 1;
                let category = match e {
                    TopologyError::CrossSubnet { .. } | TopologyError::Classifier(_) => AuditCategory::Validation,
                    _ => AuditCategory::ChainLifecycle,
                };
                warn_log!("Topology", chain = chain_id, error = %e, "port chain rejected");
                audit_log!(
                    AuditRecord::new(category, "Topology", "create_chain")
                        .with_object_id(chain_id)
                        .with_object_type("port_chain")
                        .with_error(e.to_string())
                        .with_outcome(AuditOutcome::Denied)
                );
                Err(e)
            }
        }
    }

    fn build_chain(&mut self, chain_id: &str) -> Result<Vec<FlowRule>> {
        if self.chains.contains_key(chain_id) {
            return Err(TopologyError::ChainExists(chain_id.to_string()));
        }
        let chain = self
            .store
            .port_chain(chain_id)
            .ok_or_else(|| TopologyError::ChainNotFound(chain_id.to_string()))?;

        let length = chain.port_pair_groups.len();
        if length == 0 {
            return Err(TopologyError::EmptyChain(chain.id));
        }
        let hop_count = u8::try_from(length)
            .ok()
            .filter(|_| length <= MAX_CHAIN_LENGTH)
            .ok_or_else(|| TopologyError::ChainTooLong {
                chain: chain.id.clone(),
                length,
            })?;

        let classifiers = self.load_classifiers(&chain.flow_classifiers)?;
        let hops = chain
            .port_pair_groups
            .iter()
            .map(|id| self.resolve_hop(id))
            .collect::<Result<Vec<_>>>()?;
        check_subnets(&hops)?;
        let classifier_ports = self.classifier_port_details(&classifiers)?;

        let mut head = PathNode::new(NodeRole::Source, chain.chain_id, HEAD_NSI, &chain.id);
        head.next_group = hops[0].next_group();
        let tail = PathNode::new(NodeRole::Destination, chain.chain_id, HEAD_NSI - hop_count - 1, &chain.id);

        let mut nodes = vec![head];
        for (i, hop) in (0u8..).zip(&hops) {
            let mut node = PathNode::new(NodeRole::ServiceFunction, chain.chain_id, HEAD_NSI - 1 - i, &chain.id);
            node.next_group = hops.get(usize::from(i) + 1).and_then(Hop::next_group);
            for (detail, weight) in hop.port_details() {
                self.associate(&mut node, detail, weight);
            }
            nodes.push(node);
        }
        nodes.push(tail);

        let node_count = nodes.len() as u64;
        self.chains.insert(chain.id.clone(), ChainState { classifiers, nodes });
        self.attach_classifier_ports(&chain.id, classifier_ports);
        self.refresh_reverse_path(&chain.id);

        match self.flow_rules_for_chain(&chain.id) {
            Ok(rules) => {
                self.stats.nodes_created += node_count;
                Ok(rules)
            }
            Err(e) => {
                self.remove_chain_state(&chain.id);
                Err(e)
            }
        }
    }

    /// Flow rules installing every node of the chain with all of its
    /// classifiers.
    pub fn flow_rules_for_chain(&self, chain_id: &str) -> Result<Vec<FlowRule>> {
        let state = self
            .chains
            .get(chain_id)
            .ok_or_else(|| TopologyError::ChainNotFound(chain_id.to_string()))?;
        let mut rules = Vec::new();
        for node in &state.nodes {
            rules.extend(self.node_rules(node, &state.classifiers, &[], None)?);
        }
        Ok(rules)
    }

    /// Removes the path of a chain and returns the flow rules deleting it.
    ///
    /// Each rule carries the number of nodes still citing its group at the
    /// moment its node goes away, and the rules of other chains sharing its
    /// port detail.
    pub fn delete_chain(&mut self, chain_id: &str) -> Result<Vec<FlowRule>> {
        let state = self
            .chains
            .get(chain_id)
            .ok_or_else(|| TopologyError::ChainNotFound(chain_id.to_string()))?;

        let reverse_path = state.head().is_some_and(|head| self.head_is_bidirectional(head));
        let mut references = self.group_references();
        let mut rules = Vec::new();
        for node in &state.nodes {
            let group_refcnt = node.group_id().and_then(|gid| {
                references.get_mut(&gid).map(|count| {
                    let current = *count;
                    *count = count.saturating_sub(1);
                    current
                })
            });
            let node = PathNode {
                reverse_path,
                ..node.clone()
            };
            rules.extend(self.removal_rules(chain_id, &node, &state.classifiers, group_refcnt)?);
        }

        if let Some(state) = self.remove_chain_state(chain_id) {
            self.stats.nodes_removed += state.nodes.len() as u64;
        }
        self.stats.chains_deleted += 1;

        info_log!("Topology", chain = chain_id, rules = rules.len(), "port chain path deleted");
        audit_log!(
            AuditRecord::new(AuditCategory::ChainLifecycle, "Topology", "delete_chain")
                .with_outcome(AuditOutcome::Success)
                .with_object_id(chain_id)
                .with_object_type("port_chain")
        );
        Ok(rules)
    }

    /// Adds and removes classifiers of a live chain.
    ///
    /// The delete batch removes the entries of the dropped classifiers and
    /// keeps every group; when the chain stops being bidirectional it
    /// removes every old classifier so no reverse entry is left behind. The
    /// apply batch reinstalls the chain with its resulting classifier list.
    pub fn update_classifiers(
        &mut self,
        chain_id: &str,
        added: &[String],
        removed: &[String],
    ) -> Result<ClassifierUpdate> {
        let state = self
            .chains
            .get(chain_id)
            .ok_or_else(|| TopologyError::ChainNotFound(chain_id.to_string()))?;
        let added: Vec<FlowClassifier> = self
            .load_classifiers(added)?
            .into_iter()
            .filter(|fc| !state.classifiers.iter().any(|c| c.id == fc.id))
            .collect();
        let dropped: Vec<FlowClassifier> = state
            .classifiers
            .iter()
            .filter(|fc| removed.contains(&fc.id))
            .cloned()
            .collect();
        let remaining: Vec<FlowClassifier> = state
            .classifiers
            .iter()
            .filter(|fc| !removed.contains(&fc.id))
            .chain(&added)
            .cloned()
            .collect();
        let new_ports = self.classifier_port_details(&added)?;

        let was_bidirectional = state.head().is_some_and(|head| self.head_is_bidirectional(head));
        let withdrawn = if was_bidirectional && !spans_both_ends(&remaining) {
            &state.classifiers
        } else {
            &dropped
        };
        let mut delete = Vec::new();
        for node in &state.nodes {
            delete.extend(self.removal_rules(chain_id, node, withdrawn, None)?);
        }

        if let Some(state) = self.chains.get_mut(chain_id) {
            state.classifiers = remaining;
        }
        self.attach_classifier_ports(chain_id, new_ports);
        self.detach_unused_classifier_ports(chain_id);
        self.refresh_reverse_path(chain_id);
        let apply = self.flow_rules_for_chain(chain_id)?;

        self.stats.classifier_updates += 1;
        audit_log!(
            AuditRecord::new(AuditCategory::ClassifierUpdate, "Topology", "update_classifiers")
                .with_outcome(AuditOutcome::Success)
                .with_object_id(chain_id)
                .with_object_type("port_chain")
                .with_details(serde_json::json!({
                    "added": added.iter().map(|fc| fc.id.as_str()).collect::<Vec<_>>(),
                    "removed": dropped.iter().map(|fc| fc.id.as_str()).collect::<Vec<_>>(),
                }))
        );
        Ok(ClassifierUpdate { delete, apply })
    }

    /// Folds agent results into node status: a node is active once all of
    /// its rules are active, and in error as soon as one failed. Returns the
    /// number of nodes updated.
    pub fn record_statuses(&mut self, statuses: &[FlowRuleStatus]) -> usize {
        let mut outcome: HashMap<&str, bool> = HashMap::new();
        for status in statuses {
            let node_id = status.id.split_once(':').map_or(status.id.as_str(), |(node, _)| node);
            let ok = status.status == RuleStatus::Active;
            outcome.entry(node_id).and_modify(|all| *all &= ok).or_insert(ok);
        }

        let mut updated = 0;
        for node in self.chains.values_mut().flat_map(|c| c.nodes.iter_mut()) {
            if let Some(&ok) = outcome.get(node.id.as_str()) {
                node.status = if ok { NodeStatus::Active } else { NodeStatus::Error };
                updated += 1;
            }
        }
        updated
    }

    fn load_classifiers(&self, ids: &[String]) -> Result<Vec<FlowClassifier>> {
        ids.iter()
            .map(|id| {
                let fc = self
                    .store
                    .flow_classifier(id)
                    .ok_or_else(|| TopologyError::FlowClassifierNotFound(id.clone()))?;
                fc.validate(self.policy)?;
                Ok(fc)
            })
            .collect()
    }

    fn binding(&self, port_id: &str) -> Result<PortBinding> {
        self.resolver
            .binding(port_id)
            .ok_or_else(|| TopologyError::PortNotBound(port_id.to_string()))
    }

    fn resolve_hop(&self, group_id: &str) -> Result<Hop> {
        let group = self
            .store
            .port_pair_group(group_id)
            .ok_or_else(|| TopologyError::PortPairGroupNotFound(group_id.to_string()))?;
        let pairs = group
            .port_pairs
            .iter()
            .map(|id| {
                let pair = self
                    .store
                    .port_pair(id)
                    .ok_or_else(|| TopologyError::PortPairNotFound(id.clone()))?;
                Ok(ResolvedPair {
                    ingress: self.binding(&pair.ingress)?,
                    egress: self.binding(&pair.egress)?,
                    pair,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Hop {
            group_id: group.group_id,
            pairs,
        })
    }

    /// Port details for the logical ports of `classifiers`: the known one
    /// for a port already in the chain set, a new bound one otherwise.
    fn classifier_port_details(&self, classifiers: &[FlowClassifier]) -> Result<Vec<PortDetail>> {
        let mut details: Vec<PortDetail> = Vec::new();
        for fc in classifiers {
            if let Some(port) = fc.logical_source_port.as_deref() {
                if !details.iter().any(|d| d.egress.as_deref() == Some(port) && d.ingress.is_none()) {
                    details.push(match self.find_classifier_port(None, Some(port)) {
                        Some(existing) => existing.clone(),
                        None => PortDetail::for_egress(new_id(), port).bind(&self.binding(port)?),
                    });
                }
            }
            if let Some(port) = fc.logical_destination_port.as_deref() {
                if !details.iter().any(|d| d.ingress.as_deref() == Some(port) && d.egress.is_none()) {
                    details.push(match self.find_classifier_port(Some(port), None) {
                        Some(existing) => existing.clone(),
                        None => PortDetail::for_ingress(new_id(), port).bind(&self.binding(port)?),
                    });
                }
            }
        }
        Ok(details)
    }

    fn find_classifier_port(&self, ingress: Option<&str>, egress: Option<&str>) -> Option<&PortDetail> {
        self.port_details
            .values()
            .find(|d| d.ingress.as_deref() == ingress && d.egress.as_deref() == egress)
    }

    fn associate(&mut self, node: &mut PathNode, detail: PortDetail, weight: u32) {
        if node.port_details.contains(&detail.id) {
            return;
        }
        node.port_details.push(detail.id.clone());
        self.assocs.push(PathPortAssoc {
            node_id: node.id.clone(),
            port_detail_id: detail.id.clone(),
            weight,
        });
        self.reserve_local_tag(&detail);
        self.port_details.insert(detail.id.clone(), detail);
    }

    /// VXLAN segments do not fit a VLAN tag, so each VNI gets a free chain
    /// VLAN, taken from the top of the range and never one a VLAN port in
    /// the topology already uses.
    fn reserve_local_tag(&mut self, detail: &PortDetail) {
        let (Some(NetworkType::Vxlan), Some(vni)) = (detail.network_type, detail.segment_id) else {
            return;
        };
        if self.local_tags.contains_key(&vni) {
            return;
        }

        let in_use: HashSet<u32> = self
            .local_tags
            .values()
            .map(|tag| u32::from(tag.vid()))
            .chain(
                self.port_details
                    .values()
                    .filter(|d| d.network_type == Some(NetworkType::Vlan))
                    .filter_map(|d| d.segment_id),
            )
            .collect();
        let free = (SegmentId::MIN..=SegmentId::MAX)
            .rev()
            .filter(|tag| !in_use.contains(tag))
            .find_map(|tag| SegmentId::new(tag).ok());
        match free {
            Some(tag) => {
                debug_log!("Topology", vni, tag = %tag, "local VLAN reserved for VXLAN segment");
                self.local_tags.insert(vni, tag);
            }
            None => warn_log!("Topology", vni, "no local VLAN left for VXLAN segment"),
        }
    }

    fn attach_classifier_ports(&mut self, chain_id: &str, details: Vec<PortDetail>) {
        let Some(mut head) = self.chains.get(chain_id).and_then(ChainState::head).cloned() else {
            return;
        };
        for detail in details {
            debug_log!("Topology", chain = chain_id, port_detail = %detail.id, "associating classifier port");
            self.associate(&mut head, detail, 1);
        }
        if let Some(slot) = self.chains.get_mut(chain_id).and_then(ChainState::head_mut) {
            *slot = head;
        }
    }

    fn detach_unused_classifier_ports(&mut self, chain_id: &str) {
        let Some(state) = self.chains.get_mut(chain_id) else {
            return;
        };
        let classifiers = &state.classifiers;
        let Some(head) = state.nodes.iter_mut().find(|n| n.role == NodeRole::Source) else {
            return;
        };

        let port_details = &self.port_details;
        let mut detached = Vec::new();
        head.port_details.retain(|id| {
            let used = port_details.get(id).is_some_and(|d| {
                classifiers.iter().any(|fc| {
                    (d.egress.is_some() && d.egress == fc.logical_source_port)
                        || (d.ingress.is_some() && d.ingress == fc.logical_destination_port)
                })
            });
            if !used {
                detached.push(id.clone());
            }
            used
        });

        let head_id = head.id.clone();
        self.assocs
            .retain(|a| !(a.node_id == head_id && detached.contains(&a.port_detail_id)));
        self.prune_port_details();
    }

    /// Drops the nodes of a chain with their associations and every port
    /// detail left without one.
    fn remove_chain_state(&mut self, chain_id: &str) -> Option<ChainState> {
        let state = self.chains.remove(chain_id)?;
        let removed: HashSet<&str> = state.nodes.iter().map(|n| n.id.as_str()).collect();
        self.assocs.retain(|a| !removed.contains(a.node_id.as_str()));
        self.prune_port_details();
        Some(state)
    }

    fn prune_port_details(&mut self) {
        let referenced: HashSet<&str> = self.assocs.iter().map(|a| a.port_detail_id.as_str()).collect();
        self.port_details.retain(|id, _| referenced.contains(id.as_str()));

        let vnis: HashSet<u32> = self
            .port_details
            .values()
            .filter(|d| d.network_type == Some(NetworkType::Vxlan))
            .filter_map(|d| d.segment_id)
            .collect();
        self.local_tags.retain(|vni, _| vnis.contains(vni));
    }

    fn head_is_bidirectional(&self, head: &PathNode) -> bool {
        is_bidirectional(head.port_details.iter().filter_map(|id| self.port_details.get(id)))
    }

    /// The head decides for the whole chain.
    fn refresh_reverse_path(&mut self, chain_id: &str) {
        let reverse_path = self
            .chains
            .get(chain_id)
            .and_then(ChainState::head)
            .is_some_and(|head| self.head_is_bidirectional(head));
        if let Some(state) = self.chains.get_mut(chain_id) {
            for node in &mut state.nodes {
                node.reverse_path = reverse_path;
            }
        }
    }

    fn group_references(&self) -> HashMap<u32, u32> {
        let mut references = HashMap::new();
        for gid in self.chains.values().flat_map(|c| &c.nodes).filter_map(PathNode::group_id) {
            *references.entry(gid).or_insert(0) += 1;
        }
        references
    }

    fn node_rules(
        &self,
        node: &PathNode,
        add_fcs: &[FlowClassifier],
        del_fcs: &[FlowClassifier],
        group_refcnt: Option<u32>,
    ) -> Result<Vec<FlowRule>> {
        let mut rules = Vec::new();
        for detail in node.port_details.iter().filter_map(|id| self.port_details.get(id)) {
            rules.extend(self.detail_rule(node, detail, add_fcs, del_fcs, group_refcnt)?);
        }
        Ok(rules)
    }

    /// Rules removing `del_fcs` from a node of `chain_id`, each carrying the
    /// install rules of other chains bound to the same port detail.
    fn removal_rules(
        &self,
        chain_id: &str,
        node: &PathNode,
        del_fcs: &[FlowClassifier],
        group_refcnt: Option<u32>,
    ) -> Result<Vec<FlowRule>> {
        let mut rules = Vec::new();
        for detail in node.port_details.iter().filter_map(|id| self.port_details.get(id)) {
            if let Some(mut rule) = self.detail_rule(node, detail, &[], del_fcs, group_refcnt)? {
                rule.shared_with = self.sharing_rules(chain_id, detail)?;
                rules.push(rule);
            }
        }
        Ok(rules)
    }

    fn sharing_rules(&self, chain_id: &str, detail: &PortDetail) -> Result<Vec<FlowRule>> {
        let mut rules = Vec::new();
        for (_, state) in self.chains.iter().filter(|(id, _)| id.as_str() != chain_id) {
            for node in state.nodes.iter().filter(|n| n.port_details.contains(&detail.id)) {
                rules.extend(self.detail_rule(node, detail, &state.classifiers, &[], None)?);
            }
        }
        Ok(rules)
    }

    /// The rule programming one bound port of one node, `None` for a port
    /// without a host.
    fn detail_rule(
        &self,
        node: &PathNode,
        detail: &PortDetail,
        add_fcs: &[FlowClassifier],
        del_fcs: &[FlowClassifier],
        group_refcnt: Option<u32>,
    ) -> Result<Option<FlowRule>> {
        let Some(host_id) = detail.host_id.clone() else {
            debug_log!("Topology", node = %node.id, port_detail = %detail.id, "skipping unbound port");
            return Ok(None);
        };

        let mut rule = FlowRule::new(
            format!("{}:{}", node.id, detail.id),
            node.role,
            node.nsp,
            node.nsi,
            self.chain_segment(detail)?,
        );
        rule.ingress = detail.ingress.clone();
        rule.egress = detail.egress.clone();
        rule.host_id = Some(host_id);
        rule.next_hop_group = node.next_group.clone();
        rule.group_refcnt = group_refcnt;
        rule.reverse_path = node.reverse_path;
        rule.add_fcs = self.classifiers_for(&rule, add_fcs);
        rule.del_fcs = self.classifiers_for(&rule, del_fcs);
        Ok(Some(rule))
    }

    /// VLAN tagging the chain's traffic at this port: the segment itself on
    /// a VLAN network, the reserved local VLAN on a VXLAN one.
    fn chain_segment(&self, detail: &PortDetail) -> Result<SegmentId> {
        let segment = match (detail.network_type, detail.segment_id) {
            (Some(NetworkType::Vxlan), Some(vni)) => self.local_tags.get(&vni).copied(),
            (_, segment) => segment.and_then(|id| SegmentId::new(id).ok()),
        };
        segment.ok_or_else(|| TopologyError::InvalidSegment(detail.id.clone()))
    }

    /// Head rules only carry the classifiers entering or leaving through
    /// their own port; service function rules carry all of them.
    fn classifiers_for(&self, rule: &FlowRule, classifiers: &[FlowClassifier]) -> Vec<FlowClassifier> {
        classifiers
            .iter()
            .filter(|fc| match rule.node_role {
                NodeRole::Source => {
                    (rule.egress.is_some() && rule.egress == fc.logical_source_port)
                        || (rule.ingress.is_some() && rule.ingress == fc.logical_destination_port)
                }
                NodeRole::ServiceFunction => true,
                NodeRole::Destination => false,
            })
            .map(|fc| self.enrich(fc))
            .collect()
    }

    /// Fills the MAC of each logical port and, when the classifier leaves
    /// the prefix open, the port's own address.
    fn enrich(&self, fc: &FlowClassifier) -> FlowClassifier {
        let mut fc = fc.clone();
        if let Some(binding) = fc.logical_source_port.as_deref().and_then(|p| self.resolver.binding(p)) {
            fc.lsp_mac_address = Some(binding.mac_address);
            if fc.source_ip_prefix.is_none() {
                fc.source_ip_prefix = binding.fixed_ip.map(|ip| Ipv4Prefix::host(ip).into());
            }
        }
        if let Some(binding) = fc.logical_destination_port.as_deref().and_then(|p| self.resolver.binding(p)) {
            fc.ldp_mac_address = Some(binding.mac_address);
            if fc.destination_ip_prefix.is_none() {
                fc.destination_ip_prefix = binding.fixed_ip.map(|ip| Ipv4Prefix::host(ip).into());
            }
        }
        fc
    }
}

/// Whether a head bound to the ports of `classifiers` has both an egress
/// and an ingress port.
fn spans_both_ends(classifiers: &[FlowClassifier]) -> bool {
    classifiers.iter().any(|fc| fc.logical_source_port.is_some())
        && classifiers.iter().any(|fc| fc.logical_destination_port.is_some())
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Every egress port of a hop must share a subnet with every ingress port
/// of the hop after it.
fn check_subnets(hops: &[Hop]) -> Result<()> {
    for pair in hops.windows(2) {
        for from in &pair[0].pairs {
            for to in &pair[1].pairs {
                if let (Some(egress_subnet), Some(ingress_subnet)) = (from.egress.subnet, to.ingress.subnet) {
                    if egress_subnet != ingress_subnet {
                        return Err(TopologyError::CrossSubnet {
                            egress_port: from.pair.egress.clone(),
                            egress_subnet,
                            ingress_port: to.pair.ingress.clone(),
                            ingress_subnet,
                        });
                    }
                }
            }
        }
    }
    Ok(())
}
