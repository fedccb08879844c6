//! Integration tests for chain assembly and flow programming
//!
//! These tests drive the topology assembler, the agent and the in-memory
//! bridge together, the way a controller and one compute-node agent would.

use sfc_agent::classifier::port_masks;
use sfc_agent::topology::{InMemoryStore, NetworkType, NodeStatus, PortBinding, PortChain, PortPair, PortPairGroup, Topology};
use sfc_agent::{
    AgentConfig, ClassifierPolicy, FlowClassifier, FlowRule, FlowRuleStatus, IpProtocol, MacAddress,
    MemoryBridge, NodeRole, RuleStatus, SfcAgent, Table,
};
use std::net::Ipv4Addr;
use std::sync::Arc;

const LOCAL_HOST: &str = "compute-1";
const TRANSPORT_OFPORT: u32 = 2;
const SEGMENT: u32 = 100;

/// Logical ports of the test network: (port id, ofport, last MAC/IP octet).
const PORTS: &[(&str, u32, u8)] = &[
    ("vm-src", 11, 1),
    ("vm-dst", 12, 2),
    ("vm-other", 13, 3),
    ("sf1-in", 21, 21),
    ("sf1-out", 22, 22),
    ("sf2-in", 31, 31),
    ("sf2-out", 32, 32),
    ("sf3-in", 41, 41),
    ("sf3-out", 42, 42),
];

fn mac(last: u8) -> MacAddress {
    MacAddress::new([0xfa, 0x16, 0x3e, 0, 0, last])
}

fn mac_of(port: &str) -> MacAddress {
    PORTS
        .iter()
        .find(|(id, _, _)| *id == port)
        .map(|&(_, _, last)| mac(last))
        .unwrap()
}

/// Controller-side store: bindings, port pairs, groups and classifiers.
fn network() -> InMemoryStore {
    let mut store = InMemoryStore::new();
    for &(port, _, last) in PORTS {
        store.insert_binding(
            PortBinding::vlan(port, LOCAL_HOST, SEGMENT, mac(last))
                .with_address(Ipv4Addr::new(10, 0, 0, last), "10.0.0.0/24".parse().unwrap()),
        );
    }

    store.insert_port_pair(PortPair::new("pp-1", "sf1-in", "sf1-out"));
    store.insert_port_pair(PortPair::new("pp-2", "sf2-in", "sf2-out").with_weight(3));
    store.insert_port_pair(PortPair::new("pp-3", "sf3-in", "sf3-out").with_weight(1));
    store.insert_port_pair_group(PortPairGroup {
        id: "ppg-single".to_string(),
        group_id: 1,
        port_pairs: vec!["pp-1".to_string()],
    });
    store.insert_port_pair_group(PortPairGroup {
        id: "ppg-lb".to_string(),
        group_id: 2,
        port_pairs: vec!["pp-2".to_string(), "pp-3".to_string()],
    });

    store.insert_flow_classifier(FlowClassifier {
        protocol: Some(IpProtocol::Tcp),
        destination_port_range_min: Some(80),
        destination_port_range_max: Some(83),
        destination_ip_prefix: Some("10.0.0.2/32".parse().unwrap()),
        logical_source_port: Some("vm-src".to_string()),
        ..FlowClassifier::new("fc-web")
    });
    store.insert_flow_classifier(FlowClassifier {
        protocol: Some(IpProtocol::Tcp),
        destination_port_range_min: Some(80),
        destination_port_range_max: Some(83),
        logical_source_port: Some("vm-src".to_string()),
        logical_destination_port: Some("vm-dst".to_string()),
        ..FlowClassifier::new("fc-bi")
    });
    store.insert_flow_classifier(FlowClassifier {
        protocol: Some(IpProtocol::Udp),
        destination_ip_prefix: Some("10.0.0.2/32".parse().unwrap()),
        logical_source_port: Some("vm-other".to_string()),
        ..FlowClassifier::new("fc-other")
    });
    store.insert_flow_classifier(FlowClassifier {
        protocol: Some(IpProtocol::Udp),
        logical_destination_port: Some("vm-other".to_string()),
        ..FlowClassifier::new("fc-return")
    });
    store
}

fn add_chain(store: &mut InMemoryStore, id: &str, nsp: u32, groups: &[&str], fcs: &[&str]) {
    store.insert_chain(PortChain {
        id: id.to_string(),
        chain_id: nsp,
        port_pair_groups: groups.iter().map(|g| g.to_string()).collect(),
        flow_classifiers: fcs.iter().map(|f| f.to_string()).collect(),
    });
}

fn topology(store: InMemoryStore) -> Topology {
    let store = Arc::new(store);
    Topology::new(store.clone(), store, ClassifierPolicy::AtLeastOne)
}

/// Agent on `compute-1` with every test port attached to its bridge.
fn agent() -> SfcAgent<MemoryBridge> {
    let config = AgentConfig::from_yaml_str(&format!(
        "local_host: {LOCAL_HOST}\ntransport_ofport: {TRANSPORT_OFPORT}\n"
    ))
    .unwrap();
    let mut bridge = MemoryBridge::new();
    for &(port, ofport, last) in PORTS {
        bridge.add_port(port, ofport, mac(last));
    }
    let mut agent = SfcAgent::new(&config, bridge);
    agent.initialize().unwrap();
    agent
}

fn all_active(statuses: &[FlowRuleStatus]) -> bool {
    statuses.iter().all(|s| s.status == RuleStatus::Active)
}

#[cfg(test)]
mod single_path_tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sfc_agent::PortMask;

    #[test]
    fn test_three_hop_chain_without_fan_out() {
        let mut store = network();
        add_chain(&mut store, "pc-web", 1, &["ppg-single"], &["fc-web"]);
        let mut topo = topology(store);
        let mut agent = agent();

        let rules = topo.create_chain("pc-web").unwrap();
        let roles: Vec<NodeRole> = topo.path_nodes("pc-web").unwrap().iter().map(|n| n.role).collect();
        assert_eq!(roles, vec![NodeRole::Source, NodeRole::ServiceFunction, NodeRole::Destination]);
        assert!(rules.iter().all(|r| r.next_hop_group.is_none()));

        let statuses = agent.update_flow_rules(&rules);
        assert!(all_active(&statuses));
        let bridge = agent.dataplane();

        // 80-83 is one aligned block
        assert_eq!(port_masks(Some(80), Some(83)).unwrap(), vec![PortMask::new(80, 0xfffc)]);

        let classification: Vec<_> = bridge
            .flows_in(Table::LocalSwitching)
            .into_iter()
            .filter(|f| f.matches.tp_dst.is_some())
            .collect();
        assert_eq!(classification.len(), 1);
        assert_eq!(classification[0].priority, 30);
        assert_eq!(classification[0].matches.in_port, Some(11));
        assert_eq!(classification[0].matches.tp_dst, Some(PortMask::new(80, 0xfffc)));
        assert_eq!(
            classification[0].to_string(),
            "table=0,priority=30,in_port=11,dl_type=0x0800,nw_proto=6,nw_src=10.0.0.1/32,nw_dst=10.0.0.2/32,tp_dst=80/0xfffc,actions=mod_vlan_vid:100,resubmit(,5)"
        );

        // one steering entry per programmed hop: the head and SF1
        let steering: Vec<_> = bridge.flows_in(Table::CrossSubnet);
        assert_eq!(steering.len(), 2);
        assert!(steering.iter().any(|f| f.matches.dl_dst == Some(mac_of("vm-src"))));
        assert!(steering.iter().any(|f| f.matches.dl_dst == Some(mac_of("sf1-in"))));

        // SF1 delivery at its ingress port
        let delivery = bridge
            .flows_in(Table::ChainIngress)
            .into_iter()
            .find(|f| f.matches.dl_dst == Some(mac_of("sf1-in")))
            .unwrap();
        assert_eq!(
            delivery.to_string(),
            "table=10,priority=60,dl_type=0x0800,dl_vlan=100,dl_dst=fa:16:3e:00:00:15,nw_dst=10.0.0.2/32,actions=strip_vlan,output:21"
        );

        assert_eq!(bridge.group_count(), 0);
    }

    #[test]
    fn test_add_then_delete_restores_bridge() {
        let mut store = network();
        add_chain(&mut store, "pc-bi", 4, &["ppg-single"], &["fc-bi"]);
        let mut topo = topology(store);
        let mut agent = agent();
        let before = agent.dataplane().snapshot();

        let rules = topo.create_chain("pc-bi").unwrap();
        assert!(rules.iter().all(|r| r.reverse_path));
        assert!(all_active(&agent.update_flow_rules(&rules)));
        assert!(agent.dataplane().flow_count() > before.flows.len());

        let rules = topo.delete_chain("pc-bi").unwrap();
        assert!(all_active(&agent.delete_flow_rules(&rules)));
        assert_eq!(agent.dataplane().snapshot(), before);
        assert_eq!(topo.chain_count(), 0);
        assert_eq!(topo.port_detail_count(), 0);
    }
}

#[cfg(test)]
mod group_tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sfc_agent::FlowAction;

    #[test]
    fn test_weighted_group_lifecycle() {
        let mut store = network();
        add_chain(&mut store, "pc-lb", 2, &["ppg-lb"], &["fc-web"]);
        let mut topo = topology(store);
        let mut agent = agent();
        let before = agent.dataplane().snapshot();

        let rules = topo.create_chain("pc-lb").unwrap();
        assert!(all_active(&agent.update_flow_rules(&rules)));

        let group = agent.dataplane().group(2).unwrap();
        let buckets: Vec<(u32, Vec<FlowAction>)> =
            group.buckets.iter().map(|b| (b.weight, b.actions.clone())).collect();
        assert_eq!(
            buckets,
            vec![
                (3, vec![FlowAction::ModDlDst(mac_of("sf2-in")), FlowAction::Resubmit(Table::CrossSubnet)]),
                (1, vec![FlowAction::ModDlDst(mac_of("sf3-in")), FlowAction::Resubmit(Table::CrossSubnet)]),
            ]
        );

        // members share this host, so they are re-tagged into chain ingress
        let member = agent
            .dataplane()
            .flows_in(Table::CrossSubnet)
            .into_iter()
            .find(|f| f.priority == 30 && f.matches.dl_dst == Some(mac_of("sf3-in")))
            .unwrap();
        assert_eq!(member.actions, vec![FlowAction::ModVlanVid(100), FlowAction::Resubmit(Table::ChainIngress)]);

        let rules = topo.delete_chain("pc-lb").unwrap();
        let head: Vec<&FlowRule> = rules.iter().filter(|r| r.node_role == NodeRole::Source).collect();
        assert_eq!(head[0].group_refcnt, Some(1));

        assert!(all_active(&agent.delete_flow_rules(&rules)));
        assert_eq!(agent.dataplane().group_count(), 0);
        assert_eq!(agent.dataplane().snapshot(), before);
        assert_eq!(agent.stats().groups_created, 1);
        assert_eq!(agent.stats().groups_deleted, 1);
    }

    #[test]
    fn test_shared_group_survives_first_delete() {
        let mut store = network();
        add_chain(&mut store, "pc-a", 2, &["ppg-lb"], &["fc-web"]);
        add_chain(&mut store, "pc-b", 3, &["ppg-lb"], &["fc-other"]);
        let mut topo = topology(store);
        let mut agent = agent();

        let rules = topo.create_chain("pc-a").unwrap();
        assert!(all_active(&agent.update_flow_rules(&rules)));
        let rules = topo.create_chain("pc-b").unwrap();
        assert!(all_active(&agent.update_flow_rules(&rules)));
        // second chain replaced the buckets rather than creating a group
        assert_eq!(agent.stats().groups_created, 1);
        assert_eq!(agent.stats().groups_modified, 1);

        let rules = topo.delete_chain("pc-a").unwrap();
        assert!(rules.iter().filter(|r| r.next_hop_group.is_some()).all(|r| r.group_refcnt == Some(2)));
        assert!(all_active(&agent.delete_flow_rules(&rules)));
        assert_eq!(agent.dataplane().group_count(), 1);
        let classifying_b = agent
            .dataplane()
            .flows_in(Table::LocalSwitching)
            .into_iter()
            .filter(|f| f.matches.in_port == Some(13))
            .count();
        assert_eq!(classifying_b, 2);

        let rules = topo.delete_chain("pc-b").unwrap();
        assert!(all_active(&agent.delete_flow_rules(&rules)));
        assert_eq!(agent.dataplane().group_count(), 0);
        assert!(agent.dataplane().flows_in(Table::CrossSubnet).is_empty());
    }
}

#[cfg(test)]
mod shared_pair_tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sfc_agent::FlowAction;

    /// Bridge state after installing only `chain` from a fresh store.
    fn installed_alone(chain: &str, nsp: u32, fcs: &[&str]) -> sfc_agent::dataplane::BridgeSnapshot {
        let mut store = network();
        add_chain(&mut store, chain, nsp, &["ppg-single"], fcs);
        let mut topo = topology(store);
        let mut agent = agent();
        assert!(all_active(&agent.update_flow_rules(&topo.create_chain(chain).unwrap())));
        agent.dataplane().snapshot()
    }

    #[test]
    fn test_deleting_one_chain_keeps_the_other() {
        let mut store = network();
        add_chain(&mut store, "pc-a", 1, &["ppg-single"], &["fc-web"]);
        add_chain(&mut store, "pc-b", 2, &["ppg-single"], &["fc-other"]);
        let mut topo = topology(store);
        let mut agent = agent();
        let before = agent.dataplane().snapshot();

        assert!(all_active(&agent.update_flow_rules(&topo.create_chain("pc-a").unwrap())));
        assert!(all_active(&agent.update_flow_rules(&topo.create_chain("pc-b").unwrap())));

        let rules = topo.delete_chain("pc-a").unwrap();
        assert!(rules
            .iter()
            .filter(|r| r.node_role == NodeRole::ServiceFunction)
            .all(|r| r.shared_with.len() == 1));
        assert!(all_active(&agent.delete_flow_rules(&rules)));
        assert_eq!(agent.dataplane().snapshot(), installed_alone("pc-b", 2, &["fc-other"]));

        // SF1 still receives and returns pc-b traffic
        let bridge = agent.dataplane();
        assert!(bridge
            .flows_in(Table::ChainIngress)
            .iter()
            .any(|f| f.matches.dl_dst == Some(mac_of("sf1-in")) && f.actions.contains(&FlowAction::Output(21))));
        assert!(bridge
            .flows_in(Table::LocalSwitching)
            .iter()
            .any(|f| f.matches.in_port == Some(22)));

        let rules = topo.delete_chain("pc-b").unwrap();
        assert!(rules.iter().all(|r| r.shared_with.is_empty()));
        assert!(all_active(&agent.delete_flow_rules(&rules)));
        assert_eq!(agent.dataplane().snapshot(), before);
    }

    #[test]
    fn test_vxlan_chain_runs_on_local_tag() {
        let mut store = network();
        for &(port, _, last) in PORTS {
            let mut binding = PortBinding::vlan(port, LOCAL_HOST, 5000, mac(last))
                .with_address(Ipv4Addr::new(10, 0, 0, last), "10.0.0.0/24".parse().unwrap());
            binding.network_type = NetworkType::Vxlan;
            store.insert_binding(binding);
        }
        add_chain(&mut store, "pc-web", 1, &["ppg-single"], &["fc-web"]);
        let mut topo = topology(store);
        let mut agent = agent();
        let before = agent.dataplane().snapshot();

        let rules = topo.create_chain("pc-web").unwrap();
        assert!(rules.iter().all(|r| r.segment_id.vid() == 4094));
        assert!(all_active(&agent.update_flow_rules(&rules)));
        assert!(agent
            .dataplane()
            .flows_in(Table::ChainIngress)
            .iter()
            .any(|f| f.matches.dl_vlan == Some(4094)));

        assert!(all_active(&agent.delete_flow_rules(&topo.delete_chain("pc-web").unwrap())));
        assert_eq!(agent.dataplane().snapshot(), before);
        assert!(topo.local_tag(5000).is_none());
    }
}

#[cfg(test)]
mod classifier_update_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Applies an update the way a controller does: withdraw, then install.
    fn apply_update(topo: &mut Topology, agent: &mut SfcAgent<MemoryBridge>, chain: &str, added: &[&str], removed: &[&str]) {
        let added: Vec<String> = added.iter().map(|s| s.to_string()).collect();
        let removed: Vec<String> = removed.iter().map(|s| s.to_string()).collect();
        let update = topo.update_classifiers(chain, &added, &removed).unwrap();
        assert!(all_active(&agent.delete_flow_rules(&update.delete)));
        assert!(all_active(&agent.update_flow_rules(&update.apply)));
    }

    #[test]
    fn test_two_way_chain_becomes_one_way() {
        let mut store = network();
        add_chain(&mut store, "pc", 4, &["ppg-single"], &["fc-bi"]);
        let mut topo = topology(store);
        let mut fresh = agent();
        let mut agent = agent();
        assert!(all_active(&agent.update_flow_rules(&topo.create_chain("pc").unwrap())));

        apply_update(&mut topo, &mut agent, "pc", &["fc-web"], &["fc-bi"]);
        assert!(topo.path_nodes("pc").unwrap().iter().all(|n| !n.reverse_path));

        let mut fresh_store = network();
        add_chain(&mut fresh_store, "pc", 4, &["ppg-single"], &["fc-web"]);
        let mut fresh_topo = topology(fresh_store);
        assert!(all_active(&fresh.update_flow_rules(&fresh_topo.create_chain("pc").unwrap())));

        assert_eq!(agent.dataplane().snapshot(), fresh.dataplane().snapshot());
    }

    #[test]
    fn test_added_then_removed_classifier_leaves_nothing() {
        let mut store = network();
        add_chain(&mut store, "pc", 1, &["ppg-single"], &["fc-web"]);
        let mut topo = topology(store);
        let mut agent = agent();
        let before = agent.dataplane().snapshot();
        assert!(all_active(&agent.update_flow_rules(&topo.create_chain("pc").unwrap())));
        let one_way = agent.dataplane().snapshot();

        // fc-return adds an ingress port at the head, so the chain turns two-way
        apply_update(&mut topo, &mut agent, "pc", &["fc-return"], &[]);
        assert!(topo.path_nodes("pc").unwrap()[0].reverse_path);

        apply_update(&mut topo, &mut agent, "pc", &[], &["fc-return"]);
        assert!(!topo.path_nodes("pc").unwrap()[0].reverse_path);
        assert_eq!(agent.dataplane().snapshot(), one_way);

        assert!(all_active(&agent.delete_flow_rules(&topo.delete_chain("pc").unwrap())));
        assert_eq!(agent.dataplane().snapshot(), before);
    }
}

#[cfg(test)]
mod failure_tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sfc_agent::TopologyError;

    #[test]
    fn test_cross_subnet_chain_rejected() {
        let mut store = network();
        store.insert_binding(
            PortBinding::vlan("sf2-in", LOCAL_HOST, SEGMENT, mac(31))
                .with_address(Ipv4Addr::new(192, 168, 0, 31), "192.168.0.0/24".parse().unwrap()),
        );
        add_chain(&mut store, "pc-x", 5, &["ppg-single", "ppg-lb"], &["fc-web"]);
        let mut topo = topology(store);

        let err = topo.create_chain("pc-x").unwrap_err();
        assert!(matches!(err, TopologyError::CrossSubnet { .. }));
        assert!(topo.path_nodes("pc-x").is_none());
        assert_eq!(topo.port_detail_count(), 0);
    }

    #[test]
    fn test_failing_hop_does_not_block_batch() {
        let mut store = network();
        add_chain(&mut store, "pc-web", 1, &["ppg-single"], &["fc-web"]);
        let mut topo = topology(store);
        let mut agent = agent();
        agent.dataplane_mut().remove_port("sf1-in");

        let rules = topo.create_chain("pc-web").unwrap();
        let statuses = agent.update_flow_rules(&rules);
        assert_eq!(statuses.len(), rules.len());

        let failed: Vec<&FlowRule> = rules
            .iter()
            .zip(&statuses)
            .filter(|(_, s)| s.status == RuleStatus::Error)
            .map(|(r, _)| r)
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].node_role, NodeRole::ServiceFunction);

        // the head was still programmed
        assert!(agent
            .dataplane()
            .flows_in(Table::LocalSwitching)
            .iter()
            .any(|f| f.matches.in_port == Some(11)));

        topo.record_statuses(&statuses);
        let nodes = topo.path_nodes("pc-web").unwrap();
        assert_eq!(nodes[0].status, NodeStatus::Active);
        assert_eq!(nodes[1].status, NodeStatus::Error);
        assert_eq!(agent.stats().rules_failed, 1);
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_agent_from_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bridge: br-sfc").unwrap();
        writeln!(file, "local_host: compute-9").unwrap();
        writeln!(file, "transport_ofport: 7").unwrap();
        writeln!(file, "classifier_policy: exactly_one").unwrap();

        let config = AgentConfig::from_file(file.path()).unwrap();
        assert_eq!(config.classifier_policy, ClassifierPolicy::ExactlyOne);

        let mut agent = SfcAgent::new(&config, MemoryBridge::new());
        agent.initialize().unwrap();
        assert_eq!(agent.context().bridge, "br-sfc");
        assert_eq!(agent.context().transport_ofport, 7);
        assert_eq!(agent.dataplane().flow_count(), 2);
    }

    #[test]
    fn test_exactly_one_policy_rejects_two_sided_classifier() {
        let mut store = network();
        add_chain(&mut store, "pc-bi", 4, &["ppg-single"], &["fc-bi"]);
        let store = Arc::new(store);
        let mut topo = Topology::new(store.clone(), store, ClassifierPolicy::ExactlyOne);

        assert!(topo.create_chain("pc-bi").is_err());
        assert_eq!(topo.stats().chains_rejected, 1);
    }
}
