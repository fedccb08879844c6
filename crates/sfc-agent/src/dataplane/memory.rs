//! In-memory bridge with OpenFlow table semantics.

use super::ops::{FlowAction, FlowEntry, FlowMatch, GroupSpec, Table};
use super::{Dataplane, DataplaneError, PortInfo, PortLookup};
use sfc_types::MacAddress;
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct FlowKey {
    table: Table,
    priority: u16,
    matches: FlowMatch,
}

/// Flow and group tables at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeSnapshot {
    pub flows: Vec<FlowEntry>,
    pub groups: Vec<GroupSpec>,
}

/// A [`Dataplane`] that keeps its tables in memory.
///
/// Flows are keyed by (table, priority, match) so re-adding an entry
/// replaces it. Any primitive can be made to fail with [`fail_on`](Self::fail_on).
#[derive(Debug, Default)]
pub struct MemoryBridge {
    ports: HashMap<String, PortInfo>,
    flows: BTreeMap<FlowKey, Vec<FlowAction>>,
    groups: BTreeMap<u32, GroupSpec>,
    failing: HashSet<&'static str>,
}

impl MemoryBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_port(&mut self, port_id: impl Into<String>, ofport: u32, mac: MacAddress) {
        self.ports.insert(port_id.into(), PortInfo { ofport, mac });
    }

    pub fn with_port(mut self, port_id: impl Into<String>, ofport: u32, mac: MacAddress) -> Self {
        self.add_port(port_id, ofport, mac);
        self
    }

    pub fn remove_port(&mut self, port_id: &str) -> Option<PortInfo> {
        self.ports.remove(port_id)
    }

    /// Makes every later call of the named primitive (`"add_flow"`,
    /// `"delete_flows"`, `"add_group"`, ...) fail.
    pub fn fail_on(&mut self, op: &'static str) {
        self.failing.insert(op);
    }

    pub fn clear_failures(&mut self) {
        self.failing.clear();
    }

    fn check(&self, op: &'static str) -> Result<(), DataplaneError> {
        if self.failing.contains(op) {
            return Err(DataplaneError::new(op, "injected failure"));
        }
        Ok(())
    }

    pub fn flow_count(&self) -> usize {
        self.flows.len()
    }

    /// Actions of the entry at exactly (table, priority, match).
    pub fn flow(&self, table: Table, priority: u16, matches: &FlowMatch) -> Option<&[FlowAction]> {
        self.flows
            .get(&FlowKey {
                table,
                priority,
                matches: matches.clone(),
            })
            .map(Vec::as_slice)
    }

    pub fn flows(&self) -> Vec<FlowEntry> {
        self.flows
            .iter()
            .map(|(key, actions)| FlowEntry {
                table: key.table,
                priority: key.priority,
                matches: key.matches.clone(),
                actions: actions.clone(),
            })
            .collect()
    }

    pub fn flows_in(&self, table: Table) -> Vec<FlowEntry> {
        self.flows()
            .into_iter()
            .filter(|entry| entry.table == table)
            .collect()
    }

    pub fn group(&self, group_id: u32) -> Option<&GroupSpec> {
        self.groups.get(&group_id)
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn snapshot(&self) -> BridgeSnapshot {
        BridgeSnapshot {
            flows: self.flows(),
            groups: self.groups.values().cloned().collect(),
        }
    }
}

impl PortLookup for MemoryBridge {
    fn resolve_port(&self, port_id: &str) -> Option<PortInfo> {
        self.ports.get(port_id).copied()
    }
}

impl Dataplane for MemoryBridge {
    fn add_flow(&mut self, flow: &FlowEntry) -> Result<(), DataplaneError> {
        self.check("add_flow")?;
        self.flows.insert(
            FlowKey {
                table: flow.table,
                priority: flow.priority,
                matches: flow.matches.clone(),
            },
            flow.actions.clone(),
        );
        Ok(())
    }

    fn delete_flows(
        &mut self,
        table: Option<Table>,
        priority: Option<u16>,
        matches: &FlowMatch,
    ) -> Result<(), DataplaneError> {
        self.check("delete_flows")?;
        match (table, priority) {
            (Some(table), Some(priority)) => {
                self.flows.remove(&FlowKey {
                    table,
                    priority,
                    matches: matches.clone(),
                });
            }
            _ => self.flows.retain(|key, _| {
                let in_scope = table.map_or(true, |t| key.table == t)
                    && priority.map_or(true, |p| key.priority == p);
                !(in_scope && matches.is_subset_of(&key.matches))
            }),
        }
        Ok(())
    }

    fn add_group(&mut self, group: &GroupSpec) -> Result<(), DataplaneError> {
        self.check("add_group")?;
        if self.groups.contains_key(&group.group_id) {
            return Err(DataplaneError::new(
                "add_group",
                format!("group {} already exists", group.group_id),
            ));
        }
        self.groups.insert(group.group_id, group.clone());
        Ok(())
    }

    fn modify_group(&mut self, group: &GroupSpec) -> Result<(), DataplaneError> {
        self.check("modify_group")?;
        match self.groups.get_mut(&group.group_id) {
            Some(existing) => {
                *existing = group.clone();
                Ok(())
            }
            None => Err(DataplaneError::new(
                "modify_group",
                format!("group {} does not exist", group.group_id),
            )),
        }
    }

    fn delete_group(&mut self, group_id: u32) -> Result<(), DataplaneError> {
        self.check("delete_group")?;
        self.groups.remove(&group_id);
        Ok(())
    }

    fn delete_all_groups(&mut self) -> Result<(), DataplaneError> {
        self.check("delete_all_groups")?;
        self.groups.clear();
        Ok(())
    }

    fn dump_group(&self, group_id: u32) -> Result<Option<GroupSpec>, DataplaneError> {
        self.check("dump_group")?;
        Ok(self.groups.get(&group_id).cloned())
    }
}
