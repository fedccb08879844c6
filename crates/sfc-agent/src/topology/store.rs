//! Read-only collaborators of the topology assembler.

use super::types::{PortBinding, PortChain, PortPair, PortPairGroup};
use crate::classifier::FlowClassifier;
use std::collections::HashMap;

/// Chain, port pair group, port pair and classifier records.
pub trait ChainStore: Send + Sync {
    fn port_chain(&self, id: &str) -> Option<PortChain>;
    fn port_pair_group(&self, id: &str) -> Option<PortPairGroup>;
    fn port_pair(&self, id: &str) -> Option<PortPair>;
    fn flow_classifier(&self, id: &str) -> Option<FlowClassifier>;
}

pub trait PortBindingResolver: Send + Sync {
    fn binding(&self, port_id: &str) -> Option<PortBinding>;
}

/// Map-backed store implementing both collaborators.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    chains: HashMap<String, PortChain>,
    groups: HashMap<String, PortPairGroup>,
    pairs: HashMap<String, PortPair>,
    classifiers: HashMap<String, FlowClassifier>,
    bindings: HashMap<String, PortBinding>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_chain(&mut self, chain: PortChain) {
        self.chains.insert(chain.id.clone(), chain);
    }

    pub fn insert_port_pair_group(&mut self, group: PortPairGroup) {
        self.groups.insert(group.id.clone(), group);
    }

    pub fn insert_port_pair(&mut self, pair: PortPair) {
        self.pairs.insert(pair.id.clone(), pair);
    }

    pub fn insert_flow_classifier(&mut self, fc: FlowClassifier) {
        self.classifiers.insert(fc.id.clone(), fc);
    }

    pub fn insert_binding(&mut self, binding: PortBinding) {
        self.bindings.insert(binding.port_id.clone(), binding);
    }

    pub fn remove_chain(&mut self, id: &str) -> Option<PortChain> {
        self.chains.remove(id)
    }
}

impl ChainStore for InMemoryStore {
    fn port_chain(&self, id: &str) -> Option<PortChain> {
        self.chains.get(id).cloned()
    }

    fn port_pair_group(&self, id: &str) -> Option<PortPairGroup> {
        self.groups.get(id).cloned()
    }

    fn port_pair(&self, id: &str) -> Option<PortPair> {
        self.pairs.get(id).cloned()
    }

    fn flow_classifier(&self, id: &str) -> Option<FlowClassifier> {
        self.classifiers.get(id).cloned()
    }
}

impl PortBindingResolver for InMemoryStore {
    fn binding(&self, port_id: &str) -> Option<PortBinding> {
        self.bindings.get(port_id).cloned()
    }
}
