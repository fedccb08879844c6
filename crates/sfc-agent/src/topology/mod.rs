//! Chain topology: path nodes, port details and their associations.

mod assembler;
mod store;
mod types;

pub use assembler::{ClassifierUpdate, Topology, TopologyStats};
pub use store::{ChainStore, InMemoryStore, PortBindingResolver};
pub use types::{
    NetworkType, NodeStatus, PathNode, PathPortAssoc, PortBinding, PortChain, PortDetail, PortPair,
    PortPairGroup, PortRole, TopologyError, HEAD_NSI, MAX_CHAIN_LENGTH,
};
