//! SFC agent - service function chain flow compilation
//!
//! Turns port chains (ordered port pair groups plus flow classifiers) into
//! the OpenFlow entries and select groups that steer traffic through them
//! on an integration bridge.
//!
//! # Architecture
//!
//! ```text
//! [ChainStore] ──> [Topology] ──> FlowRule batch ──> [SfcAgent] ──> [Dataplane]
//!                      │                                 │
//!                 path nodes,                      FlowCompiler ──> DataplaneOp list
//!                 port details                           │
//!                                            classifier / group / reverse
//! ```
//!
//! # Key Components
//!
//! - [`classifier`]: classifier validation and port-range mask compilation
//! - [`group`]: weighted select groups and their cross-subnet entries
//! - [`flow`]: per-node flow rules and the compiler emitting [`DataplaneOp`]s
//! - [`reverse`]: mirrored flow rules for bidirectional chains
//! - [`topology`]: chain assembly, hop numbering and group reference counts
//! - [`agent::SfcAgent`]: applies flow rules to a [`Dataplane`] and reports
//!   per-rule status
//!
//! # Pipeline
//!
//! | Table | Role |
//! |-------|------|
//! | 0     | local switching, ingress classification |
//! | 5     | cross-subnet, multipath and encapsulation |
//! | 10    | chain ingress, delivery to a hop |

// ============================================================================
// Ambient Modules
// ============================================================================

pub mod audit;
pub mod config;

// ============================================================================
// Compiler Modules
// ============================================================================

pub mod agent;
pub mod classifier;
pub mod dataplane;
pub mod flow;
pub mod group;
pub mod reverse;
pub mod topology;

// ============================================================================
// Re-exports
// ============================================================================

pub use sfc_types::{EtherType, IpPrefix, IpProtocol, Ipv4Prefix, MacAddress, PortMask, SegmentId};

pub use agent::{AgentStats, SfcAgent};
pub use audit::{AuditCategory, AuditOutcome, AuditRecord};
pub use classifier::{ClassifierError, ClassifierPolicy, FlowClassifier, MatchFieldSet, PortRange};
pub use config::{AgentConfig, CompilerContext, ConfigError};
pub use dataplane::{
    execute, Dataplane, DataplaneError, DataplaneOp, ExecutionSummary, FlowAction, FlowEntry,
    FlowMatch, GroupSpec, MemoryBridge, PortInfo, PortLookup, Table,
};
pub use flow::{CompileError, FlowCompiler, FlowRule, FlowRuleError, FlowRuleStatus, NodeRole, RuleStatus};
pub use group::{GroupApply, NextHop, NextHopGroup};
pub use reverse::is_bidirectional;
pub use topology::{
    ChainStore, ClassifierUpdate, InMemoryStore, PathNode, PortBinding, PortBindingResolver,
    PortChain, PortDetail, PortPair, PortPairGroup, Topology, TopologyError,
};
