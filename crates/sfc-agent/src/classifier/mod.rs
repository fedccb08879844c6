//! Flow classifiers and their compilation into OpenFlow match fields.
//!
//! A classifier selects the traffic that enters a chain. Compilation turns
//! its port ranges into aligned (value, mask) blocks and emits one
//! [`MatchFieldSet`] per source/destination block pair.

mod compiler;
mod range;
mod types;

pub use compiler::{compile, ipv4_or_any, MatchFieldSet};
pub use range::{port_masks, PortRange};
pub use types::{ClassifierError, ClassifierPolicy, FlowClassifier};
