//! Next-hop groups: weighted select groups fanning a chain hop out to
//! several service-function instances.

mod manager;
mod types;

pub use manager::{build_buckets, ensure_group, ensure_ops, group_spec, teardown_ops, GroupApply};
pub use types::{NextHop, NextHopGroup};
