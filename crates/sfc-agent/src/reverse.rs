//! Reverse-path transform for bidirectional chains.
//!
//! The return direction of a chain reuses the forward path nodes with every
//! classifier turned around. At the head, the node's own ingress and egress
//! ports also trade places.

use crate::flow::{FlowRule, NodeRole};
use crate::topology::{PortDetail, PortRole};

impl FlowRule {
    /// Returns the rule describing the opposite traffic direction.
    pub fn reversed(&self) -> FlowRule {
        let mut rev = self.clone();
        for fc in rev.add_fcs.iter_mut().chain(rev.del_fcs.iter_mut()) {
            fc.swap_direction();
        }
        if rev.node_role == NodeRole::Source {
            std::mem::swap(&mut rev.ingress, &mut rev.egress);
        }
        rev
    }
}

/// A chain is bidirectional when its head node is bound to at least one
/// egress-role and at least one ingress-role port.
pub fn is_bidirectional<'a>(head_ports: impl IntoIterator<Item = &'a PortDetail>) -> bool {
    let (mut egress, mut ingress) = (false, false);
    for port in head_ports {
        match port.role() {
            PortRole::Egress => egress = true,
            PortRole::Ingress => ingress = true,
            PortRole::Pair | PortRole::Unbound => {}
        }
    }
    egress && ingress
}
