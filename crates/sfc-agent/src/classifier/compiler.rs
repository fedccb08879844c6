//! Classifier to match-field compilation.

use super::range::port_masks;
use super::types::{ClassifierError, FlowClassifier};
use crate::dataplane::FlowMatch;
use crate::warn_log;
use itertools::iproduct;
use sfc_types::{EtherType, IpPrefix, Ipv4Prefix, PortMask};

/// One concrete set of header fields selected by a classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatchFieldSet {
    pub eth_type: u16,
    pub ip_proto: Option<u8>,
    pub nw_src: Ipv4Prefix,
    pub nw_dst: Ipv4Prefix,
    pub tp_src: PortMask,
    pub tp_dst: PortMask,
}

impl MatchFieldSet {
    /// Adds these fields to an existing match.
    pub fn apply_to(&self, matches: FlowMatch) -> FlowMatch {
        matches
            .dl_type(self.eth_type)
            .nw_proto(self.ip_proto)
            .nw_src(self.nw_src)
            .nw_dst(self.nw_dst)
            .tp_src(self.tp_src)
            .tp_dst(self.tp_dst)
    }
}

/// Resolves a classifier prefix for an IPv4 match. Unset is `0.0.0.0/0`;
/// an IPv6 prefix cannot be matched and yields `None`.
pub fn ipv4_or_any(prefix: Option<&IpPrefix>) -> Option<Ipv4Prefix> {
    match prefix {
        None => Some(Ipv4Prefix::ANY),
        Some(prefix) => prefix.as_v4(),
    }
}

/// Compiles a classifier into the cross product of its source and
/// destination port masks.
///
/// IPv6 classifiers are not supported and compile to an empty list, which
/// callers treat as nothing to program.
pub fn compile(fc: &FlowClassifier) -> Result<Vec<MatchFieldSet>, ClassifierError> {
    if fc.ethertype == EtherType::Ipv6 {
        warn_log!("ClassifierCompiler", classifier = %fc.id, "IPv6 classifier not supported, skipping");
        return Ok(Vec::new());
    }

    let (Some(nw_src), Some(nw_dst)) = (
        ipv4_or_any(fc.source_ip_prefix.as_ref()),
        ipv4_or_any(fc.destination_ip_prefix.as_ref()),
    ) else {
        warn_log!(
            "ClassifierCompiler",
            classifier = %fc.id,
            "IPv6 prefix on IPv4 classifier, skipping"
        );
        return Ok(Vec::new());
    };

    let src_masks = port_masks(fc.source_port_range_min, fc.source_port_range_max)?;
    let dst_masks = port_masks(fc.destination_port_range_min, fc.destination_port_range_max)?;
    let ip_proto = fc.protocol.map(|p| p.number());

    Ok(iproduct!(src_masks, dst_masks)
        .map(|(tp_src, tp_dst)| MatchFieldSet {
            eth_type: fc.ethertype.value(),
            ip_proto,
            nw_src,
            nw_dst,
            tp_src,
            tp_dst,
        })
        .collect())
}
