//! Flow classifier types.

use serde::{Deserialize, Serialize};
use sfc_types::{EtherType, IpPrefix, IpProtocol, MacAddress};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifierError {
    #[error("Classifier {0} names neither a logical source nor a logical destination port")]
    NoLogicalPort(String),
    #[error("Classifier {0} names both logical ports but policy allows exactly one")]
    BothLogicalPorts(String),
    #[error("Invalid port range: min ({min}) > max ({max})")]
    InvalidPortRange { min: u16, max: u16 },
}

/// How many logical ports a classifier must name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierPolicy {
    #[default]
    AtLeastOne,
    ExactlyOne,
}

impl fmt::Display for ClassifierPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassifierPolicy::AtLeastOne => write!(f, "at_least_one"),
            ClassifierPolicy::ExactlyOne => write!(f, "exactly_one"),
        }
    }
}

/// Traffic selector attached to a port chain.
///
/// Unset ranges and prefixes are wildcards. The two MAC fields are not
/// part of the user-facing classifier; they are filled in from port
/// bindings before a classifier reaches the flow compiler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowClassifier {
    pub id: String,
    #[serde(default)]
    pub ethertype: EtherType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<IpProtocol>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_port_range_min: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_port_range_max: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_port_range_min: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_port_range_max: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ip_prefix: Option<IpPrefix>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_ip_prefix: Option<IpPrefix>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logical_source_port: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logical_destination_port: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lsp_mac_address: Option<MacAddress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ldp_mac_address: Option<MacAddress>,
}

impl FlowClassifier {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self, policy: ClassifierPolicy) -> Result<(), ClassifierError> {
        match (
            self.logical_source_port.is_some(),
            self.logical_destination_port.is_some(),
            policy,
        ) {
            (false, false, _) => return Err(ClassifierError::NoLogicalPort(self.id.clone())),
            (true, true, ClassifierPolicy::ExactlyOne) => {
                return Err(ClassifierError::BothLogicalPorts(self.id.clone()))
            }
            _ => {}
        }

        for (min, max) in [
            (self.source_port_range_min, self.source_port_range_max),
            (self.destination_port_range_min, self.destination_port_range_max),
        ] {
            if let (Some(min), Some(max)) = (min, max) {
                if max != 0 && min > max {
                    return Err(ClassifierError::InvalidPortRange { min, max });
                }
            }
        }
        Ok(())
    }

    /// Exchanges every source-side field with its destination-side twin.
    pub fn swap_direction(&mut self) {
        std::mem::swap(&mut self.logical_source_port, &mut self.logical_destination_port);
        std::mem::swap(&mut self.lsp_mac_address, &mut self.ldp_mac_address);
        std::mem::swap(&mut self.source_ip_prefix, &mut self.destination_ip_prefix);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn classifier(lsp: Option<&str>, ldp: Option<&str>) -> FlowClassifier {
        FlowClassifier {
            logical_source_port: lsp.map(str::to_string),
            logical_destination_port: ldp.map(str::to_string),
            ..FlowClassifier::new("fc1")
        }
    }

    #[test]
    fn test_logical_port_policies() {
        let neither = classifier(None, None);
        let src_only = classifier(Some("p1"), None);
        let both = classifier(Some("p1"), Some("p2"));

        assert_eq!(
            neither.validate(ClassifierPolicy::AtLeastOne),
            Err(ClassifierError::NoLogicalPort("fc1".to_string()))
        );
        assert_eq!(src_only.validate(ClassifierPolicy::ExactlyOne), Ok(()));
        assert_eq!(both.validate(ClassifierPolicy::AtLeastOne), Ok(()));
        assert_eq!(
            both.validate(ClassifierPolicy::ExactlyOne),
            Err(ClassifierError::BothLogicalPorts("fc1".to_string()))
        );
    }

    #[test]
    fn test_inverted_range_rejected() {
        let mut fc = classifier(Some("p1"), None);
        fc.destination_port_range_min = Some(90);
        fc.destination_port_range_max = Some(80);
        assert_eq!(
            fc.validate(ClassifierPolicy::AtLeastOne),
            Err(ClassifierError::InvalidPortRange { min: 90, max: 80 })
        );
    }

    #[test]
    fn test_deserialize_partial() {
        let fc: FlowClassifier = serde_json::from_str(
            r#"{"id":"fc9","protocol":"tcp","destination_port_range_min":80,
                "destination_ip_prefix":"10.0.0.0/24","logical_source_port":"p1"}"#,
        )
        .unwrap();
        assert_eq!(fc.ethertype, EtherType::Ipv4);
        assert_eq!(fc.protocol, Some(IpProtocol::Tcp));
        assert_eq!(fc.destination_port_range_max, None);
        assert_eq!(
            fc.destination_ip_prefix.map(|p| p.to_string()).as_deref(),
            Some("10.0.0.0/24")
        );
    }

    #[test]
    fn test_swap_direction() {
        let mut fc = classifier(Some("p1"), Some("p2"));
        fc.source_ip_prefix = Some("10.0.0.1".parse().unwrap());
        fc.swap_direction();
        assert_eq!(fc.logical_source_port.as_deref(), Some("p2"));
        assert_eq!(fc.logical_destination_port.as_deref(), Some("p1"));
        assert_eq!(fc.source_ip_prefix, None);
        assert!(fc.destination_ip_prefix.is_some());
    }
}
