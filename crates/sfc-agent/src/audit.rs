//! Structured logging and audit records.
//!
//! Every change the agent makes to the bridge (flow batches, group
//! lifecycle, chain assembly and teardown) is reported twice: once through
//! the ordinary `*_log!` macros for operators, and once as a JSON
//! [`AuditRecord`] on the `audit` tracing target for later correlation.
//!
//! | Macro        | Level | Usage                                   |
//! |--------------|-------|-----------------------------------------|
//! | `error_log!` | error | a flow rule or dataplane batch failed   |
//! | `warn_log!`  | warn  | input ignored (IPv6, unbound port, ...) |
//! | `info_log!`  | info  | bootstrap, chain created / deleted      |
//! | `debug_log!` | debug | individual flow and group mutations     |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of change an audit record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditCategory {
    /// Static pipeline installed at startup
    Bootstrap,
    /// Agent configuration loaded or rejected
    ConfigurationChange,
    /// A flow rule compiled and applied to the bridge
    FlowProgramming,
    /// A flow rule's entries removed from the bridge
    FlowRemoval,
    /// Select group created, modified or deleted
    GroupLifecycle,
    /// Chain path nodes created or torn down
    ChainLifecycle,
    /// Classifier set of a chain changed
    ClassifierUpdate,
    /// Input rejected before any state changed
    Validation,
}

impl fmt::Display for AuditCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditCategory::Bootstrap => write!(f, "BOOTSTRAP"),
            AuditCategory::ConfigurationChange => write!(f, "CONFIGURATION_CHANGE"),
            AuditCategory::FlowProgramming => write!(f, "FLOW_PROGRAMMING"),
            AuditCategory::FlowRemoval => write!(f, "FLOW_REMOVAL"),
            AuditCategory::GroupLifecycle => write!(f, "GROUP_LIFECYCLE"),
            AuditCategory::ChainLifecycle => write!(f, "CHAIN_LIFECYCLE"),
            AuditCategory::ClassifierUpdate => write!(f, "CLASSIFIER_UPDATE"),
            AuditCategory::Validation => write!(f, "VALIDATION"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Success,
    Failure,
    InProgress,
    /// Rejected by policy (e.g. classifier validation)
    Denied,
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditOutcome::Success => write!(f, "success"),
            AuditOutcome::Failure => write!(f, "failure"),
            AuditOutcome::InProgress => write!(f, "in_progress"),
            AuditOutcome::Denied => write!(f, "denied"),
        }
    }
}

/// One audited change.
///
/// Built with the `with_*` methods and handed to [`audit_log!`](crate::audit_log).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub category: AuditCategory,
    /// Component that made the change (`SfcAgent`, `Topology`, ...).
    pub source: String,
    pub action: String,
    pub outcome: AuditOutcome,
    /// Flow rule id, chain id or group id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Ties related records together, such as the flow rules of one path
    /// node.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl AuditRecord {
    /// Starts a record stamped with the current time; outcome is
    /// `InProgress` until set.
    pub fn new(
        category: AuditCategory,
        source: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            category,
            source: source.into(),
            action: action.into(),
            outcome: AuditOutcome::InProgress,
            object_id: None,
            object_type: None,
            details: None,
            error: None,
            correlation_id: None,
        }
    }

    pub fn with_outcome(mut self, outcome: AuditOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn with_object_id(mut self, id: impl Into<String>) -> Self {
        self.object_id = Some(id.into());
        self
    }

    pub fn with_object_type(mut self, obj_type: impl Into<String>) -> Self {
        self.object_type = Some(obj_type.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Records the failure reason and marks the outcome as `Failure`.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self.outcome = AuditOutcome::Failure;
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| format!(r#"{{"error":"serialization_failed","message":"{}"}}"#, e))
    }
}

/// Debug-level event tagged with its source component.
///
/// ```ignore
/// debug_log!("FlowCompiler", table = %table, "adding flow");
/// ```
#[macro_export]
macro_rules! debug_log {
    ($source:expr, $($arg:tt)*) => {
        tracing::debug!(
            source = $source,
            $($arg)*
        )
    };
}

#[macro_export]
macro_rules! info_log {
    ($source:expr, $($arg:tt)*) => {
        tracing::info!(
            source = $source,
            $($arg)*
        )
    };
}

#[macro_export]
macro_rules! warn_log {
    ($source:expr, $($arg:tt)*) => {
        tracing::warn!(
            source = $source,
            $($arg)*
        )
    };
}

#[macro_export]
macro_rules! error_log {
    ($source:expr, $($arg:tt)*) => {
        tracing::error!(
            source = $source,
            $($arg)*
        )
    };
}

/// Emits an [`AuditRecord`] on the `audit` target.
///
/// Successes log at info, in-progress records at debug, failures and
/// denials at warn.
///
/// ```ignore
/// audit_log!(
///     AuditRecord::new(AuditCategory::GroupLifecycle, "SfcAgent", "delete_group")
///         .with_outcome(AuditOutcome::Success)
///         .with_object_id("7")
/// );
/// ```
#[macro_export]
macro_rules! audit_log {
    ($record:expr) => {
        let record = $record;
        match record.outcome {
            $crate::audit::AuditOutcome::Success => {
                tracing::info!(
                    target: "audit",
                    category = %record.category,
                    source = %record.source,
                    action = %record.action,
                    outcome = %record.outcome,
                    audit_json = %record.to_json(),
                    "AUDIT: {} - {} - {}",
                    record.category,
                    record.action,
                    record.outcome
                );
            }
            $crate::audit::AuditOutcome::InProgress => {
                tracing::debug!(
                    target: "audit",
                    category = %record.category,
                    source = %record.source,
                    action = %record.action,
                    outcome = %record.outcome,
                    audit_json = %record.to_json(),
                    "AUDIT: {} - {} - {}",
                    record.category,
                    record.action,
                    record.outcome
                );
            }
            $crate::audit::AuditOutcome::Failure | $crate::audit::AuditOutcome::Denied => {
                tracing::warn!(
                    target: "audit",
                    category = %record.category,
                    source = %record.source,
                    action = %record.action,
                    outcome = %record.outcome,
                    error = record.error.as_deref().unwrap_or(""),
                    audit_json = %record.to_json(),
                    "AUDIT: {} - {} - {}",
                    record.category,
                    record.action,
                    record.outcome
                );
            }
        }
    };
}

/// Installs a JSON subscriber. `RUST_LOG` overrides `log_level`.
pub fn init_logging(log_level: &str) -> Result<(), tracing_subscriber::util::TryInitError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .json(),
        )
        .try_init()
}

/// Human-readable variant of [`init_logging`] for running by hand.
pub fn init_logging_pretty(log_level: &str) -> Result<(), tracing_subscriber::util::TryInitError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true)
                .pretty(),
        )
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_record() {
        let record = AuditRecord::new(AuditCategory::FlowProgramming, "SfcAgent", "update_flow_rule")
            .with_outcome(AuditOutcome::Success)
            .with_object_id("node-1:pd-1")
            .with_object_type("flow_rule");

        assert_eq!(record.category, AuditCategory::FlowProgramming);
        assert_eq!(record.source, "SfcAgent");
        assert_eq!(record.outcome, AuditOutcome::Success);
        assert_eq!(record.object_id.as_deref(), Some("node-1:pd-1"));
    }

    #[test]
    fn test_error_marks_failure() {
        let record = AuditRecord::new(AuditCategory::GroupLifecycle, "SfcAgent", "ensure_group")
            .with_error("bridge rejected group 7");

        assert_eq!(record.outcome, AuditOutcome::Failure);
        assert_eq!(record.error.as_deref(), Some("bridge rejected group 7"));
    }

    #[test]
    fn test_json_shape() {
        let record = AuditRecord::new(AuditCategory::ChainLifecycle, "Topology", "create_chain")
            .with_outcome(AuditOutcome::Success)
            .with_correlation_id("chain-a")
            .with_details(serde_json::json!({ "nsp": 1, "hops": 2 }));

        let json = record.to_json();
        assert!(json.contains("CHAIN_LIFECYCLE"));
        assert!(json.contains("\"correlation_id\":\"chain-a\""));
        assert!(json.contains("\"hops\":2"));
        assert!(!json.contains("object_id"));
    }

    #[test]
    fn test_display() {
        assert_eq!(AuditCategory::GroupLifecycle.to_string(), "GROUP_LIFECYCLE");
        assert_eq!(AuditOutcome::Denied.to_string(), "denied");
    }
}
