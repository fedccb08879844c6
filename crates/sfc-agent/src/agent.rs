//! Per-bridge agent: applies flow rules and reports their status.

use crate::config::{AgentConfig, CompilerContext};
use crate::dataplane::{
    execute, Dataplane, DataplaneError, DataplaneOp, ExecutionSummary, FlowAction, FlowEntry,
    FlowMatch, Table, PRIORITY_DEFAULT, PRIORITY_DROP,
};
use crate::flow::{FlowCompiler, FlowRule, FlowRuleError, FlowRuleStatus};
use crate::{
    audit::{AuditCategory, AuditOutcome, AuditRecord},
    audit_log, error_log, info_log,
};
use sfc_types::EtherType;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentStats {
    pub rules_applied: u64,
    pub rules_deleted: u64,
    pub rules_failed: u64,
    pub flows_added: u64,
    pub flow_deletes: u64,
    pub groups_created: u64,
    pub groups_modified: u64,
    pub groups_deleted: u64,
}

impl AgentStats {
    fn record(&mut self, summary: &ExecutionSummary) {
        self.flows_added += summary.flows_added;
        self.flow_deletes += summary.flow_deletes;
        self.groups_created += summary.groups_created;
        self.groups_modified += summary.groups_modified;
        self.groups_deleted += summary.groups_deleted;
    }
}

/// Compiles flow rules and programs them into one bridge.
///
/// A failing rule is logged, audited and reported as `error`; it never
/// stops the rest of a batch and nothing already installed is rolled back.
pub struct SfcAgent<D: Dataplane> {
    ctx: CompilerContext,
    dataplane: D,
    stats: AgentStats,
}

impl<D: Dataplane> SfcAgent<D> {
    pub fn new(config: &AgentConfig, dataplane: D) -> Self {
        Self::with_context(config.context(), dataplane)
    }

    pub fn with_context(ctx: CompilerContext, dataplane: D) -> Self {
        Self {
            ctx,
            dataplane,
            stats: AgentStats::default(),
        }
    }

    pub fn context(&self) -> &CompilerContext {
        &self.ctx
    }

    pub fn dataplane(&self) -> &D {
        &self.dataplane
    }

    pub fn dataplane_mut(&mut self) -> &mut D {
        &mut self.dataplane
    }

    pub fn stats(&self) -> &AgentStats {
        &self.stats
    }

    pub fn into_dataplane(self) -> D {
        self.dataplane
    }

    /// Clears chain state left on the bridge and installs the static
    /// pipeline entries.
    pub fn initialize(&mut self) -> Result<(), DataplaneError> {
        let ops = vec![
            DataplaneOp::DeleteAllGroups,
            DataplaneOp::DeleteFlows {
                table: Some(Table::CrossSubnet),
                priority: None,
                matches: FlowMatch::new(),
            },
            DataplaneOp::DeleteFlows {
                table: Some(Table::ChainIngress),
                priority: None,
                matches: FlowMatch::new(),
            },
            DataplaneOp::AddFlow(FlowEntry {
                table: Table::LocalSwitching,
                priority: PRIORITY_DEFAULT,
                matches: FlowMatch::new().dl_type(EtherType::MPLS_UNICAST),
                actions: vec![FlowAction::GotoTable(Table::ChainIngress)],
            }),
            DataplaneOp::AddFlow(FlowEntry {
                table: Table::ChainIngress,
                priority: PRIORITY_DROP,
                matches: FlowMatch::new(),
                actions: vec![FlowAction::Drop],
            }),
        ];

        let record = AuditRecord::new(AuditCategory::Bootstrap, "SfcAgent", "initialize")
            .with_object_id(self.ctx.bridge.clone())
            .with_object_type("bridge");

        match execute(&mut self.dataplane, &ops) {
            Ok(summary) => {
                self.stats.record(&summary);
                info_log!("SfcAgent", bridge = %self.ctx.bridge, "chain pipeline initialized");
                audit_log!(record.with_outcome(AuditOutcome::Success));
                Ok(())
            }
            Err(e) => {
                error_log!("SfcAgent", bridge = %self.ctx.bridge, error = %e, "pipeline bootstrap failed");
                audit_log!(record.with_error(e.to_string()));
                Err(e)
            }
        }
    }

    /// Installs (`add`) or removes the entries of one flow rule.
    pub fn apply(&mut self, rule: &FlowRule, add: bool) -> FlowRuleStatus {
        let (action, category) = if add {
            ("update_flow_rule", AuditCategory::FlowProgramming)
        } else {
            ("delete_flow_rule", AuditCategory::FlowRemoval)
        };

        match self.try_apply(rule, add) {
            Ok(summary) => {
                self.stats.record(&summary);
                if add {
                    self.stats.rules_applied += 1;
                } else {
                    self.stats.rules_deleted += 1;
                }
                audit_log!(
                    rule_record(category, action, rule)
                        .with_outcome(AuditOutcome::Success)
                        .with_details(serde_json::json!({
                            "node_role": rule.node_role.to_string(),
                            "nsp": rule.nsp,
                            "nsi": rule.nsi,
                            "flows_added": summary.flows_added,
                            "flow_deletes": summary.flow_deletes,
                        }))
                );
                FlowRuleStatus::active(rule.id.clone())
            }
            Err(e) => {
                self.stats.rules_failed += 1;
                error_log!(
                    "SfcAgent",
                    rule = %rule.id,
                    nsp = rule.nsp,
                    nsi = rule.nsi,
                    error = %e,
                    "{} failed",
                    action
                );
                audit_log!(rule_record(category, action, rule).with_error(e.to_string()));
                FlowRuleStatus::error(rule.id.clone())
            }
        }
    }

    pub fn delete(&mut self, rule: &FlowRule) -> FlowRuleStatus {
        self.apply(rule, false)
    }

    /// One status per input rule, in order.
    pub fn update_flow_rules(&mut self, rules: &[FlowRule]) -> Vec<FlowRuleStatus> {
        rules.iter().map(|rule| self.apply(rule, true)).collect()
    }

    pub fn delete_flow_rules(&mut self, rules: &[FlowRule]) -> Vec<FlowRuleStatus> {
        rules.iter().map(|rule| self.delete(rule)).collect()
    }

    fn try_apply(&mut self, rule: &FlowRule, add: bool) -> Result<ExecutionSummary, FlowRuleError> {
        let ops = {
            let compiler = FlowCompiler::new(&self.ctx, &self.dataplane);
            if add {
                compiler.compile_update(rule)?
            } else {
                compiler.compile_delete(rule)?
            }
        };
        Ok(execute(&mut self.dataplane, &ops)?)
    }
}

/// Audit record for one flow rule, correlated with the other rules of its
/// path node.
fn rule_record(category: AuditCategory, action: &str, rule: &FlowRule) -> AuditRecord {
    AuditRecord::new(category, "SfcAgent", action)
        .with_object_id(rule.id.clone())
        .with_object_type("flow_rule")
        .with_correlation_id(rule.node_id())
}
