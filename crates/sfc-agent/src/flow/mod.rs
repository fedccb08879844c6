//! Path node flow rules and their compilation into dataplane operations.

mod compiler;
mod types;

pub use compiler::FlowCompiler;
pub use types::{CompileError, FlowRule, FlowRuleError, FlowRuleStatus, NodeRole, RuleStatus};
