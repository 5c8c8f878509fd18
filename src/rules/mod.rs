//! Rule synthesis: compile the policy into browser rules and install them.

pub mod compiler;
pub mod installer;
pub mod types;

pub use compiler::{
    block_page_url, compile, evaluate_item, CompileContext, CompiledRules, PolicySnapshot,
};
pub use installer::{
    Decision, InstallReport, LayerOutcome, MemoryRuleEngine, RuleEngine, RuleInstaller,
};
pub use types::{BlockReason, Redirect, ResourceType, Rule, RuleAction, RuleCondition, RuleLayer};
