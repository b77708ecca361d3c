//! Built-in node executors (§4.12): concrete [`crate::executor::Executor`]
//! implementations for every node type the fixed catalogue names, plus
//! the shared agent runner `agent-A`/`agent-B`/`reflection` drive
//! through [`agent::AgentBackend`].

pub mod agent;
pub mod approval;
pub mod condition;
mod input_output;
pub mod merge;
pub mod script;
pub mod shell;

pub use agent::{AgentBackend, AgentExecutor, AgentRun, ReflectionExecutor};
pub use approval::ApprovalExecutor;
pub use condition::ConditionExecutor;
pub use input_output::{InputExecutor, OutputExecutor};
pub use merge::MergeExecutor;
pub use script::ScriptExecutor;
pub use shell::ShellExecutor;

use std::sync::Arc;

use crate::error::SchedulerError;
use crate::executor::ExecutorRegistry;
use crate::model::node_kind;

/// Seeds a fresh registry with every built-in node type (§4.12). Callers
/// that only need a subset of node types for a test fixture should build
/// their own registry by hand instead — this is the "real workflow"
/// entry point.
pub fn register_builtins(registry: &mut ExecutorRegistry, agent_backend: Arc<dyn AgentBackend>) -> Result<(), SchedulerError> {
    registry.register(node_kind::INPUT, Arc::new(InputExecutor))?;
    registry.register(node_kind::OUTPUT, Arc::new(OutputExecutor))?;
    registry.register(node_kind::CONDITION, Arc::new(ConditionExecutor))?;
    registry.register(node_kind::MERGE, Arc::new(MergeExecutor))?;
    registry.register(node_kind::SCRIPT, Arc::new(ScriptExecutor))?;
    registry.register(node_kind::SHELL, Arc::new(ShellExecutor))?;
    registry.register(node_kind::APPROVAL, Arc::new(ApprovalExecutor))?;
    registry.register(node_kind::REFLECTION, Arc::new(ReflectionExecutor::new(agent_backend.clone())))?;
    registry.register("agent-A", Arc::new(AgentExecutor::new("agent-A", agent_backend.clone())))?;
    registry.register("agent-B", Arc::new(AgentExecutor::new("agent-B", agent_backend)))?;
    Ok(())
}
