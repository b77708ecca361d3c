//! # flowmesh-core — workflow execution engine
//!
//! The DAG scheduler, reference resolver, replay planner, and their
//! supporting subsystems for a workflow execution engine: a graph of
//! heterogeneous nodes (agents, scripted steps, conditionals, merges,
//! human approvals, self-reflecting steps) plus a user input go in; a
//! stream of [`events::ExecutionEvent`]s comes out.
//!
//! ## Core concepts
//!
//! - [`model::Workflow`] is the immutable graph definition: nodes, edges,
//!   and the `{{Name.path}}`-addressable names each node exposes.
//! - [`graph::GraphIndex`] answers structural queries (predecessors,
//!   ancestors, reachability) against a borrowed workflow.
//! - [`executor::Executor`] is the per-node-type contract; a process
//!   registers its handlers once into an [`executor::ExecutorRegistry`]
//!   before running anything. [`nodes`] ships the built-in catalogue.
//! - [`scheduler::Scheduler`] drives the ready-set loop: parallel
//!   dispatch, branch skipping, loop/back-edge resets, cooperative
//!   cancellation, and local error recovery.
//! - [`resolve::Resolver`] evaluates `{{Name.path}}` references against a
//!   point-in-time snapshot of node outputs and variables.
//! - [`approval::ApprovalCoordinator`] and [`subscribe::SubscriptionHub`]
//!   are the two message-passing seams a boundary collaborator drives
//!   from outside: human responses in, live event fan-out out.
//! - [`journal::EventJournal`] is the single source of truth for "what
//!   happened"; [`replay::ReplayPlanner`] turns a past execution's
//!   checkpoint plus a `fromNodeId` into the node sets a new,
//!   partially-cached execution needs.
//!
//! ## Minimal usage
//!
//! ```rust,ignore
//! use flowmesh_core::{ExecutorRegistry, Scheduler, SchedulerConfig, JournalConfig};
//! use flowmesh_core::approval::ApprovalCoordinator;
//! use flowmesh_core::nodes;
//! use std::sync::Arc;
//!
//! let mut registry = ExecutorRegistry::new();
//! nodes::register_builtins(&mut registry, my_agent_backend)?;
//!
//! let scheduler = Scheduler::new(Arc::new(registry), Arc::new(ApprovalCoordinator::new()), SchedulerConfig::default());
//! let handle = scheduler.begin_execution(&workflow, JournalConfig::in_memory())?;
//! let result = scheduler.execute(&workflow, input, handle).await?;
//! # Ok::<(), flowmesh_core::SchedulerError>(())
//! ```

pub mod approval;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod executor;
pub mod graph;
pub mod journal;
pub mod model;
pub mod nodes;
pub mod replay;
pub mod resolve;
pub mod scheduler;
pub mod subscribe;

pub use approval::{ApprovalCoordinator, ApprovalOutcome};
pub use config::{JournalConfig, SchedulerConfig};
pub use error::{GraphError, NodeError, Result, ResolverError, SchedulerError, ValidationIssue};
pub use events::{AgentEvent, ApprovalRequest, ApprovalResponse, ControlEvent, EvolutionRecord, ExecutionEvent};
pub use executor::{Executor, ExecutorOutput, ExecutorRegistry, ExecutorView};
pub use graph::GraphIndex;
pub use journal::{EventJournal, EventRecord, SharedJournal};
pub use model::{
    Edge, EdgeId, ExecutionStatus, ExecutionSummary, Node, NodeData, NodeId, NodeState, NodeStatus, NodeSummary, ReplayMetadata, Workflow, WorkflowId,
};
pub use replay::{BlockingReason, NodeReplayInfo, ReplayPlan, ReplayPlanner, ReplayWarning};
pub use resolve::{ParsedReference, PathSegment, ResolveScope, Resolver};
pub use scheduler::{ExecutionHandle, ReplaySeed, Scheduler};
pub use subscribe::SubscriptionHub;
