//! # flowmesh-checkpoint — execution snapshots and replay state
//!
//! This crate owns the data types a workflow execution is frozen into
//! and read back out of: [`state::CheckpointState`] (node states, node
//! outputs, variables at one instant) and [`state::WorkflowSnapshot`]
//! (the workflow's nodes/edges at execution start, used only to detect
//! drift before a replay). [`store::CheckpointStore`] is the pluggable
//! persistence seam; [`error`] carries both storage failures and the
//! replay-blocking reasons the planner in `flowmesh-core` reports.
//!
//! Checkpoints are opaque to everyone except the scheduler that seeds a
//! replay run from one — this crate does not interpret checkpoint
//! contents beyond the shapes declared here.

pub mod error;
pub mod state;
pub mod store;

pub use error::{CheckpointError, ReplayError, Result};
pub use state::{
    CheckpointNodeState, CheckpointNodeStatus, CheckpointState, SnapshotEdge, SnapshotNode,
    WorkflowSnapshot,
};
pub use store::{CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore};
