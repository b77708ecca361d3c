//! Ambient configuration (§4.13). In-process builders, not a file
//! format — the core has no opinion on where configuration text lives;
//! a boundary collaborator owns parsing it and handing these structs in.

use std::time::Duration;

/// Tuning knobs for the scheduler's ready-set loop.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Upper bound on how long the ready-set loop waits for the next
    /// in-flight node to settle before re-checking interruption and
    /// readiness (§4.4 "Main loop"). Nodes settle independently as soon
    /// as they finish, not in lockstep batches — this is a ceiling, not
    /// a fixed sleep.
    pub idle_poll_interval: Duration,
    /// Multiplier applied to the ancestor-walk bounded-iteration cap
    /// (`|ancestors|^2 * multiplier`); raised for pathological test
    /// fixtures with deep, narrow cycles.
    pub ancestor_bound_multiplier: u64,
    /// Default per-node timeout applied by script/shell/agent executors
    /// when the node config doesn't specify one.
    pub default_node_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            idle_poll_interval: Duration::from_millis(100),
            ancestor_bound_multiplier: 1,
            default_node_timeout: Duration::from_secs(300),
        }
    }
}

/// Where (and whether) the event journal persists to disk.
#[derive(Debug, Clone, Default)]
pub struct JournalConfig {
    /// Root directory under which `{execution_id}/events.jsonl` and
    /// `{execution_id}/summary.json` are written. `None` means
    /// in-memory only (tests, ephemeral embeddings).
    pub root_dir: Option<std::path::PathBuf>,
}

impl JournalConfig {
    pub fn in_memory() -> Self {
        Self { root_dir: None }
    }

    pub fn persisted(root_dir: impl Into<std::path::PathBuf>) -> Self {
        Self { root_dir: Some(root_dir.into()) }
    }
}
