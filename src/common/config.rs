use std::path::PathBuf;

use common::resources::Resources;

/// Runtime options of one scheduler instance, assembled from the command
/// line in `main`.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address of this node, handed to workers so they can reach cluster
    /// services.
    pub node_ip: String,
    /// Address of the global state store backing the task/object tables.
    pub redis_address: String,
    /// Unix socket of the local object store (availability notifications).
    pub store_socket: PathBuf,
    /// Unix socket of the local object manager (workers fetch through it).
    pub manager_socket: PathBuf,
    /// Unix socket this scheduler listens on for worker IPC.
    pub scheduler_socket: PathBuf,
    /// Argv template used to spawn worker processes; empty disables
    /// spawning.
    pub worker_command: Vec<String>,
    /// Number of workers spawned at startup.
    pub num_initial_workers: u32,
    pub resources: Resources,
    /// Directory for per-worker stdout/stderr logs.
    pub log_dir: PathBuf,
    /// Verify the queue/graph invariants after every turn. Costs a full
    /// walk of the queued tasks, so it is off outside debugging.
    pub debug_checks: bool,
}
