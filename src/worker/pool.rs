use std::collections::VecDeque;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use common::comm::Sender;
use common::id::{ActorId, TaskId};
use common::wrapped::WrappedRcRefCell;
use common::Config;
use errors::Result;
use rpc::messages::SchedulerMessage;
use super::process::{worker_command, Process};

pub struct Worker {
    sender: Sender,
    /// Known after the worker's first message.
    pub pid: Option<u32>,
    /// The child handle, when this scheduler spawned the process itself.
    process: Option<Process>,
    /// Actor workers only ever receive tasks tagged with their identity.
    pub actor: Option<ActorId>,
    /// Task currently held by the worker, as an index into the task
    /// table; the scheduler keeps no back-pointer into its queues.
    pub assigned: Option<TaskId>,
}

pub type WorkerRef = WrappedRcRefCell<Worker>;

impl Worker {
    pub fn send(&self, message: &SchedulerMessage) {
        self.sender.send(::serde_cbor::to_vec(message).unwrap());
    }

    /// A plain worker serves plain tasks; an actor worker serves exactly
    /// its actor's tasks.
    pub fn can_serve(&self, actor: &Option<ActorId>) -> bool {
        self.actor == *actor
    }
}

impl WorkerRef {
    fn new(sender: Sender) -> Self {
        Self::wrap(Worker {
            sender,
            pid: None,
            process: None,
            actor: None,
            assigned: None,
        })
    }
}

/// Registered and about-to-register workers of this node, plus the idle
/// FIFO that dispatch draws from.
#[derive(Default)]
pub struct WorkerPool {
    /// Processes spawned by this scheduler whose connection has not yet
    /// identified itself with a pid.
    spawned: Vec<Process>,
    workers: Vec<WorkerRef>,
    idle: VecDeque<WorkerRef>,
}

impl WorkerPool {
    pub fn new() -> Self {
        Default::default()
    }

    /// Spawn a worker subprocess. It becomes a `Worker` only once it
    /// connects and registers its pid.
    pub fn start_worker(&mut self, config: &Config, actor: Option<&ActorId>) -> Result<u32> {
        let mut command = worker_command(config, actor)?;
        let name = format!("worker-{}", self.spawned.len() + self.workers.len());
        let process = Process::spawn(&config.log_dir, &name, &mut command)?;
        let pid = process.id();
        info!("spawned worker process (pid={})", pid);
        self.spawned.push(process);
        Ok(pid)
    }

    /// A connection arrived on the worker socket; the pid comes later
    /// with the registration message.
    pub fn add_connection(&mut self, sender: Sender) -> WorkerRef {
        let worker = WorkerRef::new(sender);
        self.workers.push(worker.clone());
        worker
    }

    /// First message of a worker: claim the pid, adopt the child handle
    /// if we spawned it, and record the actor identity.
    pub fn register_worker(&mut self, worker: &WorkerRef, pid: u32, actor: Option<ActorId>) {
        let mut inner = worker.get_mut();
        if inner.pid.is_some() {
            warn!("worker (pid={}) sent a second registration, ignoring", pid);
            return;
        }
        match self.spawned.iter().position(|process| process.id() == pid) {
            Some(position) => {
                inner.process = Some(self.spawned.remove(position));
            }
            None => {
                // Started by hand or by another supervisor; we track the
                // pid but own no child handle.
                debug!("registered externally started worker (pid={})", pid);
            }
        }
        info!(
            "worker registered (pid={}, actor={:?})",
            pid, actor
        );
        inner.pid = Some(pid);
        inner.actor = actor;
    }

    /// Terminate a worker and forget it. Its persisted task status is
    /// deliberately left alone; the reconstruction path owns recovery.
    pub fn kill_worker(&mut self, worker: &WorkerRef, forceful: bool) -> Result<()> {
        {
            let mut inner = worker.get_mut();
            if let Some(task_id) = inner.assigned.take() {
                warn!("killing worker holding task {}", task_id);
            }
            if let Some(ref mut process) = inner.process {
                if forceful {
                    process.kill()?;
                } else {
                    process.terminate()?;
                }
            } else if let Some(pid) = inner.pid {
                let signal = if forceful { Signal::SIGKILL } else { Signal::SIGTERM };
                kill(Pid::from_raw(pid as i32), signal)
                    .map_err(|e| format!("cannot signal worker (pid={}): {}", pid, e))?;
            }
        }
        self.remove_worker(worker);
        Ok(())
    }

    /// Forget a worker whose process died or whose connection dropped.
    pub fn remove_worker(&mut self, worker: &WorkerRef) {
        self.workers.retain(|known| known != worker);
        self.idle.retain(|known| known != worker);
    }

    /// Push a worker onto the idle FIFO. Refused while it still holds a
    /// task or when it is already queued.
    pub fn mark_idle(&mut self, worker: &WorkerRef) -> bool {
        if worker.get().assigned.is_some() || self.idle.contains(worker) {
            return false;
        }
        self.idle.push_back(worker.clone());
        true
    }

    pub fn has_idle_for(&self, actor: &Option<ActorId>) -> bool {
        self.idle.iter().any(|worker| worker.get().can_serve(actor))
    }

    /// Pop the first idle worker able to serve the given actor tag.
    pub fn pop_idle_for(&mut self, actor: &Option<ActorId>) -> Option<WorkerRef> {
        let position = self
            .idle
            .iter()
            .position(|worker| worker.get().can_serve(actor))?;
        self.idle.remove(position)
    }

    pub fn workers(&self) -> &[WorkerRef] {
        &self.workers
    }

    pub fn num_spawned(&self) -> usize {
        self.spawned.len()
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    pub fn num_idle(&self) -> usize {
        self.idle.len()
    }
}
