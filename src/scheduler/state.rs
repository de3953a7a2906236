use std::cell::Cell;
use std::collections::HashSet;
use std::rc::Rc;
use std::time::Duration;

use futures::{Future, Stream};
use tokio_core::reactor::{Core, Handle};
use tokio_timer::Timer;
use tokio_uds::{UnixListener, UnixStream};

use common::comm::{create_protocol_stream, Connection};
use common::id::{ActorId, ObjectId, SchedulerId, TaskId};
use common::spec::TaskSpec;
use common::wrapped::WrappedRcRefCell;
use common::Config;
use errors::{Error, ErrorKind, Result, ResultExt};
use rpc::messages::{SchedulerMessage, WorkerMessage};
use table::{ObjectTable, TaskRecord, TaskStatus, TaskTable};
use worker::pool::{WorkerPool, WorkerRef};
use super::algorithm::SchedulingState;

/// The single owning container for everything one scheduler instance
/// mutates. All five input events funnel through methods here and run
/// to completion on the loop thread; there is no other mutator.
pub struct State {
    pub(crate) scheduling: SchedulingState,
    pub(crate) pool: WorkerPool,
    pub(crate) task_table: Rc<TaskTable>,
    pub(crate) object_table: Rc<ObjectTable>,
    /// Objects whose reconstruction decision is in flight. An arriving
    /// `object_available` clears the entry, aborting the decision before
    /// its conditional update; duplicate requests fold into one entry.
    pub(crate) pending_reconstructions: HashSet<ObjectId>,
    pub(crate) scheduler_id: SchedulerId,
    pub(crate) config: Config,
    pub(crate) timer: Timer,
    handle: Handle,
    /// Finite asynchronous operations still in flight; `drain` spins the
    /// reactor until this reaches zero.
    pending_ops: Rc<Cell<usize>>,
}

pub type StateRef = WrappedRcRefCell<State>;

impl State {
    #[inline]
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn num_waiting_tasks(&self) -> usize {
        self.scheduling.num_waiting()
    }

    pub fn num_dispatch_tasks(&self) -> usize {
        self.scheduling.num_dispatch()
    }

    /// Spawn a finite background operation, tracked for `drain`.
    pub(crate) fn spawn<F>(&self, future: F)
    where
        F: Future<Item = (), Error = Error> + 'static,
    {
        let pending = self.pending_ops.clone();
        pending.set(pending.get() + 1);
        self.handle.spawn(future.then(move |result| {
            pending.set(pending.get() - 1);
            if let Err(error) = result {
                error!("background operation failed: {}", error);
            }
            Ok(())
        }));
    }

    /// A local worker submitted a task (or a reconstruction re-submitted
    /// one). The persistent record is created on first sight; a record
    /// already claimed by a reconstruction keeps its status.
    pub fn handle_task_submitted(&mut self, spec: TaskSpec) {
        debug!(
            "task {} submitted ({} args, {} returns)",
            spec.id,
            spec.args.len(),
            spec.returns.len()
        );
        let ensure = self.task_table.ensure_task(TaskRecord {
            spec: spec.clone(),
            status: TaskStatus::Waiting,
            owner: self.scheduler_id,
        });
        self.spawn(ensure);
        if self.scheduling.submit(spec) {
            self.dispatch_tasks();
        }
    }

    /// The local store gained an object.
    pub fn handle_object_available(&mut self, object_id: ObjectId) {
        debug!("object {} is available locally", object_id);
        if self.pending_reconstructions.remove(&object_id) {
            debug!(
                "object {} reappeared, in-flight reconstruction will abort",
                object_id
            );
        }
        if self.scheduling.object_available(object_id) > 0 {
            self.dispatch_tasks();
        }
    }

    /// The local store lost an object (eviction or crash).
    pub fn handle_object_removed(&mut self, object_id: ObjectId) {
        debug!("object {} was removed locally", object_id);
        self.scheduling.object_removed(object_id);
    }

    /// A worker reported in for work.
    pub fn handle_worker_available(&mut self, worker: &WorkerRef) {
        if worker.get().assigned.is_some() {
            warn!("worker asked for a task while still holding one, ignoring");
            return;
        }
        if self.pool.mark_idle(worker) {
            debug!("worker reported available ({} idle)", self.pool.num_idle());
        }
        self.dispatch_tasks();
    }

    pub fn handle_task_done(&mut self, worker: &WorkerRef, task_id: TaskId) {
        if !self.detach_assignment(worker, task_id, "finished") {
            return;
        }
        debug!("task {} finished", task_id);
        let update = self.task_table.update_status(task_id, TaskStatus::Done);
        self.spawn(update);
    }

    /// The worker itself reported failure; unlike a worker crash this is
    /// a terminal verdict, surfaced through the task table.
    pub fn handle_task_failed(&mut self, worker: &WorkerRef, task_id: TaskId) {
        if !self.detach_assignment(worker, task_id, "failed") {
            return;
        }
        warn!("task {} failed on its worker", task_id);
        let update = self.task_table.update_status(task_id, TaskStatus::Lost);
        self.spawn(update);
    }

    fn detach_assignment(&mut self, worker: &WorkerRef, task_id: TaskId, verb: &str) -> bool {
        let mut inner = worker.get_mut();
        match inner.assigned {
            Some(assigned) if assigned == task_id => {
                inner.assigned = None;
                true
            }
            _ => {
                warn!("worker reported task {} as {} but does not hold it", task_id, verb);
                false
            }
        }
    }

    pub fn start_worker(&mut self, actor: Option<&ActorId>) -> Result<u32> {
        self.pool.start_worker(&self.config, actor)
    }

    /// Pair dispatch-queue tasks with idle workers until one side runs
    /// dry. FIFO within what the idle set can serve.
    fn dispatch_tasks(&mut self) {
        loop {
            let spec = {
                let pool = &self.pool;
                let scheduling = &mut self.scheduling;
                match scheduling.pop_dispatchable(|spec| pool.has_idle_for(&spec.actor)) {
                    Some(spec) => spec,
                    None => break,
                }
            };
            let worker = self.pool.pop_idle_for(&spec.actor).unwrap();
            self.assign_task(spec, &worker);
        }
    }

    fn assign_task(&mut self, spec: TaskSpec, worker: &WorkerRef) {
        debug!(
            "assigning task {} to worker (pid={:?})",
            spec.id,
            worker.get().pid
        );
        let update = self.task_table.update_status(spec.id, TaskStatus::Running);
        self.spawn(update);
        let mut inner = worker.get_mut();
        inner.assigned = Some(spec.id);
        inner.send(&SchedulerMessage::Assign(spec));
    }
}

impl State {
    /// The queue/graph invariants plus the worker side: no task is held
    /// by two workers, and a held task is no longer queued.
    pub fn check_consistency(&self) -> Result<()> {
        self.scheduling.check_consistency()?;
        let mut held = HashSet::new();
        for worker in self.pool.workers() {
            if let Some(task_id) = worker.get().assigned {
                if !held.insert(task_id) {
                    bail!("task {} is held by two workers", task_id);
                }
                if self.scheduling.graph.contains(&task_id) {
                    bail!("assigned task {} is still queued", task_id);
                }
            }
        }
        Ok(())
    }
}

impl StateRef {
    pub fn new(
        handle: Handle,
        config: Config,
        task_table: Rc<TaskTable>,
        object_table: Rc<ObjectTable>,
    ) -> StateRef {
        let scheduler_id = SchedulerId::for_node(&config.node_ip, &config.scheduler_socket);
        info!("local scheduler {} created", scheduler_id);
        Self::wrap(State {
            scheduling: SchedulingState::new(),
            pool: WorkerPool::new(),
            task_table,
            object_table,
            pending_reconstructions: HashSet::new(),
            scheduler_id,
            config,
            timer: ::tokio_timer::wheel().build(),
            handle,
            pending_ops: Rc::new(Cell::new(0)),
        })
    }

    /// Bind the worker socket, subscribe to the object store, and spawn
    /// the initial worker processes. Failures here are fatal.
    pub fn start(&self) -> Result<()> {
        let (handle, config) = {
            let state = self.get();
            (state.handle.clone(), state.config.clone())
        };

        // A stale socket file from a previous run would block the bind.
        if config.scheduler_socket.exists() {
            let _ = ::std::fs::remove_file(&config.scheduler_socket);
        }
        let listener = UnixListener::bind(&config.scheduler_socket, &handle)
            .chain_err(|| format!("cannot bind worker socket {:?}", config.scheduler_socket))?;
        info!("listening for workers on {:?}", config.scheduler_socket);

        let accept_state = self.clone();
        let accept = listener
            .incoming()
            .for_each(move |(stream, _)| {
                accept_state.on_worker_connection(stream);
                Ok(())
            })
            .map_err(|error| error!("worker socket accept failed: {}", error));
        handle.spawn(accept);

        ::rpc::store::subscribe_to_store(self, &config.store_socket, &handle)?;

        for _ in 0..config.num_initial_workers {
            self.get_mut().start_worker(None)?;
        }
        Ok(())
    }

    pub fn on_worker_connection(&self, stream: UnixStream) {
        info!("new worker connection");
        let handle = self.get().handle.clone();
        let connection = Connection::from(create_protocol_stream(stream));
        let worker = self.get_mut().pool.add_connection(connection.sender());

        let message_state = self.clone();
        let message_worker = worker.clone();
        let close_state = self.clone();
        connection.start(
            &handle,
            move |frame| {
                let message: WorkerMessage = match ::serde_cbor::from_slice(&frame) {
                    Ok(message) => message,
                    Err(error) => bail!(ErrorKind::InvalidMessage(error.to_string())),
                };
                message_state.process_message(&message_worker, message);
                Ok(())
            },
            move |error| close_state.on_worker_disconnected(&worker, error),
        );
    }

    /// Connection teardown, for both clean exits and protocol errors.
    /// The persistent status of an in-flight task is left untouched; its
    /// unproduced returns stay location-less and the next consumer
    /// triggers reconstruction.
    pub fn on_worker_disconnected(&self, worker: &WorkerRef, error: Option<Error>) {
        match error {
            Some(error) => warn!("worker connection failed: {}", error),
            None => info!("worker disconnected"),
        }
        if let Some(task_id) = worker.get().assigned {
            warn!("worker died holding task {}", task_id);
        }
        self.get_mut().pool.remove_worker(worker);
    }

    /// Single entry point for worker IPC, one message at a time.
    pub fn process_message(&self, worker: &WorkerRef, message: WorkerMessage) {
        match message {
            WorkerMessage::Register(msg) => {
                if msg.protocol != ::WORKER_PROTOCOL_VERSION {
                    warn!(
                        "worker (pid={}) speaks protocol {}, expected {}; disconnecting",
                        msg.pid,
                        msg.protocol,
                        ::WORKER_PROTOCOL_VERSION
                    );
                    self.get_mut().pool.remove_worker(worker);
                    return;
                }
                self.get_mut().pool.register_worker(worker, msg.pid, msg.actor)
            }
            WorkerMessage::Submit(msg) => self.get_mut().handle_task_submitted(msg.spec),
            WorkerMessage::GetTask => self.get_mut().handle_worker_available(worker),
            WorkerMessage::TaskDone(task_id) => self.get_mut().handle_task_done(worker, task_id),
            WorkerMessage::TaskFailed(task_id) => {
                self.get_mut().handle_task_failed(worker, task_id)
            }
            WorkerMessage::Reconstruct(object_id) => {
                let decision = self.reconstruct_object(object_id);
                self.get().spawn(decision);
            }
        }
    }

    /// One turn of housekeeping between reactor turns.
    pub fn turn(&self) {
        let state = self.get();
        if state.config.debug_checks {
            if let Err(error) = state.check_consistency() {
                panic!("scheduler state inconsistent: {}", error);
            }
        }
    }

    /// Spin the reactor until no tracked asynchronous operation is in
    /// flight. This is the quiescence point test harnesses and shutdown
    /// paths wait for.
    pub fn drain(&self, core: &mut Core) {
        while self.get().pending_ops.get() > 0 {
            core.turn(Some(Duration::from_millis(10)));
        }
    }
}
