pub mod memory;

use std::time::Duration;

use futures::future::{self, Loop};
use futures::Future;
use tokio_timer::Timer;

use common::id::{ObjectId, SchedulerId, TaskId};
use common::spec::TaskSpec;
use errors::Error;

/// Persistent scheduling status of a task, as recorded in the task table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Queued somewhere, inputs not yet satisfied.
    Waiting,
    /// Claimed for execution (also the state a reconstruction claims a
    /// finished task back into).
    Scheduled,
    /// Handed to a worker.
    Running,
    Done,
    /// Terminally failed; consumers surface this state.
    Lost,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub spec: TaskSpec,
    pub status: TaskStatus,
    /// Scheduler that last took responsibility for the task.
    pub owner: SchedulerId,
}

/// The replicated task table, seen from one node. All operations are
/// asynchronous; writes from one node to one task ID are serialized by
/// the node itself.
pub trait TaskTable {
    /// Insert the record if the task is unknown. An existing record is
    /// left untouched (a reconstruction may already have claimed it).
    fn ensure_task(&self, record: TaskRecord) -> Box<Future<Item = (), Error = Error>>;

    fn get_task(&self, id: TaskId) -> Box<Future<Item = Option<TaskRecord>, Error = Error>>;

    fn update_status(&self, id: TaskId, to: TaskStatus) -> Box<Future<Item = (), Error = Error>>;

    /// Conditional update: succeeds (returning true) only when the prior
    /// status is one of `from`. The scheduler races other nodes on this.
    fn test_and_update_status(
        &self,
        id: TaskId,
        from: &[TaskStatus],
        to: TaskStatus,
    ) -> Box<Future<Item = bool, Error = Error>>;
}

/// The replicated object table: which schedulers hold a materialized
/// copy of an object. This node only reads it; locations are written by
/// the object managers.
pub trait ObjectTable {
    fn lookup(&self, id: ObjectId) -> Box<Future<Item = Vec<SchedulerId>, Error = Error>>;

    fn add_location(
        &self,
        id: ObjectId,
        location: SchedulerId,
    ) -> Box<Future<Item = (), Error = Error>>;

    fn remove_location(
        &self,
        id: ObjectId,
        location: SchedulerId,
    ) -> Box<Future<Item = (), Error = Error>>;
}

/// Retry a table request a bounded number of times with a growing delay.
/// Transient faults stay inside the interface layer; only the final
/// failure surfaces to the caller.
pub fn with_retries<T, F>(
    timer: &Timer,
    attempts: u32,
    delay: Duration,
    request: F,
) -> Box<Future<Item = T, Error = Error>>
where
    T: 'static,
    F: Fn() -> Box<Future<Item = T, Error = Error>> + 'static,
{
    let timer = timer.clone();
    Box::new(future::loop_fn(1u32, move |attempt| {
        let timer = timer.clone();
        request().then(move |result| -> Box<Future<Item = Loop<T, u32>, Error = Error>> {
            match result {
                Ok(value) => Box::new(future::ok(Loop::Break(value))),
                Err(error) => {
                    if attempt >= attempts {
                        return Box::new(future::err(error));
                    }
                    warn!(
                        "table request failed (attempt {}/{}): {}",
                        attempt, attempts, error
                    );
                    Box::new(
                        timer
                            .sleep(delay * attempt)
                            .map(move |()| Loop::Continue(attempt + 1))
                            .map_err(Error::from),
                    )
                }
            }
        })
    }))
}
