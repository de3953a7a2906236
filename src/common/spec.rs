use common::id::{ActorId, ObjectId, TaskId};

/// Immutable description of a unit of work: which objects it consumes,
/// which it produces, and an opaque payload telling the worker what to
/// run. The IDs are content-derived, so re-submitting the same spec hits
/// the same task-table row and the same return objects.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: TaskId,
    /// Ordered inputs. One object may appear several times.
    pub args: Vec<ObjectId>,
    /// Ordered outputs, derived from the task ID and the return index.
    pub returns: Vec<ObjectId>,
    /// Set when the task must run on a particular actor worker.
    pub actor: Option<ActorId>,
    pub payload: Vec<u8>,
}

impl TaskSpec {
    pub fn new(payload: Vec<u8>, args: Vec<ObjectId>, n_returns: usize, actor: Option<ActorId>) -> TaskSpec {
        let id = TaskId::derive(&payload, &args, n_returns, actor.as_ref());
        let returns = (0..n_returns).map(|i| id.return_object(i as u32)).collect();
        TaskSpec {
            id,
            args,
            returns,
            actor,
            payload,
        }
    }
}
