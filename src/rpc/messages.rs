use common::id::{ActorId, ObjectId, TaskId};
use common::spec::TaskSpec;

/// Messages a worker sends the scheduler, cbor-encoded inside
/// length-prefixed frames.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum WorkerMessage {
    /// First message on a fresh connection.
    Register(RegisterMsg),
    /// Queue a new task.
    Submit(SubmitMsg),
    /// The worker is idle and wants its next task.
    GetTask,
    TaskDone(TaskId),
    TaskFailed(TaskId),
    /// An input the worker needs is gone from the store; rebuild it.
    Reconstruct(ObjectId),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegisterMsg {
    /// Must match `WORKER_PROTOCOL_VERSION`; mismatching workers are
    /// disconnected at registration.
    pub protocol: i32,
    pub pid: u32,
    pub actor: Option<ActorId>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubmitMsg {
    pub spec: TaskSpec,
}

/// Messages the scheduler sends a worker.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum SchedulerMessage {
    /// Answer to `GetTask`: run this.
    Assign(TaskSpec),
}

/// Notifications from the local object store.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum StoreNotification {
    Added(ObjectId),
    Removed(ObjectId),
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::id::ID_SIZE;

    #[test]
    fn worker_messages_survive_the_wire() {
        let spec = TaskSpec::new(
            b"fn".to_vec(),
            vec![ObjectId::from_bytes([1; ID_SIZE])],
            1,
            None,
        );
        let message = WorkerMessage::Submit(SubmitMsg { spec: spec.clone() });
        let bytes = ::serde_cbor::to_vec(&message).unwrap();
        match ::serde_cbor::from_slice(&bytes).unwrap() {
            WorkerMessage::Submit(decoded) => assert_eq!(decoded.spec, spec),
            other => panic!("unexpected message {:?}", other),
        }
    }
}
