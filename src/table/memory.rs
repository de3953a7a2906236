use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use futures::future;
use futures::Future;

use super::{ObjectTable, TaskRecord, TaskStatus, TaskTable};
use common::id::{ObjectId, SchedulerId, TaskId};
use errors::Error;

/// Single-process stand-in for the replicated task table. Writes apply
/// at call time and the returned future only signals completion, which
/// mirrors an RPC client issuing the request when the call is made.
#[derive(Clone)]
pub struct MemoryTaskTable {
    records: Rc<RefCell<HashMap<TaskId, TaskRecord>>>,
}

impl MemoryTaskTable {
    pub fn new() -> Self {
        MemoryTaskTable {
            records: Rc::new(RefCell::new(HashMap::new())),
        }
    }

    /// Direct insert, bypassing `ensure_task` semantics. Used to seed
    /// pre-existing cluster state.
    pub fn insert(&self, record: TaskRecord) {
        self.records.borrow_mut().insert(record.spec.id, record);
    }

    pub fn status_of(&self, id: TaskId) -> Option<TaskStatus> {
        self.records.borrow().get(&id).map(|record| record.status)
    }
}

impl TaskTable for MemoryTaskTable {
    fn ensure_task(&self, record: TaskRecord) -> Box<Future<Item = (), Error = Error>> {
        self.records
            .borrow_mut()
            .entry(record.spec.id)
            .or_insert(record);
        Box::new(future::ok(()))
    }

    fn get_task(&self, id: TaskId) -> Box<Future<Item = Option<TaskRecord>, Error = Error>> {
        Box::new(future::ok(self.records.borrow().get(&id).cloned()))
    }

    fn update_status(&self, id: TaskId, to: TaskStatus) -> Box<Future<Item = (), Error = Error>> {
        match self.records.borrow_mut().get_mut(&id) {
            Some(record) => {
                record.status = to;
                Box::new(future::ok(()))
            }
            None => Box::new(future::err(
                format!("status update for unknown task {}", id).into(),
            )),
        }
    }

    fn test_and_update_status(
        &self,
        id: TaskId,
        from: &[TaskStatus],
        to: TaskStatus,
    ) -> Box<Future<Item = bool, Error = Error>> {
        let swapped = match self.records.borrow_mut().get_mut(&id) {
            Some(record) if from.contains(&record.status) => {
                record.status = to;
                true
            }
            _ => false,
        };
        Box::new(future::ok(swapped))
    }
}

#[derive(Clone)]
pub struct MemoryObjectTable {
    locations: Rc<RefCell<HashMap<ObjectId, HashSet<SchedulerId>>>>,
}

impl MemoryObjectTable {
    pub fn new() -> Self {
        MemoryObjectTable {
            locations: Rc::new(RefCell::new(HashMap::new())),
        }
    }
}

impl ObjectTable for MemoryObjectTable {
    fn lookup(&self, id: ObjectId) -> Box<Future<Item = Vec<SchedulerId>, Error = Error>> {
        let locations = self
            .locations
            .borrow()
            .get(&id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_else(Vec::new);
        Box::new(future::ok(locations))
    }

    fn add_location(
        &self,
        id: ObjectId,
        location: SchedulerId,
    ) -> Box<Future<Item = (), Error = Error>> {
        self.locations
            .borrow_mut()
            .entry(id)
            .or_insert_with(HashSet::new)
            .insert(location);
        Box::new(future::ok(()))
    }

    fn remove_location(
        &self,
        id: ObjectId,
        location: SchedulerId,
    ) -> Box<Future<Item = (), Error = Error>> {
        // The entry itself stays: an evicted object has an empty location
        // set, which is not the same as one that never existed.
        if let Some(set) = self.locations.borrow_mut().get_mut(&id) {
            set.remove(&location);
        }
        Box::new(future::ok(()))
    }
}
