use std::collections::{HashMap, HashSet};

use common::id::{ObjectId, TaskId};
use common::spec::TaskSpec;
use super::availability::ObjectIndex;

pub struct TaskEntry {
    pub spec: TaskSpec,
    /// Arguments not yet present in the local store. Multiplicities in
    /// `spec.args` are represented only once.
    pub remaining: HashSet<ObjectId>,
}

/// Dependency bookkeeping for queued tasks: the forward map carries each
/// task's spec and unmet arguments, the reverse map answers "who is
/// waiting on this object". Reverse edges exist exactly for unmet
/// arguments of queued tasks. Assignment is modeled as removal, so
/// workers hold only task IDs and no back-pointers arise.
#[derive(Default)]
pub struct DependencyGraph {
    forward: HashMap<TaskId, TaskEntry>,
    reverse: HashMap<ObjectId, HashSet<TaskId>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Default::default()
    }

    #[inline]
    pub fn contains(&self, id: &TaskId) -> bool {
        self.forward.contains_key(id)
    }

    pub fn spec(&self, id: &TaskId) -> Option<&TaskSpec> {
        self.forward.get(id).map(|entry| &entry.spec)
    }

    pub fn entry(&self, id: &TaskId) -> Option<&TaskEntry> {
        self.forward.get(id)
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    /// Install a task; returns true when all its arguments are already
    /// present and the task can go straight to the dispatch queue.
    pub fn add_task(&mut self, spec: TaskSpec, available: &ObjectIndex) -> bool {
        let id = spec.id;
        let remaining: HashSet<ObjectId> = spec
            .args
            .iter()
            .cloned()
            .filter(|object| !available.contains(object))
            .collect();
        for object in &remaining {
            self.reverse
                .entry(*object)
                .or_insert_with(HashSet::new)
                .insert(id);
        }
        let ready = remaining.is_empty();
        self.forward.insert(id, TaskEntry { spec, remaining });
        ready
    }

    /// An object arrived: clear it from every waiter and report the tasks
    /// whose dependency set just became empty.
    pub fn object_available(&mut self, object_id: ObjectId) -> HashSet<TaskId> {
        let mut ready = HashSet::new();
        if let Some(waiters) = self.reverse.remove(&object_id) {
            for task_id in waiters {
                let entry = self.forward.get_mut(&task_id).unwrap();
                entry.remaining.remove(&object_id);
                if entry.remaining.is_empty() {
                    ready.insert(task_id);
                }
            }
        }
        ready
    }

    /// An object is gone: every queued task consuming it regains the
    /// dependency. Returns the tasks that had been fully satisfied (the
    /// caller moves those from dispatch back to waiting).
    pub fn object_removed(&mut self, object_id: ObjectId) -> Vec<TaskId> {
        let mut regressed = Vec::new();
        let DependencyGraph {
            ref mut forward,
            ref mut reverse,
        } = *self;
        for (task_id, entry) in forward.iter_mut() {
            if !entry.spec.args.contains(&object_id) {
                continue;
            }
            let was_ready = entry.remaining.is_empty();
            if entry.remaining.insert(object_id) {
                reverse
                    .entry(object_id)
                    .or_insert_with(HashSet::new)
                    .insert(*task_id);
                if was_ready {
                    regressed.push(*task_id);
                }
            }
        }
        regressed
    }

    /// Drop a task and all its reverse edges, yielding its spec.
    pub fn remove_task(&mut self, task_id: &TaskId) -> Option<TaskSpec> {
        let entry = self.forward.remove(task_id)?;
        for object in &entry.remaining {
            let emptied = {
                let waiters = self.reverse.get_mut(object).unwrap();
                waiters.remove(task_id);
                waiters.is_empty()
            };
            if emptied {
                self.reverse.remove(object);
            }
        }
        Some(entry.spec)
    }

    pub(crate) fn reverse(&self) -> &HashMap<ObjectId, HashSet<TaskId>> {
        &self.reverse
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::id::ID_SIZE;

    fn oid(n: u8) -> ObjectId {
        ObjectId::from_bytes([n; ID_SIZE])
    }

    fn spec_with_args(tag: u8, args: Vec<ObjectId>) -> TaskSpec {
        TaskSpec::new(vec![tag], args, 1, None)
    }

    #[test]
    fn reverse_edges_follow_unmet_arguments() {
        let mut graph = DependencyGraph::new();
        let mut index = ObjectIndex::new();
        index.insert(oid(1));

        let spec = spec_with_args(0, vec![oid(1), oid(2)]);
        let id = spec.id;
        assert!(!graph.add_task(spec, &index));
        assert!(graph.reverse().get(&oid(2)).unwrap().contains(&id));
        assert!(graph.reverse().get(&oid(1)).is_none());

        assert_eq!(graph.object_available(oid(2)).len(), 1);
        assert!(graph.reverse().is_empty());

        graph.remove_task(&id);
        assert!(!graph.contains(&id));
    }

    #[test]
    fn duplicate_arguments_count_once() {
        let mut graph = DependencyGraph::new();
        let index = ObjectIndex::new();
        let spec = spec_with_args(0, vec![oid(1), oid(1)]);
        let id = spec.id;
        graph.add_task(spec, &index);
        assert_eq!(graph.entry(&id).unwrap().remaining.len(), 1);
        assert!(graph.object_available(oid(1)).contains(&id));
    }

    #[test]
    fn removal_regresses_only_satisfied_tasks() {
        let mut graph = DependencyGraph::new();
        let mut index = ObjectIndex::new();
        index.insert(oid(1));

        let satisfied = spec_with_args(0, vec![oid(1)]);
        let satisfied_id = satisfied.id;
        let blocked = spec_with_args(1, vec![oid(1), oid(2)]);
        let blocked_id = blocked.id;
        assert!(graph.add_task(satisfied, &index));
        assert!(!graph.add_task(blocked, &index));

        index.remove(&oid(1));
        let regressed = graph.object_removed(oid(1));
        assert_eq!(regressed, vec![satisfied_id]);
        assert!(graph.reverse().get(&oid(1)).unwrap().contains(&blocked_id));
        assert_eq!(graph.entry(&blocked_id).unwrap().remaining.len(), 2);
    }
}
