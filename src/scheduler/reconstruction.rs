use std::time::Duration;

use futures::future;
use futures::Future;

use common::id::ObjectId;
use errors::Error;
use table::{with_retries, TaskStatus};
use super::state::StateRef;

const TABLE_RETRY_ATTEMPTS: u32 = 3;
const TABLE_RETRY_DELAY: Duration = Duration::from_millis(100);

impl StateRef {
    /// Decide whether the task producing `object_id` must be re-executed
    /// and, if so, re-submit it locally. The decision is a chain of table
    /// lookups whose only authoritative step is the final conditional
    /// status update: everything before it is a snapshot that concurrent
    /// managers and schedulers may invalidate. Whatever happens, at most
    /// one re-submission comes out of any number of concurrent requests
    /// for the same object.
    pub fn reconstruct_object(&self, object_id: ObjectId) -> Box<Future<Item = (), Error = Error>> {
        {
            let mut state = self.get_mut();
            if !state.pending_reconstructions.insert(object_id) {
                debug!("reconstruction of {} already in flight", object_id);
                return Box::new(future::ok(()));
            }
        }
        let state = self.clone();
        Box::new(self.reconstruct_decision(object_id).then(move |result| {
            state.get_mut().pending_reconstructions.remove(&object_id);
            result
        }))
    }

    fn reconstruct_decision(
        &self,
        object_id: ObjectId,
    ) -> Box<Future<Item = (), Error = Error>> {
        let state = self.clone();
        let (task_table, object_table, timer) = {
            let inner = self.get();
            (
                inner.task_table.clone(),
                inner.object_table.clone(),
                inner.timer.clone(),
            )
        };

        let locations = {
            let object_table = object_table.clone();
            with_retries(&timer, TABLE_RETRY_ATTEMPTS, TABLE_RETRY_DELAY, move || {
                object_table.lookup(object_id)
            })
        };

        Box::new(locations.and_then(move |locations| -> Box<Future<Item = (), Error = Error>> {
            // A live copy anywhere in the cluster means nothing to rebuild.
            if !locations.is_empty() {
                debug!(
                    "object {} has {} live locations, reconstruction suppressed",
                    object_id,
                    locations.len()
                );
                return Box::new(future::ok(()));
            }
            let task_id = object_id.producing_task();
            let fetch = {
                let task_table = task_table.clone();
                with_retries(&timer, TABLE_RETRY_ATTEMPTS, TABLE_RETRY_DELAY, move || {
                    task_table.get_task(task_id)
                })
            };
            Box::new(fetch.and_then(move |record| -> Box<Future<Item = (), Error = Error>> {
                let record = match record {
                    Some(record) => record,
                    None => {
                        warn!(
                            "object {} has no producing task {} on record",
                            object_id, task_id
                        );
                        return Box::new(future::ok(()));
                    }
                };
                match record.status {
                    TaskStatus::Waiting | TaskStatus::Scheduled | TaskStatus::Running => {
                        debug!(
                            "task {} is already {:?}, reconstruction of {} suppressed",
                            task_id, record.status, object_id
                        );
                        return Box::new(future::ok(()));
                    }
                    TaskStatus::Done | TaskStatus::Lost => {}
                }
                // The object may have reappeared while the lookups were in
                // flight; the availability handler clears our entry.
                if !state.get().pending_reconstructions.contains(&object_id) {
                    debug!(
                        "object {} reappeared during lookup, reconstruction aborted",
                        object_id
                    );
                    return Box::new(future::ok(()));
                }
                // The authoritative step: whoever wins this swap owns the
                // re-execution. Losing it means another node raced us.
                let claim = task_table.test_and_update_status(
                    task_id,
                    &[TaskStatus::Done, TaskStatus::Lost],
                    TaskStatus::Scheduled,
                );
                Box::new(claim.and_then(move |claimed| -> Box<Future<Item = (), Error = Error>> {
                    if !claimed {
                        debug!(
                            "another scheduler claimed task {}, reconstruction of {} suppressed",
                            task_id, object_id
                        );
                        return Box::new(future::ok(()));
                    }
                    info!("re-submitting task {} to rebuild object {}", task_id, object_id);
                    state.get_mut().handle_task_submitted(record.spec.clone());
                    // Walk the lineage eagerly: the re-submitted task may
                    // well consume objects that were lost with this one.
                    let mut inputs = record.spec.args.clone();
                    inputs.sort();
                    inputs.dedup();
                    let rebuilds: Vec<_> = inputs
                        .into_iter()
                        .map(|input| state.reconstruct_object(input))
                        .collect();
                    Box::new(future::join_all(rebuilds).map(|_| ()))
                }))
            }))
        }))
    }
}
