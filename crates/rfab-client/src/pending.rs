use std::{
    collections::HashMap,
    sync::{Condvar, Mutex},
    time::Instant,
};

use rfab_wire::{Reply, Value};

/// One completed task's outcome (spec.md §3 "Pending task" slot: `(error,
/// result, traceback)` collapsed to one of the two cases that are ever
/// actually populated).
pub(crate) enum Outcome {
    Ok(Value),
    Err(Value, String),
}

pub(crate) fn outcome_of(reply: Reply) -> Outcome {
    match (reply.error, reply.result) {
        (Some(error), _) => Outcome::Err(error, reply.traceback.unwrap_or_default()),
        (None, Some(result)) => Outcome::Ok(result),
        // CLOSE's ack carries neither slot (spec.md §6): a completed,
        // dataless task.
        (None, None) => Outcome::Ok(Value::Null),
    }
}

/// The client-side pending-task table (spec.md §3, §4.6): `task_id →
/// slot`, plus the condition variable that fans out fulfilment to any
/// `Task::wait` that lost the race for the receive mutex.
///
/// spec.md describes the map as mutated "under whichever mutex the
/// operation needs (send mutex for inserts; receive mutex for
/// fulfilment)" — sharing one resource under two different locks is not
/// expressible safely in Rust, so this table carries its own internal
/// `Mutex` instead. The send/receive mutex discipline described in
/// spec.md §4.6/§5 is preserved for the actual transport I/O (see
/// `Session`); only bookkeeping of this map gets its own short-lived lock.
///
/// The condition variable is tied to that same `tasks` mutex (not a
/// separate gate mutex): a waiter that loses the check-then-wait race
/// would otherwise sleep through a fulfilment that lands between the
/// check and the wait. `wait_for_fill` holds `tasks` across both the
/// predicate check and the `Condvar::wait` call so the two are atomic.
#[derive(Default)]
pub(crate) struct Pending {
    tasks: Mutex<HashMap<u64, Option<Outcome>>>,
    cond: Condvar,
}

impl Pending {
    pub(crate) fn insert(&self, task_id: u64) {
        self.tasks.lock().unwrap().insert(task_id, None);
    }

    /// Removes the entry unconditionally — used by `Task::drop` (spec.md
    /// §3: "destroyed when the waiter consumes it, or dropped silently if
    /// the owning handle is discarded").
    pub(crate) fn remove(&self, task_id: u64) -> Option<Option<Outcome>> {
        self.tasks.lock().unwrap().remove(&task_id)
    }

    /// Fills a pending slot and wakes every waiter. Returns the outcome
    /// back if `task_id` is unknown, so the caller can treat it as an
    /// orphan reply (spec.md §3: "every reply received carries an id
    /// that is either pending (fulfilled) or unknown").
    pub(crate) fn fulfil(&self, task_id: u64, outcome: Outcome) -> Option<Outcome> {
        let mut map = self.tasks.lock().unwrap();
        let Some(slot) = map.get_mut(&task_id) else {
            return Some(outcome);
        };
        *slot = Some(outcome);
        self.cond.notify_all();
        None
    }

    /// Takes the outcome out (and forgets the entry) if it has been
    /// filled; `None` if still pending.
    pub(crate) fn take_if_filled(&self, task_id: u64) -> Option<Outcome> {
        let mut map = self.tasks.lock().unwrap();
        match map.get(&task_id) {
            Some(Some(_)) => map.remove(&task_id).flatten(),
            _ => None,
        }
    }

    /// Non-destructive check of whether a slot has been filled yet
    /// (spec.md §8 scenario 2 `t.available()`).
    pub(crate) fn is_filled(&self, task_id: u64) -> bool {
        matches!(self.tasks.lock().unwrap().get(&task_id), Some(Some(_)))
    }

    /// Blocks until `task_id`'s slot is filled (or the entry is gone
    /// entirely), or `deadline` passes. The predicate check and the
    /// `Condvar::wait` happen under the same `tasks` lock, so a fulfilment
    /// that happens concurrently can never be missed between them — this
    /// is the fallback `Task::wait_mut` takes when it lost the race for
    /// the receive mutex (spec.md §4.6 `Task.wait`).
    pub(crate) fn wait_for_fill(&self, task_id: u64, deadline: Option<Instant>) {
        let mut map = self.tasks.lock().unwrap();
        loop {
            match map.get(&task_id) {
                Some(None) => {}
                _ => return,
            }
            map = match deadline {
                Some(dl) => {
                    let now = Instant::now();
                    if now >= dl {
                        return;
                    }
                    let (guard, _timed_out) = self.cond.wait_timeout(map, dl - now).unwrap();
                    guard
                }
                None => self.cond.wait(map).unwrap(),
            };
        }
    }
}
