// SPDX-License-Identifier: Apache-2.0
//! Priority-ordered post-hook side-job queue (§4.6).
//!
//! This is deliberately a separate mechanism from [`crate::mailbox`]: the
//! mailbox serializes the *intent* jobs that drive compute/apply for one
//! execution, while [`HookQueue`] runs best-effort side jobs (telemetry,
//! cache invalidation, downstream notification) that a host wires up
//! alongside it. A hook job that fails is logged and skipped rather than
//! escalated — it never affects the snapshot.

use std::collections::VecDeque;

use intent_core::ErrorValue;
use parking_lot::Mutex;

/// Hook scheduling priority. Higher-priority jobs always drain before
/// lower-priority ones, even if the lower-priority job was enqueued first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    /// Drains before every other priority.
    Immediate,
    /// Drains after `Immediate`, before `Defer`.
    Normal,
    /// Drains last.
    Defer,
}

/// A single side job. Returning `Err` logs and skips the job; it never
/// aborts the queue.
pub type HookJob = Box<dyn FnOnce() -> Result<(), ErrorValue> + Send>;

#[derive(Default)]
struct Queues {
    immediate: VecDeque<HookJob>,
    normal: VecDeque<HookJob>,
    defer: VecDeque<HookJob>,
    draining: bool,
}

/// A priority FIFO queue with a reentrancy guard on [`HookQueue::process_all`].
#[derive(Default)]
pub struct HookQueue {
    inner: Mutex<Queues>,
}

impl HookQueue {
    /// Builds an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues `job` at `priority`, FIFO within that priority.
    pub fn enqueue(&self, priority: Priority, job: HookJob) {
        let mut inner = self.inner.lock();
        match priority {
            Priority::Immediate => inner.immediate.push_back(job),
            Priority::Normal => inner.normal.push_back(job),
            Priority::Defer => inner.defer.push_back(job),
        }
    }

    /// `true` if no jobs are queued across any priority.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let inner = self.inner.lock();
        inner.immediate.is_empty() && inner.normal.is_empty() && inner.defer.is_empty()
    }

    /// Drains every queued job in priority order, FIFO within a priority. A
    /// job enqueued by another job while this call is draining is picked up
    /// within the same call, after the job that enqueued it finishes — it
    /// is not deferred to a later `process_all`.
    ///
    /// Re-entrant calls (a hook job calling `process_all` on its own queue)
    /// collapse: the nested call observes `draining` already set and
    /// returns immediately, leaving the outer call to keep draining.
    pub fn process_all(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.draining {
                return;
            }
            inner.draining = true;
        }
        loop {
            let job = {
                let mut inner = self.inner.lock();
                inner
                    .immediate
                    .pop_front()
                    .or_else(|| inner.normal.pop_front())
                    .or_else(|| inner.defer.pop_front())
            };
            let Some(job) = job else { break };
            if let Err(err) = job() {
                tracing::warn!(%err, "hook job failed; skipped");
            }
        }
        self.inner.lock().draining = false;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex as StdMutex};

    use super::*;

    #[test]
    fn drains_immediate_before_normal_before_defer() {
        let queue = HookQueue::new();
        let order = Arc::new(StdMutex::new(Vec::new()));
        let push = |order: Arc<StdMutex<Vec<&'static str>>>, label: &'static str| -> HookJob {
            Box::new(move || {
                order.lock().unwrap().push(label);
                Ok(())
            })
        };
        queue.enqueue(Priority::Defer, push(order.clone(), "defer"));
        queue.enqueue(Priority::Normal, push(order.clone(), "normal"));
        queue.enqueue(Priority::Immediate, push(order.clone(), "immediate"));
        queue.process_all();
        assert_eq!(*order.lock().unwrap(), vec!["immediate", "normal", "defer"]);
    }

    #[test]
    fn fifo_within_a_priority() {
        let queue = HookQueue::new();
        let order = Arc::new(StdMutex::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            queue.enqueue(
                Priority::Normal,
                Box::new(move || {
                    order.lock().unwrap().push(i);
                    Ok(())
                }),
            );
        }
        queue.process_all();
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn failing_job_is_skipped_without_aborting_the_rest() {
        let queue = HookQueue::new();
        let ran = Arc::new(StdMutex::new(false));
        queue.enqueue(
            Priority::Normal,
            Box::new(|| Err(ErrorValue::new(intent_core::ErrorCode::InternalError, "boom"))),
        );
        let ran2 = ran.clone();
        queue.enqueue(
            Priority::Normal,
            Box::new(move || {
                *ran2.lock().unwrap() = true;
                Ok(())
            }),
        );
        queue.process_all();
        assert!(*ran.lock().unwrap());
    }

    #[test]
    fn reentrant_process_all_collapses() {
        let queue = Arc::new(HookQueue::new());
        let inner_queue = queue.clone();
        let nested_ran = Arc::new(StdMutex::new(false));
        let nested_ran2 = nested_ran.clone();
        queue.enqueue(
            Priority::Normal,
            Box::new(move || {
                // A reentrant call while the outer drain is in progress must
                // not recurse into a second concurrent drain.
                inner_queue.process_all();
                *nested_ran2.lock().unwrap() = true;
                Ok(())
            }),
        );
        queue.process_all();
        assert!(*nested_ran.lock().unwrap());
        assert!(queue.is_empty());
    }
}
