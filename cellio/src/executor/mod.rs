//! The cooperative task scheduler of an actor.
//!
//! Every actor runs one [`Executor`] on its own thread. Tasks are polled one at a time; a task
//! that waits on a socket or a timer returns `Pending` and the next runnable task gets the thread.
//! [`worker`] owns the thread and interleaves executor passes with reactor turns.

pub(crate) mod worker;

use crossbeam_queue::SegQueue;
use metrics::{counter, gauge};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::task::Poll;

use crate::context::ActorContext;
use crate::error::panic_message;
use crate::task::{Task, TaskFuture, TaskId};
use crate::waker::TaskWaker;

/// A task that panicked while being polled.
///
/// The task is kept alive until the owner has recorded the panic, so that callers waiting on the
/// task observe the crash reason rather than a bare disconnect.
pub(crate) struct TaskPanic {
    pub reason: String,
    pub task: Task,
}

pub(crate) struct Executor {
    tasks: HashMap<TaskId, Task>,
    /// Ids of tasks that were woken, pushed by [`TaskWaker`] from any thread.
    ready: Arc<SegQueue<TaskId>>,
    notify: Arc<mio::Waker>,
    next_id: usize,
}

impl Executor {
    pub fn new(notify: Arc<mio::Waker>) -> Self {
        Self { tasks: HashMap::new(), ready: Arc::new(SegQueue::new()), notify, next_id: 0 }
    }

    pub fn spawn(&mut self, future: TaskFuture) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;

        let waker = TaskWaker::waker(id, self.ready.clone(), self.notify.clone());
        self.tasks.insert(id, Task::new(id, future, waker));
        self.ready.push(id);

        counter!("cellio_tasks_spawned_total").increment(1);
        gauge!("cellio_tasks_pending_current").increment(1.0);
        id
    }

    pub fn has_ready(&self) -> bool {
        !self.ready.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Polls every task that was runnable when the pass started.
    ///
    /// Tasks woken during the pass run in the next one, so a task that keeps waking itself cannot
    /// starve the reactor. Tasks spawned from inside a task are adopted after each poll.
    pub fn run_ready(&mut self, ctx: &ActorContext) -> Result<(), TaskPanic> {
        let mut budget = self.ready.len();

        while budget > 0 {
            budget -= 1;
            let Some(id) = self.ready.pop() else { break };
            // Stale wakeups for finished tasks are ignored
            let Some(mut task) = self.tasks.remove(&id) else { continue };

            match panic::catch_unwind(AssertUnwindSafe(|| task.poll())) {
                Ok(Poll::Ready(())) => {
                    gauge!("cellio_tasks_pending_current").decrement(1.0);
                }
                Ok(Poll::Pending) => {
                    self.tasks.insert(id, task);
                }
                Err(payload) => {
                    gauge!("cellio_tasks_pending_current").decrement(1.0);
                    return Err(TaskPanic { reason: panic_message(payload.as_ref()), task });
                }
            }

            for future in ctx.take_spawned() {
                self.spawn(future);
            }
        }

        Ok(())
    }

    /// Drops every task, cancelling whatever they were waiting on.
    pub fn clear(&mut self) {
        let dropped = self.tasks.len();
        self.tasks.clear();
        while self.ready.pop().is_some() {}
        gauge!("cellio_tasks_pending_current").decrement(dropped as f64);
    }
}
