//! Wakers for actor tasks and for [`block_on`](crate::block_on).
//!
//! When a task is waiting on I/O or a timer, its waker is what tells the owning scheduler that the
//! task may progress and should be polled again.

use crossbeam_queue::SegQueue;
use std::sync::Arc;
use std::task::{Wake, Waker};
use std::thread::Thread;

use crate::task::TaskId;

/* --- 1. TASK WAKER (for actor tasks) --- */

/// Pushes the task back onto its actor's run queue and interrupts the actor's reactor turn.
///
/// The interrupt is needed because the wake may come from another thread while the actor is
/// blocked in `Poll::poll`.
pub(crate) struct TaskWaker {
    id: TaskId,
    ready: Arc<SegQueue<TaskId>>,
    notify: Arc<mio::Waker>,
}

impl TaskWaker {
    pub fn waker(id: TaskId, ready: Arc<SegQueue<TaskId>>, notify: Arc<mio::Waker>) -> Waker {
        Waker::from(Arc::new(Self { id, ready, notify }))
    }
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.ready.push(self.id);
        if let Err(e) = self.notify.wake() {
            tracing::warn!(task = self.id.0, "failed to interrupt actor reactor: {e}");
        }
    }
}

/* --- 2. UNPARK WAKER (for block_on) --- */

struct UnparkWaker(Thread);

impl Wake for UnparkWaker {
    fn wake(self: Arc<Self>) {
        self.0.unpark();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.0.unpark();
    }
}

/// Creates a waker that unparks a specific thread.
pub(crate) fn unpark_waker(thread: Thread) -> Waker {
    Waker::from(Arc::new(UnparkWaker(thread)))
}
