use futures::future::LocalBoxFuture;
use std::task::{Context, Poll, Waker};

/// A pinned, heap-allocated future that produces no output.
///
/// Actor tasks never leave their actor's thread, so the future does not need to be `Send`.
pub(crate) type TaskFuture = LocalBoxFuture<'static, ()>;

/// Identifies a task within its actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct TaskId(pub usize);

/// A task owned by an actor's executor.
pub(crate) struct Task {
    pub id: TaskId,
    future: TaskFuture,
    /// Created once at spawn and reused for every poll.
    waker: Waker,
}

impl Task {
    pub fn new(id: TaskId, future: TaskFuture, waker: Waker) -> Self {
        Self { id, future, waker }
    }

    /// Polls the task's future once with its own waker.
    pub fn poll(&mut self) -> Poll<()> {
        let mut cx = Context::from_waker(&self.waker);
        self.future.as_mut().poll(&mut cx)
    }
}
