//! Per-thread execution context.
//!
//! A thread running an actor carries an [`ActorContext`]; I/O and timers consult it to decide
//! whether to suspend the current task (evented mode) or block the thread (blocking mode).
//! Blocking mode keeps its own stack of deadlines so that [`timeout`](crate::timeout) can bound
//! a thread-blocking wait.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use crate::reactor::Reactor;
use crate::task::TaskFuture;
use crate::time::Timers;

/// State shared by every task of one actor.
pub(crate) struct ActorContext {
    pub name: Arc<str>,
    pub reactor: Arc<Reactor>,
    pub timers: RefCell<Timers>,
    spawned: RefCell<Vec<TaskFuture>>,
}

impl ActorContext {
    pub fn new(name: Arc<str>, reactor: Arc<Reactor>) -> Self {
        Self { name, reactor, timers: RefCell::new(Timers::default()), spawned: RefCell::new(Vec::new()) }
    }

    /// Queues a task; the executor picks it up after the current poll.
    pub fn spawn(&self, future: TaskFuture) {
        self.spawned.borrow_mut().push(future);
    }

    pub fn take_spawned(&self) -> Vec<TaskFuture> {
        std::mem::take(&mut *self.spawned.borrow_mut())
    }
}

thread_local! {
    static CURRENT: RefCell<Option<Rc<ActorContext>>> = const { RefCell::new(None) };
    static DEADLINES: RefCell<Vec<Instant>> = const { RefCell::new(Vec::new()) };
    static WAKE_HINT: Cell<Option<Instant>> = const { Cell::new(None) };
}

/// Whether the calling code runs in evented mode, i.e. inside an actor.
///
/// Inside [`block_on`](crate::block_on) this is `false` even on an actor thread.
pub fn evented() -> bool {
    CURRENT.with(|c| c.borrow().is_some())
}

/// Name of the actor the calling code runs in, if any.
pub fn current_actor_name() -> Option<String> {
    current().map(|ctx| ctx.name.to_string())
}

pub(crate) fn current() -> Option<Rc<ActorContext>> {
    CURRENT.with(|c| c.borrow().clone())
}

/// Restores the previous context on drop.
pub(crate) struct EnterGuard {
    previous: Option<Rc<ActorContext>>,
}

impl Drop for EnterGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|c| *c.borrow_mut() = previous);
    }
}

/// Makes `ctx` the current context until the guard drops.
pub(crate) fn enter(ctx: Rc<ActorContext>) -> EnterGuard {
    let previous = CURRENT.with(|c| c.borrow_mut().replace(ctx));
    EnterGuard { previous }
}

/// Switches the thread to blocking mode until the guard drops.
pub(crate) fn suspend() -> EnterGuard {
    let previous = CURRENT.with(|c| c.borrow_mut().take());
    EnterGuard { previous }
}

/// Pops the deadline pushed by [`push_deadline`] on drop.
pub(crate) struct DeadlineGuard(());

impl Drop for DeadlineGuard {
    fn drop(&mut self) {
        DEADLINES.with(|d| {
            d.borrow_mut().pop();
        });
    }
}

pub(crate) fn push_deadline(deadline: Instant) -> DeadlineGuard {
    DEADLINES.with(|d| d.borrow_mut().push(deadline));
    DeadlineGuard(())
}

/// Earliest deadline bounding blocking waits on this thread.
pub(crate) fn blocking_deadline() -> Option<Instant> {
    DEADLINES.with(|d| d.borrow().iter().min().copied())
}

/// Records the earliest instant at which [`block_on`](crate::block_on) must poll again.
pub(crate) fn note_wake_hint(at: Instant) {
    WAKE_HINT.with(|h| {
        let next = match h.get() {
            Some(current) if current <= at => current,
            _ => at,
        };
        h.set(Some(next));
    });
}

pub(crate) fn take_wake_hint() -> Option<Instant> {
    WAKE_HINT.with(Cell::take)
}
