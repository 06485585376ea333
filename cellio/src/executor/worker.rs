//! The thread behind an actor.
//!
//! The worker alternates between three sources of work:
//! 1. Envelopes from the actor's mailbox, each becoming a new task
//! 2. Tasks in the executor's ready queue
//! 3. A reactor turn, bounded by the next timer deadline, that wakes tasks whose sockets became
//!    ready, followed by firing expired timers
//!
//! When nothing is runnable the thread blocks inside the reactor turn; the mailbox waker and
//! cross-thread task wakes interrupt it.

use crossbeam_channel::Sender;
use metrics::gauge;
use mio::{Events, Poll};
use std::io;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::task::Waker;
use std::thread;
use std::time::{Duration, Instant};

use crate::actor::{ActorShared, Envelope};
use crate::context::{self, ActorContext};
use crate::executor::{Executor, TaskPanic};
use crate::reactor::Reactor;

/// Why the worker loop stopped.
enum Exit {
    Terminated,
    Crashed(TaskPanic),
    ReactorFailed(io::Error),
}

enum Flow {
    Continue,
    Terminate,
}

pub(crate) struct Worker {
    shared: Arc<ActorShared>,
    poll: Poll,
    ctx: Rc<ActorContext>,
    executor: Executor,
    event_capacity: usize,
    /// Dropped when the worker exits, which disconnects every waiter on the actor's exit.
    _exited: Sender<()>,
}

impl Worker {
    /// Starts the actor thread.
    ///
    /// The executor and the context hold `!Send` task futures, so they are built on the new
    /// thread; only the reactor, the poll and the shared handle cross over.
    pub fn start(
        shared: Arc<ActorShared>,
        reactor: Arc<Reactor>,
        poll: Poll,
        event_capacity: usize,
        exited: Sender<()>,
    ) -> io::Result<thread::JoinHandle<()>> {
        let builder = thread::Builder::new().name(format!("actor-{}", shared.name));
        builder.spawn(move || {
            let ctx = Rc::new(ActorContext::new(shared.name.clone(), reactor));
            let executor = Executor::new(shared.notify.clone());
            let worker = Worker { shared, poll, ctx, executor, event_capacity, _exited: exited };
            worker.run();
        })
    }

    fn run(mut self) {
        let _enter = context::enter(self.ctx.clone());
        let mut events = Events::with_capacity(self.event_capacity);
        tracing::debug!(actor = %self.shared.name, "actor started");

        let exit = loop {
            if let Flow::Terminate = self.drain_mailbox() {
                break Exit::Terminated;
            }

            if let Err(panic) = self.executor.run_ready(&self.ctx) {
                break Exit::Crashed(panic);
            }

            let timeout = if self.executor.has_ready() || !self.shared.mailbox.is_empty() {
                Some(Duration::ZERO)
            } else {
                self.ctx.timers.borrow().poll_timeout(Instant::now())
            };

            if let Err(e) = self.poll.poll(&mut events, timeout) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                break Exit::ReactorFailed(e);
            }

            self.ctx.reactor.dispatch(&events);

            let due = self.ctx.timers.borrow_mut().take_expired(Instant::now());
            due.into_iter().for_each(Waker::wake);
        };

        self.finish(exit);
    }

    fn drain_mailbox(&mut self) -> Flow {
        while let Some(envelope) = self.shared.mailbox.pop() {
            match envelope {
                Envelope::Task(make) => {
                    self.executor.spawn(make());
                }
                Envelope::Terminate => return Flow::Terminate,
            }
        }
        Flow::Continue
    }

    fn finish(mut self, exit: Exit) {
        let name = self.shared.name.clone();
        self.shared.alive.store(false, Ordering::Release);
        gauge!("cellio_actors_alive").decrement(1.0);

        match exit {
            Exit::Terminated => {
                tracing::debug!(actor = %name, tasks = self.executor.len(), "actor terminated");
            }
            Exit::Crashed(panic) => {
                tracing::error!(actor = %name, reason = %panic.reason, "actor crashed");
                self.shared.record_exit_reason(panic.reason);
                drop(panic.task);
            }
            Exit::ReactorFailed(e) => {
                tracing::error!(actor = %name, "reactor poll failed: {e}");
                self.shared.record_exit_reason(format!("reactor poll failed: {e}"));
            }
        }

        self.executor.clear();
        // Undelivered envelopes drop their reply channels here
        while self.shared.mailbox.pop().is_some() {}
    }
}
