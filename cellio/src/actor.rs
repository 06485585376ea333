//! Actors: one thread, one mailbox, one reactor, many cooperative tasks.
//!
//! Code sent to an actor runs as a task on the actor's thread, in evented mode: sockets and
//! timers suspend the task instead of blocking the thread, so the actor's other tasks keep
//! running.

use crossbeam_channel::{Receiver, RecvTimeoutError, select};
use crossbeam_queue::SegQueue;
use futures::FutureExt;
use metrics::{counter, gauge};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::thread::{self, ThreadId};
use std::time::Duration;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::executor::worker::Worker;
use crate::reactor::{MAILBOX, Reactor};
use crate::task::TaskFuture;

/// A message for the actor thread.
pub(crate) enum Envelope {
    /// Builds the future of a new task. Called on the actor thread.
    Task(Box<dyn FnOnce() -> TaskFuture + Send>),
    Terminate,
}

/// State shared between actor handles and the actor thread.
pub(crate) struct ActorShared {
    pub name: Arc<str>,
    pub mailbox: SegQueue<Envelope>,
    /// Interrupts the actor's reactor turn.
    pub notify: Arc<mio::Waker>,
    pub alive: AtomicBool,
    exit_reason: Mutex<Option<String>>,
    /// Never receives a message; disconnects when the actor thread exits.
    exited: Receiver<()>,
    thread: OnceLock<ThreadId>,
    shutdown_timeout: Duration,
}

impl ActorShared {
    pub fn record_exit_reason(&self, reason: String) {
        *self.exit_reason.lock().unwrap_or_else(PoisonError::into_inner) = Some(reason);
    }

    fn death_error(&self) -> Error {
        let reason = self.exit_reason.lock().unwrap_or_else(PoisonError::into_inner).clone();
        match reason {
            Some(reason) => Error::ActorPanicked { name: self.name.to_string(), reason },
            None => Error::DeadActor { name: self.name.to_string() },
        }
    }
}

/// Handle to a running actor. Cloning the handle does not clone the actor.
#[derive(Clone)]
pub struct Actor {
    shared: Arc<ActorShared>,
}

impl std::fmt::Debug for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Actor").field("name", &self.name()).field("alive", &self.is_alive()).finish()
    }
}

impl Actor {
    pub(crate) fn spawn(name: impl Into<String>, config: &Config) -> Result<Self> {
        let name: Arc<str> = Arc::from(name.into());
        let (reactor, poll) = Reactor::new()?;
        let notify = Arc::new(mio::Waker::new(poll.registry(), MAILBOX)?);
        let (exited_tx, exited_rx) = crossbeam_channel::bounded(0);

        let shared = Arc::new(ActorShared {
            name,
            mailbox: SegQueue::new(),
            notify,
            alive: AtomicBool::new(true),
            exit_reason: Mutex::new(None),
            exited: exited_rx,
            thread: OnceLock::new(),
            shutdown_timeout: config.shutdown_timeout,
        });

        let handle = Worker::start(shared.clone(), reactor, poll, config.event_capacity, exited_tx)?;
        let _ = shared.thread.set(handle.thread().id());

        counter!("cellio_actors_spawned_total").increment(1);
        gauge!("cellio_actors_alive").increment(1.0);

        Ok(Self { shared })
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn is_alive(&self) -> bool {
        self.shared.alive.load(Ordering::Acquire)
    }

    /// Runs `f()` as a task on the actor and blocks the calling thread until it completes.
    ///
    /// Calling an actor from its own thread deadlocks; spawn a task with
    /// [`spawn`](crate::spawn) instead.
    pub fn call<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + 'static,
        T: Send + 'static,
    {
        self.future(f)?.value(None)
    }

    /// Runs `f()` as a task on the actor and returns a handle to its eventual result.
    pub fn future<F, Fut, T>(&self, f: F) -> Result<ActorFuture<T>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.send(Envelope::Task(Box::new(move || {
            async move {
                let value = f().await;
                // The caller may have given up on the result
                let _ = tx.send(value);
            }
            .boxed_local()
        })))?;

        Ok(ActorFuture { rx, shared: self.shared.clone() })
    }

    /// Runs `f()` as a task on the actor without waiting for it.
    pub fn cast<F, Fut>(&self, f: F) -> Result<()>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        self.send(Envelope::Task(Box::new(move || f().boxed_local())))
    }

    /// Stops the actor, dropping its tasks, and waits for its thread to exit.
    ///
    /// Terminating a dead actor succeeds. From the actor's own thread this only requests the stop.
    pub fn terminate(&self) -> Result<()> {
        if self.is_alive() {
            self.shared.mailbox.push(Envelope::Terminate);
            self.shared.notify.wake()?;
        }

        if self.shared.thread.get() == Some(&thread::current().id()) {
            return Ok(());
        }
        self.wait_exit(self.shared.shutdown_timeout)
    }

    fn wait_exit(&self, timeout: Duration) -> Result<()> {
        match self.shared.exited.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => Ok(()),
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(actor = %self.shared.name, ?timeout, "actor did not stop in time");
                Err(Error::ShutdownTimeout { name: self.shared.name.to_string(), timeout })
            }
        }
    }

    fn send(&self, envelope: Envelope) -> Result<()> {
        if !self.is_alive() {
            return Err(Error::DeadActor { name: self.shared.name.to_string() });
        }
        self.shared.mailbox.push(envelope);
        self.shared.notify.wake()?;
        Ok(())
    }
}

/// The eventual result of [`Actor::future`].
#[must_use = "an actor future does nothing unless its value is requested"]
pub struct ActorFuture<T> {
    rx: Receiver<T>,
    shared: Arc<ActorShared>,
}

impl<T> ActorFuture<T> {
    /// Whether the value has arrived.
    pub fn is_ready(&self) -> bool {
        !self.rx.is_empty()
    }

    /// Blocks until the value arrives, the actor dies, or `timeout` elapses.
    pub fn value(self, timeout: Option<Duration>) -> Result<T> {
        let exited = &self.shared.exited;
        let received = match timeout {
            Some(timeout) => select! {
                recv(self.rx) -> value => value.ok(),
                // The value may have been sent just before the actor exited
                recv(exited) -> _ => self.rx.try_recv().ok(),
                default(timeout) => return Err(Error::FutureTimeout(timeout)),
            },
            None => select! {
                recv(self.rx) -> value => value.ok(),
                recv(exited) -> _ => self.rx.try_recv().ok(),
            },
        };

        received.ok_or_else(|| self.shared.death_error())
    }
}
