//! The runtime owning configuration and actors.
//!
//! The runtime spawns actors, each with its own executor thread and reactor, and drives plain
//! futures on the calling thread through [`block_on`]. Tasks reach their actor's executor and
//! reactor through thread-local storage, see [`crate::context`].

use std::future::Future;
use std::pin::pin;
use std::sync::{Mutex, PoisonError};
use std::task::{Context, Poll};
use std::thread;
use std::time::Instant;

use crate::actor::Actor;
use crate::config::Config;
use crate::context;
use crate::error::{Error, Result};

/// Name of the actor [`Runtime::run`] executes its closure on.
pub const MAIN_ACTOR: &str = "main";

/// The actor system: configuration plus the actors spawned through it.
pub struct Runtime {
    config: Config,
    actors: Mutex<Vec<Actor>>,
}

impl Runtime {
    /// Creates a runtime.
    ///
    /// If `config.metrics_addr` is set, a Prometheus exporter is installed and served on that
    /// address. Only one exporter can be installed per process.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let runtime = Runtime::new(Config::from_env()?)?;
    /// let greeting = runtime.run(|| async { "ohai" })?;
    /// ```
    pub fn new(config: Config) -> Result<Self> {
        if let Some(addr) = config.metrics_addr {
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .with_http_listener(addr)
                .install()
                .map_err(|e| Error::Metrics(e.to_string()))?;
            tracing::info!(%addr, "metrics enabled at http://{addr}/metrics");
        }

        Ok(Self { config, actors: Mutex::new(Vec::new()) })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Spawns a new actor on its own thread.
    pub fn spawn_actor(&self, name: impl Into<String>) -> Result<Actor> {
        let actor = Actor::spawn(name, &self.config)?;
        tracing::debug!(actor = actor.name(), "spawned actor");

        let mut actors = self.actors.lock().unwrap_or_else(PoisonError::into_inner);
        actors.retain(Actor::is_alive);
        actors.push(actor.clone());
        Ok(actor)
    }

    /// Runs `f()` inside a fresh [`MAIN_ACTOR`] and returns its value once the actor is stopped.
    pub fn run<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + 'static,
        T: Send + 'static,
    {
        let actor = self.spawn_actor(MAIN_ACTOR)?;
        let output = actor.call(f);
        if let Err(e) = actor.terminate() {
            tracing::warn!(actor = actor.name(), "failed to stop: {e}");
        }
        output
    }

    /// Drives `future` to completion on the current thread. See [`block_on`].
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        block_on(future)
    }

    /// Terminates every actor still alive, waiting up to the shutdown timeout for each.
    pub fn shutdown(&self) {
        let actors = std::mem::take(&mut *self.actors.lock().unwrap_or_else(PoisonError::into_inner));
        for actor in actors.iter().filter(|a| a.is_alive()) {
            if let Err(e) = actor.terminate() {
                tracing::warn!(actor = actor.name(), "shutdown: {e}");
            }
        }
        tracing::debug!(actors = actors.len(), "runtime shut down");
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Spawns a task on the current actor.
///
/// The future does not need to be `Send`: it never leaves the actor's thread.
///
/// # Errors
///
/// Returns [`Error::NotInActor`] when called outside of an actor (or inside [`block_on`]).
///
/// # Examples
///
/// ```ignore
/// actor.call(|| async {
///     cellio::spawn(async { println!("running beside the caller") })?;
///     Ok::<_, cellio::Error>(())
/// })?;
/// ```
pub fn spawn<F>(future: F) -> Result<()>
where
    F: Future<Output = ()> + 'static,
{
    let ctx = context::current().ok_or(Error::NotInActor)?;
    ctx.spawn(Box::pin(future));
    Ok(())
}

/// Blocks the current thread until the given future completes.
///
/// The future runs in blocking mode: socket operations block the thread rather than suspending
/// a task. Called on an actor thread this stalls every other task of that actor until the future
/// completes, and [`evented`](crate::evented) reports `false` meanwhile.
///
/// # Examples
///
/// ```ignore
/// let mut socket = cellio::block_on(TcpSocket::connect("127.0.0.1:12345"))?;
/// ```
pub fn block_on<F: Future>(future: F) -> F::Output {
    let _blocking = context::suspend();
    let mut future = pin!(future);

    let waker = crate::waker::unpark_waker(thread::current());
    let mut cx = Context::from_waker(&waker);

    loop {
        if let Poll::Ready(output) = future.as_mut().poll(&mut cx) {
            return output;
        }
        match context::take_wake_hint() {
            Some(at) => thread::park_timeout(at.saturating_duration_since(Instant::now())),
            None => thread::park(),
        }
    }
}
