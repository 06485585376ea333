//! Readiness waits that follow the caller's execution mode.
//!
//! Every socket in this crate owns its descriptor through an [`IoSource`]. Operations are always
//! attempted on a non-blocking descriptor first; when the OS reports `WouldBlock` the source waits
//! for readiness:
//!
//! - **evented**: the descriptor is (re)armed on the current actor's reactor and the task is
//!   suspended until the reactor wakes it,
//! - **blocking**: the descriptor is registered with a private per-thread selector and the thread
//!   blocks until readiness or the innermost [`timeout`](crate::timeout) deadline.

use std::cell::RefCell;
use std::future::poll_fn;
use std::io;
use std::os::fd::{AsFd, AsRawFd, RawFd};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use metrics::counter;
use mio::unix::SourceFd;
use mio::{Events, Interest, Token};

use crate::context;
use crate::error::Result;
use crate::reactor::Reactor;

thread_local! {
    static SELECTOR: RefCell<Option<mio::Poll>> = const { RefCell::new(None) };
}

const SELECTOR_TOKEN: Token = Token(0);

/// Outcome of a blocking-mode wait.
enum Waited {
    Ready,
    DeadlineElapsed,
}

struct Registration {
    reactor: Arc<Reactor>,
    token: Token,
}

/// A non-blocking descriptor plus its current reactor registration.
pub(crate) struct IoSource<T: AsRawFd> {
    io: T,
    registration: Option<Registration>,
}

impl<T: AsRawFd> IoSource<T> {
    pub fn new(io: T) -> Self {
        Self { io, registration: None }
    }

    pub fn get_ref(&self) -> &T {
        &self.io
    }

    /// Runs `op` until it stops reporting `WouldBlock`, waiting for `interest` in between.
    ///
    /// Returns `Pending` in evented mode after arming the reactor, and in blocking mode when an
    /// enclosing timeout deadline elapsed before the descriptor became ready.
    pub fn poll_io<R>(
        &mut self,
        cx: &mut Context<'_>,
        interest: Interest,
        mut op: impl FnMut(&T) -> io::Result<R>,
    ) -> Poll<Result<R>> {
        loop {
            match op(&self.io) {
                Ok(value) => return Poll::Ready(Ok(value)),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Poll::Ready(Err(e.into())),
            }

            match context::current() {
                Some(ctx) => {
                    if let Err(e) = self.arm(&ctx.reactor, interest, cx) {
                        return Poll::Ready(Err(e.into()));
                    }
                    counter!("cellio_io_waits_total", "mode" => "evented").increment(1);
                    return Poll::Pending;
                }
                None => {
                    counter!("cellio_io_waits_total", "mode" => "blocking").increment(1);
                    match self.block_until(interest) {
                        Ok(Waited::Ready) => continue,
                        Ok(Waited::DeadlineElapsed) => return Poll::Pending,
                        Err(e) => return Poll::Ready(Err(e.into())),
                    }
                }
            }
        }
    }

    /// Parks the task's waker on the reactor and arms the descriptor for `interest`.
    fn arm(&mut self, reactor: &Arc<Reactor>, interest: Interest, cx: &Context<'_>) -> io::Result<()> {
        let fd = self.io.as_raw_fd();

        if let Some(registration) = &self.registration {
            if registration.reactor.id() == reactor.id() {
                reactor.add_waker(registration.token, cx.waker());
                return reactor.reregister(fd, registration.token, interest);
            }
        }

        // Registered with another actor's reactor (or not at all)
        self.deregister();
        let token = reactor.register(fd, interest)?;
        reactor.add_waker(token, cx.waker());
        self.registration = Some(Registration { reactor: reactor.clone(), token });
        Ok(())
    }

    /// Blocks the thread until the descriptor is ready or the blocking deadline passes.
    fn block_until(&mut self, interest: Interest) -> io::Result<Waited> {
        self.deregister();
        let fd = self.io.as_raw_fd();

        let deadline = context::blocking_deadline();
        let timeout = deadline.map(|d| d.saturating_duration_since(Instant::now()));
        if timeout == Some(Duration::ZERO) {
            return Ok(Waited::DeadlineElapsed);
        }

        SELECTOR.with(|cell| {
            let mut slot = cell.borrow_mut();
            if slot.is_none() {
                *slot = Some(mio::Poll::new()?);
            }
            match slot.as_mut() {
                Some(poll) => wait_on_selector(poll, fd, interest, timeout),
                None => Err(io::Error::other("blocking selector unavailable")),
            }
        })
    }

    fn deregister(&mut self) {
        if let Some(Registration { reactor, token }) = self.registration.take() {
            if let Err(e) = reactor.deregister(self.io.as_raw_fd(), token) {
                tracing::trace!(fd = self.io.as_raw_fd(), "deregister failed: {e}");
            }
        }
    }
}

impl<T: AsRawFd> Drop for IoSource<T> {
    fn drop(&mut self) {
        self.deregister();
    }
}

fn wait_on_selector(
    poll: &mut mio::Poll,
    fd: RawFd,
    interest: Interest,
    timeout: Option<Duration>,
) -> io::Result<Waited> {
    let mut events = Events::with_capacity(1);
    poll.registry().register(&mut SourceFd(&fd), SELECTOR_TOKEN, interest)?;

    let polled = loop {
        match poll.poll(&mut events, timeout) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => break other,
        }
    };
    let deregistered = poll.registry().deregister(&mut SourceFd(&fd));

    polled?;
    deregistered?;
    if events.is_empty() { Ok(Waited::DeadlineElapsed) } else { Ok(Waited::Ready) }
}

/// Waits until `io` is readable.
///
/// Like `select(2)` this may return spuriously; callers retry their operation.
pub async fn wait_readable(io: &impl AsFd) -> Result<()> {
    wait_for(io, Interest::READABLE).await
}

/// Waits until `io` is writable.
///
/// Like `select(2)` this may return spuriously; callers retry their operation.
pub async fn wait_writable(io: &impl AsFd) -> Result<()> {
    wait_for(io, Interest::WRITABLE).await
}

async fn wait_for(io: &impl AsFd, interest: Interest) -> Result<()> {
    let mut source = IoSource::new(io.as_fd());
    let mut waited = false;
    poll_fn(|cx| {
        source.poll_io(cx, interest, |_| {
            if waited {
                Ok(())
            } else {
                waited = true;
                Err(io::ErrorKind::WouldBlock.into())
            }
        })
    })
    .await
}
