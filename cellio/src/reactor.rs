use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Registry, Token};
use std::collections::HashMap;
use std::io;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::Waker;

/// Token reserved for the actor's mailbox waker.
pub(crate) const MAILBOX: Token = Token(0);

static NEXT_REACTOR_ID: AtomicUsize = AtomicUsize::new(1);

/// Manages I/O readiness events for the tasks of one actor.
///
/// The reactor uses system-level event notification (epoll on Linux, kqueue on BSD/macOS)
/// to detect when sockets become ready and notify waiting tasks through their wakers.
///
/// # Architecture
///
/// - **Registry**: where sockets are registered, edge-triggered, under a reactor-local token
/// - **Wakers Map**: maps event tokens to the waker of the task parked on that socket
/// - **Poll**: owned by the actor thread, which turns it whenever no task is runnable
///
/// The registry and the wakers map are shared so that a socket dropped or moved on another
/// thread can still deregister itself.
pub(crate) struct Reactor {
    id: usize,
    registry: Registry,
    wakers: Mutex<HashMap<Token, Waker>>,
    next_token: AtomicUsize,
}

impl Reactor {
    /// Creates a new reactor with a poll instance.
    ///
    /// Returns the shared reactor and the `Poll` the owning actor thread will turn.
    pub fn new() -> io::Result<(Arc<Self>, Poll)> {
        let poll = Poll::new()?;
        let registry = poll.registry().try_clone()?;
        let reactor = Arc::new(Self {
            id: NEXT_REACTOR_ID.fetch_add(1, Ordering::Relaxed),
            registry,
            wakers: Mutex::new(HashMap::new()),
            // Token 0 belongs to the mailbox
            next_token: AtomicUsize::new(1),
        });

        Ok((reactor, poll))
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Registers `fd` under a fresh token.
    pub fn register(&self, fd: RawFd, interest: Interest) -> io::Result<Token> {
        let token = Token(self.next_token.fetch_add(1, Ordering::Relaxed));
        self.registry.register(&mut SourceFd(&fd), token, interest)?;
        Ok(token)
    }

    /// Re-arms an existing registration. The OS reports the source again if it is already ready.
    pub fn reregister(&self, fd: RawFd, token: Token, interest: Interest) -> io::Result<()> {
        self.registry.reregister(&mut SourceFd(&fd), token, interest)
    }

    pub fn deregister(&self, fd: RawFd, token: Token) -> io::Result<()> {
        self.lock_wakers().remove(&token);
        self.registry.deregister(&mut SourceFd(&fd))
    }

    /// Associates a waker with a token for the next event on it.
    pub fn add_waker(&self, token: Token, waker: &Waker) {
        let mut wakers = self.lock_wakers();
        match wakers.get_mut(&token) {
            Some(existing) if existing.will_wake(waker) => {}
            Some(existing) => existing.clone_from(waker),
            None => {
                wakers.insert(token, waker.clone());
            }
        }
    }

    /// Wakes the task parked on each token that reported an event.
    ///
    /// Returns the number of tasks woken.
    pub fn dispatch(&self, events: &Events) -> usize {
        let mut woken = Vec::new();
        {
            let mut wakers = self.lock_wakers();
            for event in events {
                let token = event.token();
                if token == MAILBOX {
                    continue;
                }
                if let Some(waker) = wakers.remove(&token) {
                    woken.push(waker);
                }
            }
        }

        let count = woken.len();
        for waker in woken {
            waker.wake();
        }
        count
    }

    fn lock_wakers(&self) -> std::sync::MutexGuard<'_, HashMap<Token, Waker>> {
        self.wakers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
