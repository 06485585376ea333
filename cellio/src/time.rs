//! Sleeping and task timeouts.
//!
//! In evented mode both are driven by the actor's timer set, which the actor thread consults to
//! bound each reactor turn. In blocking mode [`sleep`] blocks the thread and [`timeout`] bounds
//! the thread-blocking socket waits made by the wrapped future.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};
use std::thread;
use std::time::{Duration, Instant};

use metrics::counter;

use crate::context::{self, ActorContext};
use crate::error::{Error, Result};

/// Position of one timer in an actor's [`Timers`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct TimerKey {
    deadline: Instant,
    seq: u64,
}

/// Pending timer wakeups of one actor, ordered by deadline.
#[derive(Default)]
pub(crate) struct Timers {
    entries: BTreeMap<TimerKey, Waker>,
    next_seq: u64,
}

impl Timers {
    pub fn insert(&mut self, deadline: Instant, waker: Waker) -> TimerKey {
        let key = TimerKey { deadline, seq: self.next_seq };
        self.next_seq += 1;
        self.entries.insert(key, waker);
        key
    }

    /// Points the timer at `waker`, re-adding it if it already fired.
    pub fn set_waker(&mut self, key: TimerKey, waker: &Waker) {
        match self.entries.get_mut(&key) {
            Some(existing) if existing.will_wake(waker) => {}
            Some(existing) => existing.clone_from(waker),
            None => {
                self.entries.insert(key, waker.clone());
            }
        }
    }

    pub fn remove(&mut self, key: TimerKey) -> bool {
        self.entries.remove(&key).is_some()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.first_key_value().map(|(key, _)| key.deadline)
    }

    /// How long a reactor turn starting at `now` may block.
    pub fn poll_timeout(&self, now: Instant) -> Option<Duration> {
        self.next_deadline().map(|deadline| deadline.saturating_duration_since(now))
    }

    /// Removes every timer due at `now` and returns their wakers.
    ///
    /// Waking is left to the caller so that no borrow of the timer set is held while tasks run.
    pub fn take_expired(&mut self, now: Instant) -> Vec<Waker> {
        let mut due = Vec::new();
        while let Some(entry) = self.entries.first_entry() {
            if entry.key().deadline > now {
                break;
            }
            due.push(entry.remove());
        }
        due
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// A deadline registered with the timer set of one actor.
#[derive(Debug)]
struct ArmedTimer {
    /// Id of the actor's reactor.
    actor: usize,
    key: TimerKey,
}

/// Registers `deadline` on the current actor, or retargets the existing timer at `waker`.
fn arm(slot: &mut Option<ArmedTimer>, ctx: &ActorContext, deadline: Instant, waker: &Waker) {
    let actor = ctx.reactor.id();
    let mut timers = ctx.timers.borrow_mut();
    if let Some(armed) = slot.as_ref().filter(|armed| armed.actor == actor) {
        timers.set_waker(armed.key, waker);
        return;
    }

    // A timer left on another actor fires once there and is ignored
    let key = timers.insert(deadline, waker.clone());
    *slot = Some(ArmedTimer { actor, key });
}

/// Removes the timer from its actor's timer set if the calling thread runs that actor.
fn disarm(slot: &mut Option<ArmedTimer>) {
    let Some(armed) = slot.take() else { return };
    let Some(ctx) = context::current() else { return };
    if ctx.reactor.id() != armed.actor {
        return;
    }
    if let Ok(mut timers) = ctx.timers.try_borrow_mut() {
        timers.remove(armed.key);
    }
}

/// Future returned by [`sleep`].
#[derive(Debug)]
#[must_use = "futures do nothing unless awaited"]
pub struct Sleep {
    deadline: Instant,
    timer: Option<ArmedTimer>,
}

/// Waits for `duration`.
///
/// Inside an actor only the calling task is suspended; elsewhere the thread sleeps, at most until
/// the deadline of an enclosing [`timeout`].
pub fn sleep(duration: Duration) -> Sleep {
    Sleep { deadline: Instant::now() + duration, timer: None }
}

impl Sleep {
    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

impl Future for Sleep {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        let now = Instant::now();
        if now >= this.deadline {
            disarm(&mut this.timer);
            return Poll::Ready(());
        }

        match context::current() {
            Some(ctx) => {
                arm(&mut this.timer, &ctx, this.deadline, cx.waker());
                Poll::Pending
            }
            None => {
                let wake_at = match context::blocking_deadline() {
                    Some(limit) if limit < this.deadline => limit,
                    _ => this.deadline,
                };
                thread::sleep(wake_at.saturating_duration_since(now));
                // Cut short by a timeout, which reports the expiry
                if wake_at < this.deadline { Poll::Pending } else { Poll::Ready(()) }
            }
        }
    }
}

impl Drop for Sleep {
    fn drop(&mut self) {
        disarm(&mut self.timer);
    }
}

/// Future returned by [`timeout`].
#[must_use = "futures do nothing unless awaited"]
pub struct Timeout<F> {
    future: Pin<Box<F>>,
    duration: Duration,
    deadline: Instant,
    timer: Option<ArmedTimer>,
}

/// Runs `future`, failing with [`Error::TaskTimeout`] if it has not completed after `duration`.
///
/// The wrapped future is dropped on timeout, which cancels any socket wait it was parked on.
pub fn timeout<F: Future>(duration: Duration, future: F) -> Timeout<F> {
    Timeout { future: Box::pin(future), duration, deadline: Instant::now() + duration, timer: None }
}

impl<F: Future> Future for Timeout<F> {
    type Output = Result<F::Output>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        let polled = if context::evented() {
            this.future.as_mut().poll(cx)
        } else {
            // Bounds any thread-blocking wait inside the wrapped future
            let _deadline = context::push_deadline(this.deadline);
            this.future.as_mut().poll(cx)
        };
        if let Poll::Ready(value) = polled {
            disarm(&mut this.timer);
            return Poll::Ready(Ok(value));
        }

        if Instant::now() >= this.deadline {
            disarm(&mut this.timer);
            counter!("cellio_task_timeouts_total").increment(1);
            tracing::debug!(timeout = ?this.duration, "task timed out");
            return Poll::Ready(Err(Error::TaskTimeout(this.duration)));
        }

        match context::current() {
            Some(ctx) => arm(&mut this.timer, &ctx, this.deadline, cx.waker()),
            None => context::note_wake_hint(this.deadline),
        }
        Poll::Pending
    }
}

impl<F> Drop for Timeout<F> {
    fn drop(&mut self) {
        disarm(&mut self.timer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactor::Reactor;
    use std::rc::Rc;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::Wake;

    struct Count(AtomicUsize);

    impl Wake for Count {
        fn wake(self: Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn timers_expire_in_deadline_order() {
        let count = Arc::new(Count(AtomicUsize::new(0)));
        let waker = Waker::from(count.clone());
        let now = Instant::now();

        let mut timers = Timers::default();
        timers.insert(now + Duration::from_millis(30), waker.clone());
        timers.insert(now + Duration::from_millis(10), waker.clone());
        timers.insert(now + Duration::from_millis(10), waker);

        assert_eq!(timers.next_deadline(), Some(now + Duration::from_millis(10)));
        assert_eq!(timers.poll_timeout(now), Some(Duration::from_millis(10)));

        let due = timers.take_expired(now + Duration::from_millis(10));
        assert_eq!(due.len(), 2);
        due.into_iter().for_each(Waker::wake);
        assert_eq!(count.0.load(Ordering::SeqCst), 2);
        assert_eq!(timers.len(), 1);

        assert_eq!(timers.poll_timeout(now + Duration::from_secs(1)), Some(Duration::ZERO));
    }

    #[test]
    fn empty_timer_set_never_bounds_a_turn() {
        let timers = Timers::default();
        assert_eq!(timers.poll_timeout(Instant::now()), None);
    }

    #[test]
    fn blocking_sleep_blocks_the_thread() {
        let started = Instant::now();
        crate::block_on(sleep(Duration::from_millis(30)));
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn blocking_timeout_expires_around_a_pending_future() {
        let started = Instant::now();
        let result = crate::block_on(timeout(Duration::from_millis(40), std::future::pending::<()>()));
        assert!(matches!(result, Err(Error::TaskTimeout(d)) if d == Duration::from_millis(40)));
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn blocking_timeout_cuts_a_longer_sleep_short() {
        let started = Instant::now();
        let result = crate::block_on(timeout(Duration::from_millis(50), sleep(Duration::from_secs(2))));
        assert!(matches!(result, Err(Error::TaskTimeout(d)) if d == Duration::from_millis(50)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn blocking_sleep_within_a_timeout_completes() {
        let result = crate::block_on(timeout(Duration::from_secs(2), sleep(Duration::from_millis(20))));
        assert!(result.is_ok());
    }

    fn actor_context() -> Rc<ActorContext> {
        let (reactor, _poll) = Reactor::new().unwrap();
        Rc::new(ActorContext::new(Arc::from("time-test"), reactor))
    }

    #[test]
    fn dropped_futures_remove_their_timers() {
        let ctx = actor_context();
        let _entered = context::enter(ctx.clone());
        let mut cx = Context::from_waker(Waker::noop());

        let mut pending_sleep = sleep(Duration::from_secs(60));
        assert!(Pin::new(&mut pending_sleep).poll(&mut cx).is_pending());
        let mut pending_timeout = timeout(Duration::from_secs(60), std::future::pending::<()>());
        assert!(Pin::new(&mut pending_timeout).poll(&mut cx).is_pending());
        assert_eq!(ctx.timers.borrow().len(), 2);

        drop(pending_sleep);
        drop(pending_timeout);
        assert_eq!(ctx.timers.borrow().len(), 0);
    }

    #[test]
    fn timeout_finishing_early_removes_its_timer() {
        let ctx = actor_context();
        let _entered = context::enter(ctx.clone());
        let mut cx = Context::from_waker(Waker::noop());

        let (tx, rx) = futures::channel::oneshot::channel::<u8>();
        let mut guarded = timeout(Duration::from_secs(60), rx);
        assert!(Pin::new(&mut guarded).poll(&mut cx).is_pending());
        assert_eq!(ctx.timers.borrow().len(), 1);

        tx.send(7).unwrap();
        let Poll::Ready(Ok(Ok(value))) = Pin::new(&mut guarded).poll(&mut cx) else {
            panic!("expected the value before the deadline");
        };
        assert_eq!(value, 7);
        assert_eq!(ctx.timers.borrow().len(), 0);
    }

    #[test]
    fn repolling_with_another_waker_retargets_the_timer() {
        let ctx = actor_context();
        let _entered = context::enter(ctx.clone());

        let first = Arc::new(Count(AtomicUsize::new(0)));
        let second = Arc::new(Count(AtomicUsize::new(0)));
        let first_waker = Waker::from(first.clone());
        let second_waker = Waker::from(second.clone());

        let mut nap = sleep(Duration::from_secs(60));
        assert!(Pin::new(&mut nap).poll(&mut Context::from_waker(&first_waker)).is_pending());
        assert!(Pin::new(&mut nap).poll(&mut Context::from_waker(&second_waker)).is_pending());
        assert_eq!(ctx.timers.borrow().len(), 1);

        let due = ctx.timers.borrow_mut().take_expired(nap.deadline());
        due.into_iter().for_each(Waker::wake);
        assert_eq!(first.0.load(Ordering::SeqCst), 0);
        assert_eq!(second.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn set_waker_readds_a_fired_timer() {
        let count = Arc::new(Count(AtomicUsize::new(0)));
        let waker = Waker::from(count.clone());
        let deadline = Instant::now();

        let mut timers = Timers::default();
        let key = timers.insert(deadline, waker.clone());
        assert_eq!(timers.take_expired(deadline).len(), 1);

        timers.set_waker(key, &waker);
        assert_eq!(timers.len(), 1);
        assert!(timers.remove(key));
        assert!(!timers.remove(key));
    }

    #[test]
    fn timeout_passes_through_a_ready_value() {
        let result = crate::block_on(timeout(Duration::from_secs(1), async { 5 }));
        assert_eq!(result.unwrap(), 5);
    }
}
