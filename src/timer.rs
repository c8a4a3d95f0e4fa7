//! Cancellable one-shot timers backed by worker threads.
//!
//! Used for deferred relocks and session expiry. Cancellation is race-safe:
//! cancelling a timer that is already running lets the callback finish, and
//! cancelling twice (or after the fire) is harmless.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::warn;
use parking_lot::{Condvar, Mutex};

struct Shared {
    state: Mutex<State>,
    cond: Condvar,
}

#[derive(Default)]
struct State {
    cancelled: bool,
}

/// Handle to a scheduled callback. Dropping the handle does NOT cancel the
/// timer; call [`TimerHandle::cancel`] explicitly.
#[derive(Clone)]
pub struct TimerHandle {
    shared: Arc<Shared>,
}

impl TimerHandle {
    /// Run `f` on a new thread after `delay`, unless cancelled first.
    pub fn schedule<F>(name: &str, delay: Duration, f: F) -> TimerHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let shared = Arc::new(Shared {
            state: Mutex::new(State::default()),
            cond: Condvar::new(),
        });
        let thread_shared = Arc::clone(&shared);
        let builder = thread::Builder::new().name(name.to_string());
        let spawned = builder.spawn(move || {
            let deadline = std::time::Instant::now() + delay;
            let mut state = thread_shared.state.lock();
            // Loop against spurious wakeups: fire only at the deadline or
            // stand down on cancellation.
            while !state.cancelled {
                if thread_shared.cond.wait_until(&mut state, deadline).timed_out() {
                    break;
                }
            }
            let cancelled = state.cancelled;
            drop(state);
            if !cancelled {
                f();
            }
        });
        if spawned.is_err() {
            warn!("could not spawn timer thread {name}");
        }
        TimerHandle { shared }
    }

    /// Stop the timer if it has not fired yet. Idempotent.
    pub fn cancel(&self) {
        let mut state = self.shared.state.lock();
        state.cancelled = true;
        self.shared.cond.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Instant;

    #[test]
    fn fires_after_delay() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let start = Instant::now();
        TimerHandle::schedule("t", Duration::from_millis(30), move || {
            flag.store(true, Ordering::SeqCst);
        });
        thread::sleep(Duration::from_millis(120));
        assert!(fired.load(Ordering::SeqCst));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn cancel_prevents_firing() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let handle = TimerHandle::schedule("t", Duration::from_millis(60), move || {
            flag.store(true, Ordering::SeqCst);
        });
        handle.cancel();
        thread::sleep(Duration::from_millis(150));
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[test]
    fn cancel_after_fire_is_harmless() {
        let handle = TimerHandle::schedule("t", Duration::from_millis(5), || {});
        thread::sleep(Duration::from_millis(50));
        handle.cancel();
        handle.cancel();
    }
}
