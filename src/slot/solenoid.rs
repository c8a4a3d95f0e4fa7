//! Solenoid actuator with a software lock state and a deferred relock timer.
//!
//! Driving the pin high energizes the solenoid (slot open); low de-energizes
//! it (slot locked). The non-quick lock first waits the settle time so a
//! user's hand can clear the slot before the bolt drops.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::info;
use parking_lot::Mutex;

use crate::hw::DigitalOutput;
use crate::timer::TimerHandle;

struct SolenoidState {
    locked: bool,
    relock_timer: Option<TimerHandle>,
}

pub struct SolenoidLock {
    name: String,
    pin: Arc<dyn DigitalOutput>,
    settle: Duration,
    relock_timeout: Duration,
    state: Mutex<SolenoidState>,
}

impl SolenoidLock {
    pub fn new(
        name: impl Into<String>,
        pin: Arc<dyn DigitalOutput>,
        settle: Duration,
        relock_timeout: Duration,
        init_locked: bool,
    ) -> Self {
        if init_locked {
            pin.set_low();
        }
        SolenoidLock {
            name: name.into(),
            pin,
            settle,
            relock_timeout,
            state: Mutex::new(SolenoidState {
                locked: init_locked,
                relock_timer: None,
            }),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.state.lock().locked
    }

    /// Transition to locked. Returns false when already locked (the pending
    /// timer is still cancelled). The settle sleep happens inside the
    /// critical section: the transition is not over until the bolt drops,
    /// and no unlock may interleave with it.
    pub fn lock(&self, quick: bool) -> bool {
        let mut state = self.state.lock();
        if let Some(timer) = state.relock_timer.take() {
            timer.cancel();
        }
        if state.locked {
            return false;
        }
        info!("{}: locking", self.name);
        state.locked = true;
        if !quick {
            thread::sleep(self.settle);
        }
        self.pin.set_low();
        true
    }

    /// Transition to unlocked and arm the auto-relock timer. `on_timeout`
    /// runs on a timer thread after the relock timeout unless a lock call
    /// cancels it first.
    pub fn unlock<F>(&self, on_timeout: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.state.lock();
        if let Some(timer) = state.relock_timer.take() {
            timer.cancel();
        }
        info!("{}: unlocking", self.name);
        state.locked = false;
        self.pin.set_high();
        state.relock_timer = Some(TimerHandle::schedule(
            &format!("{}-relock", self.name),
            self.relock_timeout,
            on_timeout,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::MemoryPin;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn rig(init_locked: bool) -> (SolenoidLock, Arc<MemoryPin>) {
        let pin = Arc::new(MemoryPin::new(true));
        let lock = SolenoidLock::new(
            "sol",
            Arc::clone(&pin) as Arc<dyn DigitalOutput>,
            Duration::from_millis(5),
            Duration::from_millis(40),
            init_locked,
        );
        (lock, pin)
    }

    #[test]
    fn init_locked_deenergizes() {
        let (lock, pin) = rig(true);
        assert!(lock.is_locked());
        assert!(!pin.is_high());
    }

    #[test]
    fn lock_is_idempotent() {
        let (lock, pin) = rig(false);
        assert!(lock.lock(true));
        assert!(!lock.lock(true));
        assert!(lock.is_locked());
        assert!(!pin.is_high());
    }

    #[test]
    fn unlock_energizes_and_timer_fires() {
        let (lock, pin) = rig(true);
        let fired = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fired);
        lock.unlock(move || {
            f.fetch_add(1, Ordering::SeqCst);
        });
        assert!(!lock.is_locked());
        assert!(pin.is_high());
        thread::sleep(Duration::from_millis(120));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn lock_cancels_pending_relock() {
        let (lock, _pin) = rig(true);
        let fired = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fired);
        lock.unlock(move || {
            f.fetch_add(1, Ordering::SeqCst);
        });
        assert!(lock.lock(false));
        thread::sleep(Duration::from_millis(100));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
