//! Chip-select arbitration for readers sharing one SPI bus.
//!
//! All MFRC522s hang off the same SPI pins; selecting a reader means pulling
//! its chip-select line low, and at most one line may be low at any instant.
//! The arbiter serializes that: a thread acquires one line (reentrantly, with
//! an optional timeout), and every other line stays high until the hold count
//! drops back to zero.

use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::error::{Error, Result};
use crate::hw::DigitalOutput;

struct ArbiterState {
    owner: Option<ThreadId>,
    line: Option<usize>,
    holds: usize,
}

pub struct BusArbiter {
    pins: Vec<Arc<dyn DigitalOutput>>,
    state: Mutex<ArbiterState>,
    cond: Condvar,
}

impl BusArbiter {
    /// Takes ownership of the select lines and drives them all inactive.
    pub fn new(pins: Vec<Arc<dyn DigitalOutput>>) -> Arc<Self> {
        for pin in &pins {
            pin.set_high();
        }
        Arc::new(BusArbiter {
            pins,
            state: Mutex::new(ArbiterState {
                owner: None,
                line: None,
                holds: 0,
            }),
            cond: Condvar::new(),
        })
    }

    /// Block until line `line` can be asserted, or until `timeout` elapses.
    /// Reacquiring the line already held by this thread succeeds immediately.
    pub fn acquire(&self, line: usize, timeout: Option<Duration>) -> Result<()> {
        assert!(line < self.pins.len(), "chip-select line {line} out of range");
        let me = thread::current().id();
        let deadline = timeout.map(|t| std::time::Instant::now() + t);
        let mut state = self.state.lock();
        loop {
            if state.holds == 0 {
                state.owner = Some(me);
                state.line = Some(line);
                state.holds = 1;
                self.pins[line].set_low();
                return Ok(());
            }
            if state.owner == Some(me) {
                // Reentrant acquisition must target the line already held;
                // asking for a second line from the same thread can never be
                // satisfied without asserting two lines at once.
                assert_eq!(
                    state.line,
                    Some(line),
                    "nested chip-select acquisition for a different line"
                );
                state.holds += 1;
                return Ok(());
            }
            match deadline {
                Some(deadline) => {
                    if self.cond.wait_until(&mut state, deadline).timed_out() {
                        return Err(Error::BusBusy);
                    }
                }
                None => self.cond.wait(&mut state),
            }
        }
    }

    /// Release one hold. When the count reaches zero every line is driven
    /// inactive again. Releasing without holding is a programming error.
    pub fn release(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock();
        assert!(
            state.holds > 0 && state.owner == Some(me),
            "chip-select release without acquisition"
        );
        state.holds -= 1;
        if state.holds == 0 {
            state.owner = None;
            state.line = None;
            for pin in &self.pins {
                pin.set_high();
            }
            self.cond.notify_all();
        }
    }

}

/// Per-reader view of the arbiter: acquisitions through this handle always
/// target its line, and the returned guard releases on drop, so the select
/// line is restored on every exit path.
#[derive(Clone)]
pub struct LineHandle {
    arbiter: Arc<BusArbiter>,
    line: usize,
}

impl LineHandle {
    /// Binds one line of `arbiter`; handed to the reader that owns it.
    pub fn new(arbiter: Arc<BusArbiter>, line: usize) -> LineHandle {
        assert!(
            line < arbiter.pins.len(),
            "chip-select line {line} out of range"
        );
        LineHandle { arbiter, line }
    }

    pub fn acquire(&self, timeout: Option<Duration>) -> Result<LineGuard<'_>> {
        self.arbiter.acquire(self.line, timeout)?;
        Ok(LineGuard { handle: self })
    }
}

pub struct LineGuard<'a> {
    handle: &'a LineHandle,
}

impl Drop for LineGuard<'_> {
    fn drop(&mut self) {
        self.handle.arbiter.release();
    }
}
