//! Digital output seam between the controller logic and GPIO.
//!
//! Chip-select lines and solenoid drivers are plain set-high/set-low outputs;
//! everything above this trait is hardware-free and testable on any host.

use std::sync::atomic::{AtomicBool, Ordering};

pub trait DigitalOutput: Send + Sync {
    fn set_high(&self);
    fn set_low(&self);
}

/// In-memory output used by tests and bench rigs.
#[derive(Default)]
pub struct MemoryPin {
    high: AtomicBool,
}

impl MemoryPin {
    pub fn new(high: bool) -> Self {
        MemoryPin {
            high: AtomicBool::new(high),
        }
    }

    pub fn is_high(&self) -> bool {
        self.high.load(Ordering::SeqCst)
    }
}

impl DigitalOutput for MemoryPin {
    fn set_high(&self) {
        self.high.store(true, Ordering::SeqCst);
    }

    fn set_low(&self) {
        self.high.store(false, Ordering::SeqCst);
    }
}

#[cfg(feature = "rpi")]
pub use self::rpi::GpioPin;

#[cfg(feature = "rpi")]
mod rpi {
    use parking_lot::Mutex;
    use rppal::gpio::OutputPin;

    use super::DigitalOutput;

    /// One BCM output pin. rppal wants `&mut` for level changes, so the pin
    /// sits behind a mutex and the trait stays shareable.
    pub struct GpioPin {
        pin: Mutex<OutputPin>,
    }

    impl GpioPin {
        pub fn new(pin: OutputPin) -> Self {
            GpioPin {
                pin: Mutex::new(pin),
            }
        }
    }

    impl DigitalOutput for GpioPin {
        fn set_high(&self) {
            self.pin.lock().set_high();
        }

        fn set_low(&self) {
            self.pin.lock().set_low();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_pin_tracks_level() {
        let pin = MemoryPin::new(true);
        assert!(pin.is_high());
        pin.set_low();
        assert!(!pin.is_high());
        pin.set_high();
        assert!(pin.is_high());
    }
}
