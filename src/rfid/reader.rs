//! Card reader facade: one bounded "what UID is on the antenna" question.
//!
//! The register-level driver stays behind this trait so the slot machines,
//! session handling and tests never depend on hardware.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::error::Result;

/// UIDs render as lowercase hex without separators; equality across ticks is
/// the primary signal the slot machines consume.
pub trait CardReader: Send + Sync {
    /// Poll until a card answers or `timeout` elapses. `Ok(None)` means no
    /// card; `Err(Error::BusBusy)` means the chip-select bus could not be
    /// acquired; other errors are reader faults.
    fn read_uid(&self, timeout: std::time::Duration) -> Result<Option<String>>;

    /// Idempotent shutdown: power down the antenna, release the bus.
    fn cleanup(&self);
}

#[cfg(feature = "rpi")]
pub use self::rpi::Mfrc522Reader;

#[cfg(feature = "rpi")]
mod rpi {
    use std::time::{Duration, Instant};

    use log::{debug, warn};

    use super::CardReader;
    use crate::error::{Error, Result};
    use crate::rfid::mfrc522::Mfrc522;

    pub struct Mfrc522Reader {
        chip: Mfrc522,
    }

    impl Mfrc522Reader {
        pub fn new(chip: Mfrc522) -> Self {
            Mfrc522Reader { chip }
        }
    }

    impl CardReader for Mfrc522Reader {
        fn read_uid(&self, timeout: Duration) -> Result<Option<String>> {
            // Hold the select line for the whole poll; contention lasting
            // longer than the poll itself means another reader is hogging
            // the bus and this tick is skipped.
            let _cs = self.chip.select_handle().acquire(Some(timeout))?;
            let deadline = Instant::now() + timeout;

            self.chip.antenna_on().map_err(fault)?;
            let mut result = Ok(None);
            loop {
                match self.chip.read_uid_once() {
                    Ok(Some(uid)) => {
                        result = Ok(Some(hex::encode(uid)));
                        break;
                    }
                    Ok(None) => {
                        if Instant::now() >= deadline {
                            break;
                        }
                    }
                    Err(e) => {
                        result = Err(fault(e));
                        break;
                    }
                }
            }
            if let Err(e) = self.chip.antenna_off() {
                debug!("antenna off failed: {e}");
            }
            result
        }

        fn cleanup(&self) {
            if let Err(e) = self.chip.power_down() {
                warn!("reader cleanup failed: {e}");
            }
        }
    }

    fn fault(e: Error) -> Error {
        match e {
            Error::BusBusy => Error::BusBusy,
            other => Error::Reader(other.to_string()),
        }
    }
}

/// What a [`MemoryReader`] answers on the next poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryRead {
    Present(String),
    Absent,
    Fault,
    Busy,
}

/// In-memory reader for tests and bench rigs: answers with whatever card
/// state was last injected, like a tag sitting on (or missing from) the
/// antenna.
pub struct MemoryReader {
    read: Mutex<MemoryRead>,
    cleaned: AtomicBool,
}

impl MemoryReader {
    pub fn new() -> Self {
        MemoryReader {
            read: Mutex::new(MemoryRead::Absent),
            cleaned: AtomicBool::new(false),
        }
    }

    pub fn set_card(&self, uid: Option<&str>) {
        *self.read.lock() = match uid {
            Some(uid) => MemoryRead::Present(uid.to_string()),
            None => MemoryRead::Absent,
        };
    }

    pub fn set_fault(&self) {
        *self.read.lock() = MemoryRead::Fault;
    }

    pub fn set_busy(&self) {
        *self.read.lock() = MemoryRead::Busy;
    }

    pub fn cleaned_up(&self) -> bool {
        self.cleaned.load(Ordering::SeqCst)
    }
}

impl Default for MemoryReader {
    fn default() -> Self {
        MemoryReader::new()
    }
}

impl CardReader for MemoryReader {
    fn read_uid(&self, _timeout: std::time::Duration) -> Result<Option<String>> {
        match self.read.lock().clone() {
            MemoryRead::Present(uid) => Ok(Some(uid)),
            MemoryRead::Absent => Ok(None),
            MemoryRead::Fault => Err(crate::error::Error::Reader("injected fault".into())),
            MemoryRead::Busy => Err(crate::error::Error::BusBusy),
        }
    }

    fn cleanup(&self) {
        self.cleaned.store(true, Ordering::SeqCst);
    }
}
