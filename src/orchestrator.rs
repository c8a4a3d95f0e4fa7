//! The main tick loop: user reader first, then every key slot, round-robin,
//! forever. All state machine transitions run on this thread; timer and
//! network threads only ever touch the components through their locks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::info;

use crate::session::SessionManager;
use crate::slot::{KeySlot, UserSlot};

pub struct Orchestrator {
    user_slot: Arc<UserSlot>,
    key_slots: Vec<Arc<KeySlot>>,
    session: Arc<SessionManager>,
    delay: Duration,
    running: Arc<AtomicBool>,
}

impl Orchestrator {
    pub fn new(
        user_slot: Arc<UserSlot>,
        key_slots: Vec<Arc<KeySlot>>,
        session: Arc<SessionManager>,
        delay: Duration,
        running: Arc<AtomicBool>,
    ) -> Orchestrator {
        Orchestrator {
            user_slot,
            key_slots,
            session,
            delay,
            running,
        }
    }

    /// Runs until the shutdown flag flips, then cleans up.
    pub fn run(&self) {
        info!("tick loop started ({} key slots)", self.key_slots.len());
        while self.running.load(Ordering::SeqCst) {
            self.user_slot.tick();
            for slot in &self.key_slots {
                slot.tick();
            }
            thread::sleep(self.delay);
        }
        self.shutdown();
    }

    fn shutdown(&self) {
        info!("shutting down");
        self.session.logout();
        for slot in &self.key_slots {
            slot.cleanup();
        }
        self.user_slot.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::hw::MemoryPin;
    use crate::net::Outbound;
    use crate::rfid::{CardReader, MemoryReader};
    use crate::slot::SlotConfig;

    #[test]
    fn loop_stops_on_flag_and_cleans_up() {
        let catalog = Arc::new(Catalog::from_records(Vec::new(), Vec::new()));
        let reader = Arc::new(MemoryReader::new());
        let slot = KeySlot::new(
            SlotConfig {
                name: "slot-1".into(),
                reader_timeout: Duration::from_millis(1),
                relock_timeout: Duration::from_millis(50),
                solenoid_settle: Duration::from_millis(1),
                theft_window: Duration::from_millis(40),
                init_locked: false,
            },
            Arc::clone(&reader) as Arc<dyn CardReader>,
            Arc::clone(&catalog),
            Arc::new(MemoryPin::new(false)),
        );
        let outbound = Outbound::new();
        let session = SessionManager::new(
            Arc::clone(&catalog),
            vec![Arc::clone(&slot)],
            b"secret".to_vec(),
            Duration::from_secs(60),
            outbound,
        );
        let user_reader = Arc::new(MemoryReader::new());
        let user_slot = UserSlot::new(
            Arc::clone(&user_reader) as Arc<dyn CardReader>,
            catalog,
            Arc::clone(&session),
            Duration::from_millis(1),
        );

        let running = Arc::new(AtomicBool::new(true));
        let orchestrator = Orchestrator::new(
            user_slot,
            vec![Arc::clone(&slot)],
            session,
            Duration::from_micros(100),
            Arc::clone(&running),
        );

        let stopper = Arc::clone(&running);
        let handle = thread::spawn(move || orchestrator.run());
        thread::sleep(Duration::from_millis(40));
        stopper.store(false, Ordering::SeqCst);
        handle.join().unwrap();

        // the loop ran at least one tick: the slot settled into its locked
        // baseline, and shutdown reached the readers
        assert!(slot.is_locked());
        assert!(reader.cleaned_up());
        assert!(user_reader.cleaned_up());
    }
}
