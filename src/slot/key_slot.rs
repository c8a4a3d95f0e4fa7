//! Per-slot key presence state machine.
//!
//! Each tick performs one bounded UID read, debounces it against the previous
//! tick, and classifies what changed: insertion, removal, theft, a deceptive
//! swap, or an unauthorized placement. RFID readers drop reads now and then,
//! so a key that vanishes from a locked slot first enters a decision window;
//! only if it stays unreadable past the deadline is it ruled stolen, and a
//! *different* UID showing up inside the window is treated as a swap.
//!
//! The transition logic is a pure function over a value state; the tick
//! applies its result and performs the side effects (events, solenoid)
//! afterwards, outside the state lock.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::catalog::{Catalog, KeyRecord};
use crate::error::Error;
use crate::event::Event;
use crate::hw::DigitalOutput;
use crate::rfid::CardReader;
use crate::slot::solenoid::SolenoidLock;

/// Immutable per-slot parameters.
#[derive(Debug, Clone)]
pub struct SlotConfig {
    pub name: String,
    pub reader_timeout: Duration,
    pub relock_timeout: Duration,
    pub solenoid_settle: Duration,
    pub theft_window: Duration,
    /// Slots normally boot unlocked and quick-lock on their first tick so the
    /// solenoid is known de-energized after power-on.
    pub init_locked: bool,
}

/// Why the solenoid just locked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockCause {
    KeyInserted(KeyRecord),
    KeyRemoved(KeyRecord),
    AutoRelock,
    Bootstrap,
}

/// A key ruled stolen. `key` is `None` when the vanished UID was not in the
/// catalog; `replacement` carries the foreign UID of a deceptive swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TheftReport {
    pub key: Option<KeyRecord>,
    pub uid: String,
    pub replacement: Option<String>,
}

pub struct KeySlotEvents {
    pub key_found: Event<KeyRecord>,
    pub key_uninserted: Event<KeyRecord>,
    pub key_stolen: Event<TheftReport>,
    pub unauthorized_place: Event<KeyRecord>,
    pub unknown_key_placed: Event<String>,
    pub solenoid_locked: Event<LockCause>,
    pub relocked: Event<()>,
}

impl KeySlotEvents {
    fn new(origin: &str) -> Self {
        KeySlotEvents {
            key_found: Event::new(origin),
            key_uninserted: Event::new(origin),
            key_stolen: Event::new(origin),
            unauthorized_place: Event::new(origin),
            unknown_key_placed: Event::new(origin),
            solenoid_locked: Event::new(origin),
            relocked: Event::new(origin),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TheftCandidate {
    uid: String,
    deadline: Instant,
}

#[derive(Debug, Clone)]
struct MachineState {
    /// UID observed on the previous tick; the debounce baseline.
    last_uid: Option<String>,
    current_key: Option<KeyRecord>,
    theft_candidate: Option<TheftCandidate>,
    /// Set until the first tick completes on a slot that booted unlocked.
    bootstrap: bool,
}

enum Emit {
    Found(KeyRecord),
    Uninserted(KeyRecord),
    Stolen(TheftReport),
    Unauthorized(KeyRecord),
    Unknown(String),
}

/// Result of one pure transition.
struct Step {
    next_current_key: Option<KeyRecord>,
    next_theft: Option<TheftCandidate>,
    emits: Vec<Emit>,
    /// A `lock(quick=false)` request with its cause.
    lock_request: Option<LockCause>,
}

/// The transition function. Consumes the pre-tick state plus the fresh read
/// and computes the post-tick state and side effects; it touches no hardware.
/// `last_uid` always becomes `card_now` afterwards, so it is not part of the
/// output.
fn step(
    state: &MachineState,
    locked: bool,
    card_now: Option<&str>,
    now: Instant,
    theft_window: Duration,
    catalog: &Catalog,
) -> Step {
    let mut out = Step {
        next_current_key: state.current_key.clone(),
        next_theft: state.theft_candidate.clone(),
        emits: Vec::new(),
        lock_request: None,
    };

    // Debounce: same answer as last tick means nothing happened.
    if state.last_uid.as_deref() == card_now {
        return out;
    }

    if locked {
        match (state.last_uid.as_deref(), card_now) {
            (None, Some(uid)) => {
                // A card appeared in a locked slot.
                match &state.theft_candidate {
                    Some(tc) if now < tc.deadline && tc.uid == uid => {
                        // The same key briefly disappeared and returned.
                        debug!("key re-found after glitch: {uid}");
                        out.next_theft = None;
                    }
                    Some(tc) => {
                        // A different card inside the window: the original
                        // key is gone and this one is covering for it.
                        out.emits.push(Emit::Stolen(TheftReport {
                            key: catalog.key_by_uid(&tc.uid).cloned(),
                            uid: tc.uid.clone(),
                            replacement: Some(uid.to_string()),
                        }));
                        out.next_theft = None;
                        out.next_current_key = None;
                    }
                    None => match catalog.key_by_uid(uid) {
                        Some(key) => out.emits.push(Emit::Unauthorized(key.clone())),
                        None => out.emits.push(Emit::Unknown(uid.to_string())),
                    },
                }
            }
            (Some(prev), None) => {
                // A present key vanished while locked: open the decision
                // window instead of crying wolf over one dropped read.
                info!("key missing: {prev}");
                out.next_theft = Some(TheftCandidate {
                    uid: prev.to_string(),
                    deadline: now + theft_window,
                });
            }
            (Some(_prev), Some(uid)) => {
                // In-place swap while locked.
                match &state.theft_candidate {
                    Some(tc) => {
                        out.emits.push(Emit::Stolen(TheftReport {
                            key: catalog.key_by_uid(&tc.uid).cloned(),
                            uid: tc.uid.clone(),
                            replacement: Some(uid.to_string()),
                        }));
                        out.next_theft = None;
                        out.next_current_key = None;
                    }
                    None => match catalog.key_by_uid(uid) {
                        Some(key) => out.emits.push(Emit::Unauthorized(key.clone())),
                        None => out.emits.push(Emit::Unknown(uid.to_string())),
                    },
                }
            }
            (None, None) => {}
        }
    } else {
        match card_now {
            Some(uid) => match catalog.key_by_uid(uid) {
                Some(key) => {
                    out.next_current_key = Some(key.clone());
                    out.emits.push(Emit::Found(key.clone()));
                    out.lock_request = Some(LockCause::KeyInserted(key.clone()));
                }
                None => out.emits.push(Emit::Unknown(uid.to_string())),
            },
            None => {
                if let Some(key) = &state.current_key {
                    out.emits.push(Emit::Uninserted(key.clone()));
                    out.next_current_key = None;
                    out.lock_request = Some(LockCause::KeyRemoved(key.clone()));
                }
            }
        }
    }

    out
}

pub struct KeySlot {
    config: SlotConfig,
    reader: Arc<dyn CardReader>,
    catalog: Arc<Catalog>,
    solenoid: SolenoidLock,
    machine: Mutex<MachineState>,
    pub events: KeySlotEvents,
    /// Self-reference handed to relock timers, which may outlive the slot.
    weak: Weak<KeySlot>,
}

impl KeySlot {
    pub fn new(
        config: SlotConfig,
        reader: Arc<dyn CardReader>,
        catalog: Arc<Catalog>,
        solenoid_pin: Arc<dyn DigitalOutput>,
    ) -> Arc<KeySlot> {
        let solenoid = SolenoidLock::new(
            config.name.clone(),
            solenoid_pin,
            config.solenoid_settle,
            config.relock_timeout,
            config.init_locked,
        );
        let events = KeySlotEvents::new(&config.name);
        let machine = MachineState {
            last_uid: None,
            current_key: None,
            theft_candidate: None,
            bootstrap: !config.init_locked,
        };
        Arc::new_cyclic(|weak| KeySlot {
            config,
            reader,
            catalog,
            solenoid,
            machine: Mutex::new(machine),
            events,
            weak: weak.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn is_locked(&self) -> bool {
        self.solenoid.is_locked()
    }

    /// Key believed to sit in the slot right now.
    pub fn current_key(&self) -> Option<KeyRecord> {
        self.machine.lock().current_key.clone()
    }

    /// One round-robin step: rule on an expired theft window, read once,
    /// transition, apply side effects.
    pub fn tick(&self) {
        // An expired decision window is ruled before the next read so the
        // verdict cannot be delayed by bus contention.
        let expired = {
            let mut machine = self.machine.lock();
            match &machine.theft_candidate {
                Some(tc) if Instant::now() >= tc.deadline => {
                    let uid = tc.uid.clone();
                    machine.theft_candidate = None;
                    machine.current_key = None;
                    Some(TheftReport {
                        key: self.catalog.key_by_uid(&uid).cloned(),
                        uid,
                        replacement: None,
                    })
                }
                _ => None,
            }
        };
        if let Some(report) = expired {
            match &report.key {
                Some(key) => warn!("{}: key stolen: {key}", self.config.name),
                None => warn!("{}: key stolen: unknown uid {}", self.config.name, report.uid),
            }
            self.events.key_stolen.trigger(&report);
        }

        let card_now = match self.reader.read_uid(self.config.reader_timeout) {
            Ok(card) => card,
            Err(Error::BusBusy) => {
                debug!("{}: bus busy, skipping tick", self.config.name);
                return;
            }
            Err(e) => {
                // One fault is indistinguishable from an empty antenna; the
                // debounce and the decision window absorb it.
                warn!("{}: reader fault treated as no card: {e}", self.config.name);
                None
            }
        };

        let locked = self.solenoid.is_locked();
        let (step_result, finish_bootstrap) = {
            let mut machine = self.machine.lock();
            let result = step(
                &machine,
                locked,
                card_now.as_deref(),
                Instant::now(),
                self.config.theft_window,
                &self.catalog,
            );
            machine.last_uid = card_now.clone();
            machine.current_key = result.next_current_key.clone();
            machine.theft_candidate = result.next_theft.clone();
            let finish_bootstrap = machine.bootstrap;
            machine.bootstrap = false;
            (result, finish_bootstrap)
        };

        for emit in &step_result.emits {
            match emit {
                Emit::Found(key) => {
                    info!("{}: key found: {key}", self.config.name);
                    self.events.key_found.trigger(key);
                }
                Emit::Uninserted(key) => {
                    info!("{}: key uninserted: {key}", self.config.name);
                    self.events.key_uninserted.trigger(key);
                }
                Emit::Stolen(report) => {
                    warn!(
                        "{}: key stolen with covering replacement {:?}",
                        self.config.name, report.replacement
                    );
                    self.events.key_stolen.trigger(report);
                }
                Emit::Unauthorized(key) => {
                    warn!("{}: unauthorized key placement: {key}", self.config.name);
                    self.events.unauthorized_place.trigger(key);
                }
                Emit::Unknown(uid) => {
                    warn!("{}: unknown key placed: {uid}", self.config.name);
                    self.events.unknown_key_placed.trigger(uid);
                }
            }
        }

        if let Some(cause) = step_result.lock_request {
            if self.solenoid.lock(false) {
                self.events.solenoid_locked.trigger(&cause);
            }
        }

        // First tick of a slot that booted unlocked: settle into the locked
        // baseline without the user-clearance delay.
        if finish_bootstrap && self.solenoid.lock(true) {
            self.events.solenoid_locked.trigger(&LockCause::Bootstrap);
        }
    }

    /// Energize the solenoid and arm the auto-relock. Called by the session
    /// manager after a validated, authorized unlock request.
    pub fn unlock(&self) {
        {
            // An authorized unlock supersedes a pending theft ruling: the
            // missing key is about to become a sanctioned removal.
            let mut machine = self.machine.lock();
            machine.theft_candidate = None;
        }
        let weak = self.weak.clone();
        self.solenoid.unlock(move || {
            if let Some(slot) = weak.upgrade() {
                slot.relock_from_timer();
            }
        });
    }

    /// Runs on the relock timer thread: one tick (so an insertion in the
    /// final moment is still honored), then a quick lock.
    fn relock_from_timer(&self) {
        debug!("{}: auto-relock", self.config.name);
        self.tick();
        if self.solenoid.lock(true) {
            self.events.solenoid_locked.trigger(&LockCause::AutoRelock);
            self.events.relocked.trigger(&());
        }
    }

    pub fn cleanup(&self) {
        self.reader.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::UserRecord;
    use crate::hw::MemoryPin;
    use crate::rfid::MemoryReader;
    use std::thread;

    fn test_catalog() -> Arc<Catalog> {
        let keys = vec![
            KeyRecord {
                id: "k1".into(),
                uid: "aa11".into(),
                name: "Server Room".into(),
            },
            KeyRecord {
                id: "k2".into(),
                uid: "bb22".into(),
                name: "Workshop".into(),
            },
        ];
        let users: Vec<UserRecord> = Vec::new();
        Arc::new(Catalog::from_records(keys, users))
    }

    struct Rig {
        slot: Arc<KeySlot>,
        reader: Arc<MemoryReader>,
        pin: Arc<MemoryPin>,
        log: Arc<Mutex<Vec<String>>>,
    }

    fn rig(init_locked: bool) -> Rig {
        let reader = Arc::new(MemoryReader::new());
        let pin = Arc::new(MemoryPin::new(false));
        let slot = KeySlot::new(
            SlotConfig {
                name: "slot-1".into(),
                reader_timeout: Duration::from_millis(1),
                relock_timeout: Duration::from_millis(60),
                solenoid_settle: Duration::from_millis(1),
                theft_window: Duration::from_millis(50),
                init_locked,
            },
            Arc::clone(&reader) as Arc<dyn CardReader>,
            test_catalog(),
            Arc::clone(&pin) as Arc<dyn DigitalOutput>,
        );
        let log = Arc::new(Mutex::new(Vec::new()));
        let push = |log: &Arc<Mutex<Vec<String>>>, tag: &'static str| {
            let log = Arc::clone(log);
            move |_: &str, detail: String| log.lock().push(format!("{tag}{detail}"))
        };
        {
            let f = push(&log, "found:");
            slot.events
                .key_found
                .add_listener("t", move |o, k: &KeyRecord| f(o, k.id.clone()));
        }
        {
            let f = push(&log, "uninserted:");
            slot.events
                .key_uninserted
                .add_listener("t", move |o, k: &KeyRecord| f(o, k.id.clone()));
        }
        {
            let f = push(&log, "stolen:");
            slot.events
                .key_stolen
                .add_listener("t", move |o, r: &TheftReport| {
                    f(
                        o,
                        format!(
                            "{}>{}",
                            r.uid,
                            r.replacement.clone().unwrap_or_else(|| "-".into())
                        ),
                    )
                });
        }
        {
            let f = push(&log, "unauthorized:");
            slot.events
                .unauthorized_place
                .add_listener("t", move |o, k: &KeyRecord| f(o, k.id.clone()));
        }
        {
            let f = push(&log, "unknown:");
            slot.events
                .unknown_key_placed
                .add_listener("t", move |o, uid: &String| f(o, uid.clone()));
        }
        {
            let f = push(&log, "locked:");
            slot.events
                .solenoid_locked
                .add_listener("t", move |o, c: &LockCause| {
                    f(
                        o,
                        match c {
                            LockCause::KeyInserted(_) => "insert".into(),
                            LockCause::KeyRemoved(_) => "remove".into(),
                            LockCause::AutoRelock => "auto".into(),
                            LockCause::Bootstrap => "bootstrap".into(),
                        },
                    )
                });
        }
        {
            let f = push(&log, "relocked");
            slot.events
                .relocked
                .add_listener("t", move |o, _: &()| f(o, String::new()));
        }
        Rig {
            slot,
            reader,
            pin,
            log,
        }
    }

    fn drain(rig: &Rig) -> Vec<String> {
        std::mem::take(&mut *rig.log.lock())
    }

    #[test]
    fn bootstrap_quick_locks_on_first_tick() {
        let rig = rig(false);
        assert!(!rig.slot.is_locked());
        rig.slot.tick();
        assert!(rig.slot.is_locked());
        assert!(!rig.pin.is_high());
        assert_eq!(drain(&rig), vec!["locked:bootstrap"]);
        // only once
        rig.slot.tick();
        assert!(drain(&rig).is_empty());
    }

    #[test]
    fn insertion_emits_key_found_and_locks() {
        let rig = rig(true);
        rig.slot.unlock();
        rig.reader.set_card(Some("aa11"));
        rig.slot.tick();
        assert!(rig.slot.is_locked());
        assert_eq!(rig.slot.current_key().unwrap().id, "k1");
        assert_eq!(drain(&rig), vec!["found:k1", "locked:insert"]);
        // debounce: the key stays put, nothing more happens
        rig.slot.tick();
        assert!(drain(&rig).is_empty());
    }

    #[test]
    fn unknown_card_in_unlocked_slot_does_not_lock() {
        let rig = rig(true);
        rig.slot.unlock();
        rig.reader.set_card(Some("ffff"));
        rig.slot.tick();
        assert!(!rig.slot.is_locked());
        assert!(rig.slot.current_key().is_none());
        assert_eq!(drain(&rig), vec!["unknown:ffff"]);
    }

    #[test]
    fn removal_emits_key_uninserted_and_relocks() {
        let rig = rig(true);
        rig.slot.unlock();
        rig.reader.set_card(Some("aa11"));
        rig.slot.tick();
        drain(&rig);
        rig.slot.unlock();
        rig.reader.set_card(None);
        rig.slot.tick();
        assert!(rig.slot.is_locked());
        assert!(rig.slot.current_key().is_none());
        assert_eq!(drain(&rig), vec!["uninserted:k1", "locked:remove"]);
    }

    // Puts key k1 in the slot and returns to the locked baseline.
    fn with_key_inserted(rig: &Rig) {
        rig.slot.unlock();
        rig.reader.set_card(Some("aa11"));
        rig.slot.tick();
        drain(rig);
        assert!(rig.slot.is_locked());
    }

    #[test]
    fn theft_fires_once_after_window() {
        let rig = rig(true);
        with_key_inserted(&rig);
        rig.reader.set_card(None);
        rig.slot.tick();
        // window open, no verdict yet
        assert!(drain(&rig).is_empty());
        thread::sleep(Duration::from_millis(70));
        rig.slot.tick();
        assert_eq!(drain(&rig), vec!["stolen:aa11>-"]);
        assert!(rig.slot.current_key().is_none());
        // no repeat verdict
        rig.slot.tick();
        assert!(drain(&rig).is_empty());
    }

    #[test]
    fn glitch_recovery_is_silent() {
        let rig = rig(true);
        with_key_inserted(&rig);
        rig.reader.set_card(None);
        rig.slot.tick();
        rig.reader.set_card(Some("aa11"));
        rig.slot.tick();
        assert!(drain(&rig).is_empty());
        assert_eq!(rig.slot.current_key().unwrap().id, "k1");
        // the returned key keeps debouncing quietly
        rig.slot.tick();
        assert!(drain(&rig).is_empty());
    }

    #[test]
    fn deceptive_swap_reports_replacement() {
        let rig = rig(true);
        with_key_inserted(&rig);
        rig.reader.set_card(None);
        rig.slot.tick();
        rig.reader.set_card(Some("bb22"));
        rig.slot.tick();
        assert_eq!(drain(&rig), vec!["stolen:aa11>bb22"]);
        assert!(rig.slot.current_key().is_none());
    }

    #[test]
    fn known_key_placed_in_locked_slot_is_unauthorized() {
        let rig = rig(false);
        rig.slot.tick(); // bootstrap lock
        drain(&rig);
        rig.reader.set_card(Some("bb22"));
        rig.slot.tick();
        assert_eq!(drain(&rig), vec!["unauthorized:k2"]);
        assert!(rig.slot.is_locked());
    }

    #[test]
    fn unknown_card_in_locked_slot() {
        let rig = rig(false);
        rig.slot.tick();
        drain(&rig);
        rig.reader.set_card(Some("dead"));
        rig.slot.tick();
        assert_eq!(drain(&rig), vec!["unknown:dead"]);
    }

    #[test]
    fn reader_fault_opens_window_not_alarm() {
        let rig = rig(true);
        with_key_inserted(&rig);
        rig.reader.set_fault();
        rig.slot.tick();
        assert!(drain(&rig).is_empty());
        // the fault cleared and the key is still there: silent recovery
        rig.reader.set_card(Some("aa11"));
        rig.slot.tick();
        assert!(drain(&rig).is_empty());
        assert_eq!(rig.slot.current_key().unwrap().id, "k1");
    }

    #[test]
    fn bus_contention_skips_the_tick() {
        let rig = rig(true);
        with_key_inserted(&rig);
        rig.reader.set_busy();
        rig.slot.tick();
        rig.reader.set_card(Some("aa11"));
        rig.slot.tick();
        // a skipped tick must not disturb the debounce baseline
        assert!(drain(&rig).is_empty());
    }

    #[test]
    fn auto_relock_returns_slot_to_locked() {
        let rig = rig(true);
        rig.slot.unlock();
        assert!(!rig.slot.is_locked());
        thread::sleep(Duration::from_millis(140));
        assert!(rig.slot.is_locked());
        assert_eq!(drain(&rig), vec!["locked:auto", "relocked"]);
    }

    #[test]
    fn insertion_cancels_auto_relock() {
        let rig = rig(true);
        rig.slot.unlock();
        rig.reader.set_card(Some("aa11"));
        rig.slot.tick();
        drain(&rig);
        thread::sleep(Duration::from_millis(140));
        // the timer was cancelled by the insert lock: no auto/relocked events
        assert!(drain(&rig).is_empty());
        assert!(rig.slot.is_locked());
    }
}
