pub mod key_slot;
pub mod solenoid;
pub mod user_slot;

pub use key_slot::{KeySlot, KeySlotEvents, LockCause, SlotConfig, TheftReport};
pub use solenoid::SolenoidLock;
pub use user_slot::UserSlot;
