pub mod constants;
#[cfg(feature = "rpi")]
pub mod mfrc522;
pub mod reader;

pub use reader::{CardReader, MemoryReader};
#[cfg(feature = "rpi")]
pub use reader::Mfrc522Reader;
