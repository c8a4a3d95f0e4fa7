use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the controller library.
///
/// Only configuration and hardware-init failures are fatal; everything else
/// is converted to events or response messages close to where it happens.
#[derive(Debug, Error)]
pub enum Error {
    /// A timed chip-select acquisition gave up; the caller skips this tick.
    #[error("chip-select bus is busy")]
    BusBusy,

    /// Persistent reader hardware failure for one poll.
    #[error("card reader fault: {0}")]
    Reader(String),

    #[error("cannot read {}: {source}", .path.display())]
    File {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("invalid catalog: {0}")]
    Catalog(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[cfg(feature = "rpi")]
    #[error("SPI error: {0}")]
    Spi(#[from] rppal::spi::Error),

    #[cfg(feature = "rpi")]
    #[error("GPIO error: {0}")]
    Gpio(#[from] rppal::gpio::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
