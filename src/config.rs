//! Controller configuration, loaded once at startup from a JSON5 file.
//!
//! Every field has a default matching the reference cabinet (two key slots,
//! BCM pin map of the original wiring), so an empty `{}` file yields a
//! runnable configuration.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerConfig {
    /// Bounded card poll per tick, milliseconds.
    pub reader_timeout_ms: u64,
    /// How long a slot stays unlocked before the automatic relock.
    pub relock_timeout_ms: u64,
    /// Settle delay before de-energizing, letting a hand clear the slot.
    pub solenoid_settle_ms: u64,
    /// How long a key may be unreadable before it is ruled stolen.
    pub theft_window_ms: u64,
    /// Session lifetime when no unlock is requested; also the capability
    /// expiry horizon.
    pub session_timeout_s: u64,
    pub main_loop_delay_us: u64,
    pub listen_port: u16,

    pub database_file: PathBuf,
    pub passwords_file: PathBuf,
    pub secret_file: PathBuf,
    pub tls_cert_file: PathBuf,
    pub tls_key_file: PathBuf,

    pub pins: PinConfig,
    pub slots: Vec<SlotPins>,
}

/// Shared pins (BCM numbering).
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PinConfig {
    /// Reset line shared by all MFRC522s; pulsed once at startup.
    pub reader_reset: u8,
    /// Chip select of the user-identification reader.
    pub user_reader_select: u8,
}

/// Wiring of one key slot.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SlotPins {
    pub name: String,
    /// Chip-select line of the slot's reader.
    pub reader_select: u8,
    /// Solenoid driver pin; high energizes (unlocks).
    pub solenoid: u8,
}

impl Default for PinConfig {
    fn default() -> Self {
        PinConfig {
            reader_reset: 22,
            user_reader_select: 25,
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            reader_timeout_ms: 100,
            relock_timeout_ms: 5_000,
            solenoid_settle_ms: 2_000,
            theft_window_ms: 1_000,
            session_timeout_s: 60,
            main_loop_delay_us: 100,
            listen_port: 2000,
            database_file: PathBuf::from("./database.json5"),
            passwords_file: PathBuf::from("./passwords.json5"),
            secret_file: PathBuf::from("./secret.key"),
            tls_cert_file: PathBuf::from("./cert.pem"),
            tls_key_file: PathBuf::from("./key.pem"),
            pins: PinConfig::default(),
            slots: vec![
                SlotPins {
                    name: "slot-1".to_string(),
                    reader_select: 5,
                    solenoid: 24,
                },
                SlotPins {
                    name: "slot-2".to_string(),
                    reader_select: 6,
                    solenoid: 23,
                },
            ],
        }
    }
}

impl ControllerConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| Error::File {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ControllerConfig = json5::from_str(&text).map_err(|e| Error::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.slots.is_empty() {
            return Err(Error::Config("at least one key slot is required".into()));
        }
        let mut names: Vec<&str> = self.slots.iter().map(|s| s.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        if names.len() != self.slots.len() {
            return Err(Error::Config("slot names must be unique".into()));
        }
        if self.theft_window_ms == 0 {
            return Err(Error::Config("theft_window_ms must be non-zero".into()));
        }
        Ok(())
    }

    pub fn reader_timeout(&self) -> Duration {
        Duration::from_millis(self.reader_timeout_ms)
    }

    pub fn relock_timeout(&self) -> Duration {
        Duration::from_millis(self.relock_timeout_ms)
    }

    pub fn solenoid_settle(&self) -> Duration {
        Duration::from_millis(self.solenoid_settle_ms)
    }

    pub fn theft_window(&self) -> Duration {
        Duration::from_millis(self.theft_window_ms)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_s)
    }

    pub fn main_loop_delay(&self) -> Duration {
        Duration::from_micros(self.main_loop_delay_us)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_reference_cabinet() {
        let config = ControllerConfig::default();
        assert_eq!(config.reader_timeout(), Duration::from_millis(100));
        assert_eq!(config.relock_timeout(), Duration::from_secs(5));
        assert_eq!(config.solenoid_settle(), Duration::from_secs(2));
        assert_eq!(config.theft_window(), Duration::from_millis(1000));
        assert_eq!(config.session_timeout(), Duration::from_secs(60));
        assert_eq!(config.listen_port, 2000);
        assert_eq!(config.slots.len(), 2);
        assert_eq!(config.slots[0].reader_select, 5);
        assert_eq!(config.slots[1].solenoid, 23);
    }

    #[test]
    fn loads_json5_with_partial_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "{{
                // deployment tweaks
                theft_window_ms: 1500,
                listen_port: 2443,
                slots: [{{ name: 'cabinet-a', reader_select: 5, solenoid: 24 }}],
            }}"
        )
        .unwrap();
        let config = ControllerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.theft_window(), Duration::from_millis(1500));
        assert_eq!(config.listen_port, 2443);
        assert_eq!(config.slots.len(), 1);
        assert_eq!(config.slots[0].name, "cabinet-a");
        // untouched fields keep their defaults
        assert_eq!(config.reader_timeout(), Duration::from_millis(100));
    }

    #[test]
    fn rejects_duplicate_slot_names() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "{{ slots: [
                {{ name: 'a', reader_select: 5, solenoid: 24 }},
                {{ name: 'a', reader_select: 6, solenoid: 23 }},
            ] }}"
        )
        .unwrap();
        assert!(ControllerConfig::from_file(file.path()).is_err());
    }
}
