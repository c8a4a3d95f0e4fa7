//! MFRC522 command and register subset used for UID polling.

// MFRC522 Commands
pub const PCD_IDLE: u8 = 0x00;
pub const PCD_TRANSCEIVE: u8 = 0x0C;
pub const PCD_RESETPHASE: u8 = 0x0F;

// MIFARE Commands
pub const PICC_REQIDL: u8 = 0x26;
pub const PICC_ANTICOLL: u8 = 0x93;

// Status codes
pub const MI_OK: u8 = 0;
pub const MI_NOTAGERR: u8 = 1;
pub const MI_ERR: u8 = 2;

// MFRC522 Registers
pub const COMMAND_REG: u8 = 0x01;
pub const COM_IEN_REG: u8 = 0x02;
pub const COM_IRQ_REG: u8 = 0x04;
pub const ERROR_REG: u8 = 0x06;
pub const FIFO_DATA_REG: u8 = 0x09;
pub const FIFO_LEVEL_REG: u8 = 0x0A;
pub const CONTROL_REG: u8 = 0x0C;
pub const BIT_FRAMING_REG: u8 = 0x0D;

pub const MODE_REG: u8 = 0x11;
pub const TX_CONTROL_REG: u8 = 0x14;
pub const TX_AUTO_REG: u8 = 0x15;

pub const T_MODE_REG: u8 = 0x2A;
pub const T_PRESCALER_REG: u8 = 0x2B;
pub const T_RELOAD_REG_H: u8 = 0x2C;
pub const T_RELOAD_REG_L: u8 = 0x2D;

pub const VERSION_REG: u8 = 0x37;

/// FIFO depth of the chip.
pub const MAX_LEN: usize = 16;

pub const SPI_FREQUENCY_HZ: u32 = 1_000_000;
