//! Register-level MFRC522 driver, trimmed to what UID polling needs.
//!
//! All readers share one SPI bus; this driver never touches the bus without
//! holding its chip-select line through the arbiter. Callers hold the line
//! for a whole poll (acquisitions are reentrant), so the per-transaction
//! acquire below is nearly free and keeps single register accesses safe too.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, info};
use parking_lot::Mutex;
use rppal::spi::Spi;

use crate::bus::LineHandle;
use crate::error::Result;
use crate::rfid::constants::*;

pub struct Mfrc522 {
    spi: Arc<Mutex<Spi>>,
    select: LineHandle,
}

impl Mfrc522 {
    /// Wraps a shared SPI handle and one chip-select line, then initializes
    /// the chip: soft reset, timer and modulation setup, version probe.
    pub fn new(spi: Arc<Mutex<Spi>>, select: LineHandle) -> Result<Self> {
        let chip = Mfrc522 { spi, select };
        chip.init()?;
        Ok(chip)
    }

    /// The chip-select line this chip answers on; hold it across a poll so
    /// per-register acquisitions stay reentrant no-ops.
    pub fn select_handle(&self) -> &LineHandle {
        &self.select
    }

    fn init(&self) -> Result<()> {
        let _cs = self.select.acquire(None)?;

        // Soft reset
        self.write_register(COMMAND_REG, PCD_RESETPHASE)?;
        thread::sleep(Duration::from_millis(50));

        // Timer: TAuto=1, prescaler and reload for ~25ms timeouts
        self.write_register(T_MODE_REG, 0x8D)?;
        self.write_register(T_PRESCALER_REG, 0x3E)?;
        self.write_register(T_RELOAD_REG_L, 30)?;
        self.write_register(T_RELOAD_REG_H, 0)?;

        // 100% ASK modulation, CRC preset 0x6363
        self.write_register(TX_AUTO_REG, 0x40)?;
        self.write_register(MODE_REG, 0x3D)?;

        let version = self.read_register(VERSION_REG)?;
        let version_text = match version {
            0x88 => "Clone",
            0x90 => "v0.0",
            0x91 => "v1.0",
            0x92 => "v2.0",
            0xB2 => "FM17522",
            _ => "Unknown",
        };
        info!("MFRC522 version: {version_text} (0x{version:02X})");

        // Idle with the antenna off until a poll starts.
        self.antenna_off()?;
        Ok(())
    }

    pub fn write_register(&self, reg: u8, value: u8) -> Result<()> {
        let _cs = self.select.acquire(None)?;
        let tx_buf = [(reg << 1) & 0x7E, value];
        let mut rx_buf = [0u8; 2];
        self.spi.lock().transfer(&mut rx_buf, &tx_buf)?;
        Ok(())
    }

    pub fn read_register(&self, reg: u8) -> Result<u8> {
        let _cs = self.select.acquire(None)?;
        let tx_buf = [((reg << 1) & 0x7E) | 0x80, 0x00];
        let mut rx_buf = [0u8; 2];
        self.spi.lock().transfer(&mut rx_buf, &tx_buf)?;
        Ok(rx_buf[1])
    }

    fn set_bit_mask(&self, reg: u8, mask: u8) -> Result<()> {
        let current = self.read_register(reg)?;
        self.write_register(reg, current | mask)
    }

    fn clear_bit_mask(&self, reg: u8, mask: u8) -> Result<()> {
        let current = self.read_register(reg)?;
        self.write_register(reg, current & !mask)
    }

    pub fn antenna_on(&self) -> Result<()> {
        let current = self.read_register(TX_CONTROL_REG)?;
        if (current & 0x03) != 0x03 {
            self.set_bit_mask(TX_CONTROL_REG, 0x03)?;
        }
        Ok(())
    }

    pub fn antenna_off(&self) -> Result<()> {
        self.clear_bit_mask(TX_CONTROL_REG, 0x03)
    }

    /// Idempotent shutdown: antenna off, command register idle.
    pub fn power_down(&self) -> Result<()> {
        let _cs = self.select.acquire(None)?;
        self.antenna_off()?;
        self.write_register(COMMAND_REG, PCD_IDLE)?;
        debug!("MFRC522 powered down");
        Ok(())
    }

    /// One REQA + anticollision attempt. Returns the 4-byte UID when a card
    /// answered, `None` when the field is empty or the answer was garbled.
    pub fn read_uid_once(&self) -> Result<Option<[u8; 4]>> {
        let _cs = self.select.acquire(None)?;

        let (status, _bits) = self.request(PICC_REQIDL)?;
        if status != MI_OK {
            return Ok(None);
        }
        let (status, data) = self.anticoll()?;
        if status != MI_OK || data.len() != 5 {
            return Ok(None);
        }
        Ok(Some([data[0], data[1], data[2], data[3]]))
    }

    fn request(&self, req_mode: u8) -> Result<(u8, usize)> {
        // Short frame: 7 bits
        self.write_register(BIT_FRAMING_REG, 0x07)?;
        let (status, _back_data, back_bits) = self.to_card(PCD_TRANSCEIVE, &[req_mode])?;
        if status != MI_OK || back_bits != 0x10 {
            return Ok((MI_ERR, 0));
        }
        Ok((MI_OK, back_bits))
    }

    fn anticoll(&self) -> Result<(u8, Vec<u8>)> {
        self.write_register(BIT_FRAMING_REG, 0x00)?;
        let (status, back_data, _) = self.to_card(PCD_TRANSCEIVE, &[PICC_ANTICOLL, 0x20])?;
        if status == MI_OK {
            if back_data.len() != 5 {
                return Ok((MI_ERR, vec![]));
            }
            let mut check_sum: u8 = 0;
            for byte in &back_data[..4] {
                check_sum ^= byte;
            }
            if check_sum != back_data[4] {
                return Ok((MI_ERR, vec![]));
            }
        }
        Ok((status, back_data))
    }

    /// Run one chip command with data through the FIFO, polling the IRQ
    /// register until completion or the chip's own timer gives up.
    fn to_card(&self, command: u8, data: &[u8]) -> Result<(u8, Vec<u8>, usize)> {
        let mut back_data: Vec<u8> = Vec::new();
        let mut back_len: usize = 0;
        let mut status = MI_ERR;

        let (irq_en, wait_irq): (u8, u8) = match command {
            PCD_TRANSCEIVE => (0x77, 0x30),
            _ => (0x00, 0x00),
        };

        self.write_register(COM_IEN_REG, irq_en | 0x80)?;
        self.clear_bit_mask(COM_IRQ_REG, 0x80)?;
        // FlushBuffer=1, FIFO initialization
        self.set_bit_mask(FIFO_LEVEL_REG, 0x80)?;
        self.write_register(COMMAND_REG, PCD_IDLE)?;

        for &byte in data {
            self.write_register(FIFO_DATA_REG, byte)?;
        }

        self.write_register(COMMAND_REG, command)?;
        if command == PCD_TRANSCEIVE {
            // StartSend=1
            self.set_bit_mask(BIT_FRAMING_REG, 0x80)?;
        }

        let mut i = 2000;
        let mut n: u8;
        loop {
            n = self.read_register(COM_IRQ_REG)?;
            i -= 1;
            // RxIRq or IdleIRq or the timer fired, or we gave up
            if (i == 0) || ((n & 0x01) != 0) || ((n & wait_irq) != 0) {
                break;
            }
            thread::sleep(Duration::from_micros(100));
        }

        self.clear_bit_mask(BIT_FRAMING_REG, 0x80)?;

        if i != 0 {
            if (self.read_register(ERROR_REG)? & 0x1B) == 0x00 {
                status = MI_OK;
                if (n & irq_en & 0x01) != 0 {
                    status = MI_NOTAGERR;
                }
                if command == PCD_TRANSCEIVE {
                    let mut fifo_len = self.read_register(FIFO_LEVEL_REG)? as usize;
                    let last_bits = (self.read_register(CONTROL_REG)? & 0x07) as usize;
                    if last_bits != 0 {
                        back_len = (fifo_len - 1) * 8 + last_bits;
                    } else {
                        back_len = fifo_len * 8;
                    }
                    if fifo_len == 0 {
                        fifo_len = 1;
                    }
                    let read_len = fifo_len.min(MAX_LEN);
                    for _ in 0..read_len {
                        back_data.push(self.read_register(FIFO_DATA_REG)?);
                    }
                }
            } else {
                status = MI_ERR;
            }
        }

        Ok((status, back_data, back_len))
    }
}
