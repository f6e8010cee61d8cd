//! PN5180 NFC controller driver.
//!
//! The PN5180 communicates via SPI with the following pins:
//! - MOSI, MISO, SCLK - Standard SPI
//! - NSS - Chip select (handled by the SPI device driver, active low)
//! - BUSY - Indicates when chip is processing (active high)
//! - RST - Hardware reset (active low)
//!
//! Commands are sent as:
//! [CMD_BYTE] [PAYLOAD...]
//!
//! Responses are read in a separate frame after BUSY goes low.
//!
//! Only what the attendance terminal needs is implemented: firmware version,
//! ISO14443A reader mode and UID activation (REQA, anticollision, select)
//! over all three cascade levels.

use std::time::Duration;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::spi::SpiDevice;
use log::{debug, info};
use tapstation_core::{FirmwareVersion, NfcTransceiver};

/// PN5180 command codes
pub mod commands {
    pub const WRITE_REGISTER: u8 = 0x00;
    pub const WRITE_REGISTER_OR_MASK: u8 = 0x01;
    pub const WRITE_REGISTER_AND_MASK: u8 = 0x02;
    pub const READ_REGISTER: u8 = 0x04;
    pub const READ_EEPROM: u8 = 0x07;
    pub const SEND_DATA: u8 = 0x09;
    pub const READ_DATA: u8 = 0x0A;
    pub const LOAD_RF_CONFIG: u8 = 0x11;
    pub const RF_ON: u8 = 0x16;
    pub const RF_OFF: u8 = 0x17;
}

/// PN5180 register addresses
pub mod registers {
    pub const SYSTEM_CONFIG: u8 = 0x00;
    pub const IRQ_STATUS: u8 = 0x02;
    pub const IRQ_CLEAR: u8 = 0x03;
    pub const CRC_RX_CONFIG: u8 = 0x12;
    pub const RX_STATUS: u8 = 0x13;
    pub const CRC_TX_CONFIG: u8 = 0x19;
    pub const RF_STATUS: u8 = 0x1D;
}

/// EEPROM addresses
mod eeprom {
    pub const FIRMWARE_VERSION: u8 = 0x12;
}

/// RF configuration protocols
pub mod rf_config {
    pub const ISO_14443A_106_TX: u8 = 0x00;
    pub const ISO_14443A_106_RX: u8 = 0x80;
}

/// ISO14443A frame bytes
mod iso14443a {
    pub const REQA: u8 = 0x26;
    pub const HLTA: [u8; 2] = [0x50, 0x00];
    /// SEL command per cascade level
    pub const SELECT: [u8; 3] = [0x93, 0x95, 0x97];
    pub const NVB_ANTICOLLISION: u8 = 0x20;
    pub const NVB_SELECT: u8 = 0x70;
    pub const CASCADE_TAG: u8 = 0x88;
    pub const SAK_UID_INCOMPLETE: u8 = 0x04;
}

const RX_IRQ: u32 = 1 << 0;
const BUSY_TIMEOUT_MS: u32 = 100;
const RX_WAIT_MS: u32 = 5;
const POLL_INTERVAL_MS: u32 = 10;

/// PN5180 errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pn5180Error {
    SpiError,
    GpioError,
    Timeout,
    InvalidResponse,
}

/// ISO 14443A card info
#[derive(Debug, Clone)]
pub struct Iso14443aCard {
    /// UID (4, 7, or 10 bytes)
    pub uid: Vec<u8>,
    /// ATQA (2 bytes)
    pub atqa: [u8; 2],
    /// SAK byte of the last cascade level
    pub sak: u8,
}

pub struct Pn5180<SPI, BUSY, RST, D> {
    spi: SPI,
    busy: BUSY,
    rst: RST,
    delay: D,
    rf_on: bool,
}

impl<SPI, BUSY, RST, D> Pn5180<SPI, BUSY, RST, D>
where
    SPI: SpiDevice,
    BUSY: InputPin,
    RST: OutputPin,
    D: DelayNs,
{
    pub fn new(spi: SPI, busy: BUSY, rst: RST, delay: D) -> Self {
        Self {
            spi,
            busy,
            rst,
            delay,
            rf_on: false,
        }
    }

    fn wait_ready(&mut self) -> Result<(), Pn5180Error> {
        for _ in 0..BUSY_TIMEOUT_MS {
            if !self.busy.is_high().map_err(|_| Pn5180Error::GpioError)? {
                return Ok(());
            }
            self.delay.delay_ms(1);
        }
        Err(Pn5180Error::Timeout)
    }

    fn send_command(&mut self, frame: &[u8]) -> Result<(), Pn5180Error> {
        self.wait_ready()?;
        self.spi.write(frame).map_err(|_| Pn5180Error::SpiError)?;
        self.wait_ready()
    }

    fn transceive_command(&mut self, frame: &[u8], response: &mut [u8]) -> Result<(), Pn5180Error> {
        self.send_command(frame)?;
        response.fill(0xFF);
        self.spi
            .transfer_in_place(response)
            .map_err(|_| Pn5180Error::SpiError)?;
        self.wait_ready()
    }

    fn write_register(&mut self, reg: u8, value: u32) -> Result<(), Pn5180Error> {
        let v = value.to_le_bytes();
        self.send_command(&[commands::WRITE_REGISTER, reg, v[0], v[1], v[2], v[3]])
    }

    fn write_register_or_mask(&mut self, reg: u8, mask: u32) -> Result<(), Pn5180Error> {
        let m = mask.to_le_bytes();
        self.send_command(&[commands::WRITE_REGISTER_OR_MASK, reg, m[0], m[1], m[2], m[3]])
    }

    fn write_register_and_mask(&mut self, reg: u8, mask: u32) -> Result<(), Pn5180Error> {
        let m = mask.to_le_bytes();
        self.send_command(&[commands::WRITE_REGISTER_AND_MASK, reg, m[0], m[1], m[2], m[3]])
    }

    fn read_register(&mut self, reg: u8) -> Result<u32, Pn5180Error> {
        let mut buf = [0u8; 4];
        self.transceive_command(&[commands::READ_REGISTER, reg], &mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn read_eeprom(&mut self, addr: u8, buf: &mut [u8]) -> Result<(), Pn5180Error> {
        self.transceive_command(&[commands::READ_EEPROM, addr, buf.len() as u8], buf)
    }

    fn load_rf_config(&mut self, tx: u8, rx: u8) -> Result<(), Pn5180Error> {
        self.send_command(&[commands::LOAD_RF_CONFIG, tx, rx])
    }

    fn set_rf(&mut self, on: bool) -> Result<(), Pn5180Error> {
        if on {
            self.send_command(&[commands::RF_ON, 0x00])?;
        } else {
            self.send_command(&[commands::RF_OFF, 0x00])?;
        }
        self.rf_on = on;
        Ok(())
    }

    fn set_crc(&mut self, enabled: bool) -> Result<(), Pn5180Error> {
        if enabled {
            self.write_register_or_mask(registers::CRC_RX_CONFIG, 0x0000_0001)?;
            self.write_register_or_mask(registers::CRC_TX_CONFIG, 0x0000_0001)
        } else {
            self.write_register_and_mask(registers::CRC_RX_CONFIG, 0xFFFF_FFFE)?;
            self.write_register_and_mask(registers::CRC_TX_CONFIG, 0xFFFF_FFFE)
        }
    }

    /// Put the transceiver into TRANSCEIVE state and send `data`.
    /// `valid_bits` is the bit count of the last byte (0 = all 8).
    fn send_data(&mut self, data: &[u8], valid_bits: u8) -> Result<(), Pn5180Error> {
        self.write_register(registers::IRQ_CLEAR, 0x000F_FFFF)?;
        // Idle, then transceive
        self.write_register_and_mask(registers::SYSTEM_CONFIG, 0xFFFF_FFF8)?;
        self.write_register_or_mask(registers::SYSTEM_CONFIG, 0x0000_0003)?;

        let mut frame = Vec::with_capacity(data.len() + 2);
        frame.push(commands::SEND_DATA);
        frame.push(valid_bits);
        frame.extend_from_slice(data);
        self.send_command(&frame)
    }

    /// Wait for a reception and read it. `Ok(None)` when nothing answered.
    fn receive(&mut self, max_len: usize) -> Result<Option<Vec<u8>>, Pn5180Error> {
        let mut received = false;
        for _ in 0..RX_WAIT_MS {
            if self.read_register(registers::IRQ_STATUS)? & RX_IRQ != 0 {
                received = true;
                break;
            }
            self.delay.delay_ms(1);
        }
        if !received {
            return Ok(None);
        }

        let len = (self.read_register(registers::RX_STATUS)? & 0x1FF) as usize;
        if len == 0 {
            return Ok(None);
        }
        if len > max_len {
            return Err(Pn5180Error::InvalidResponse);
        }
        let mut buf = vec![0u8; len];
        self.transceive_command(&[commands::READ_DATA, 0x00], &mut buf)?;
        Ok(Some(buf))
    }

    /// One REQA / anticollision / select round. `Ok(None)` if no card
    /// answered REQA.
    pub fn activate_type_a(&mut self) -> Result<Option<Iso14443aCard>, Pn5180Error> {
        self.write_register_and_mask(registers::SYSTEM_CONFIG, 0xFFFF_FFBF)?;
        self.set_crc(false)?;

        self.send_data(&[iso14443a::REQA], 7)?;
        let atqa = match self.receive(2)? {
            Some(bytes) if bytes.len() == 2 => [bytes[0], bytes[1]],
            Some(_) => return Err(Pn5180Error::InvalidResponse),
            None => return Ok(None),
        };

        let mut uid = Vec::with_capacity(10);
        let mut sak = 0;
        for select in iso14443a::SELECT {
            self.set_crc(false)?;
            self.send_data(&[select, iso14443a::NVB_ANTICOLLISION], 0)?;
            let level = match self.receive(5)? {
                Some(bytes) if bytes.len() == 5 => bytes,
                _ => return Err(Pn5180Error::InvalidResponse),
            };
            let bcc = level[0] ^ level[1] ^ level[2] ^ level[3];
            if bcc != level[4] {
                debug!("BCC mismatch at cascade level {:#04x}", select);
                return Err(Pn5180Error::InvalidResponse);
            }

            self.set_crc(true)?;
            let mut frame = vec![select, iso14443a::NVB_SELECT];
            frame.extend_from_slice(&level);
            self.send_data(&frame, 0)?;
            sak = match self.receive(1)? {
                Some(bytes) if bytes.len() == 1 => bytes[0],
                _ => return Err(Pn5180Error::InvalidResponse),
            };

            if sak & iso14443a::SAK_UID_INCOMPLETE != 0 {
                if level[0] != iso14443a::CASCADE_TAG {
                    return Err(Pn5180Error::InvalidResponse);
                }
                uid.extend_from_slice(&level[1..4]);
            } else {
                uid.extend_from_slice(&level[0..4]);
                break;
            }
        }
        if sak & iso14443a::SAK_UID_INCOMPLETE != 0 {
            return Err(Pn5180Error::InvalidResponse);
        }

        // Park the card so it does not answer the next REQA while held
        self.send_data(&iso14443a::HLTA, 0)?;

        Ok(Some(Iso14443aCard { uid, atqa, sak }))
    }
}

impl<SPI, BUSY, RST, D> NfcTransceiver for Pn5180<SPI, BUSY, RST, D>
where
    SPI: SpiDevice,
    BUSY: InputPin,
    RST: OutputPin,
    D: DelayNs,
{
    type Error = Pn5180Error;

    fn initialize(&mut self) -> Result<(), Pn5180Error> {
        info!("PN5180 hardware reset");
        self.rst.set_low().map_err(|_| Pn5180Error::GpioError)?;
        self.delay.delay_ms(10);
        self.rst.set_high().map_err(|_| Pn5180Error::GpioError)?;
        self.delay.delay_ms(10);
        self.wait_ready()
    }

    fn firmware_version(&mut self) -> Result<Option<FirmwareVersion>, Pn5180Error> {
        let mut buf = [0u8; 2];
        self.read_eeprom(eeprom::FIRMWARE_VERSION, &mut buf)?;
        // A floating MISO reads all ones, a missing chip all zeros
        if buf == [0xFF, 0xFF] || buf == [0x00, 0x00] {
            return Ok(None);
        }
        Ok(Some(FirmwareVersion {
            major: buf[1],
            minor: buf[0],
            patch: 0,
        }))
    }

    fn configure_reader_mode(&mut self) -> Result<(), Pn5180Error> {
        self.load_rf_config(rf_config::ISO_14443A_106_TX, rf_config::ISO_14443A_106_RX)?;
        self.set_rf(true)?;
        let rf_status = self.read_register(registers::RF_STATUS)?;
        debug!("RF field on, RF_STATUS={:#010x}", rf_status);
        Ok(())
    }

    fn poll_for_card(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, Pn5180Error> {
        if !self.rf_on {
            self.configure_reader_mode()?;
        }
        let attempts = (timeout.as_millis() as u32 / POLL_INTERVAL_MS).max(1);
        for _ in 0..attempts {
            if let Some(card) = self.activate_type_a()? {
                debug!("ISO14443A card: ATQA={:02x?} SAK={:#04x}", card.atqa, card.sak);
                return Ok(Some(card.uid));
            }
            self.delay.delay_ms(POLL_INTERVAL_MS);
        }
        Ok(None)
    }
}
