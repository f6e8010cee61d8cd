//! NFC module for PN5180 NFC reader.
//!
//! The PN5180 is a high-performance NFC frontend; the terminal only uses its
//! ISO14443A (MIFARE, NTAG, most access cards) reader mode.
//!
//! Interface: SPI (up to 7 MHz) + BUSY + RST pins
//!
//! Wiring on an ESP32 DevKit (VSPI):
//!
//! - IO18 -> SPI SCK
//! - IO19 -> SPI MISO
//! - IO23 -> SPI MOSI
//! - IO5  -> NSS chip select
//! - IO16 -> BUSY signal
//! - IO17 -> RST reset

pub mod pn5180;

pub use pn5180::Pn5180;
