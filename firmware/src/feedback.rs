//! Status LED feedback.
//!
//! Patterns:
//! - info (ready, connecting): solid on
//! - success: short flash, then solid on
//! - error: three flashes, then off

use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::gpio::{AnyOutputPin, Output, PinDriver};
use esp_idf_svc::sys::EspError;
use log::warn;
use tapstation_core::{FeedbackSink, Notification, Severity};

const FLASH_MS: u32 = 120;

pub struct LedSink {
    led: PinDriver<'static, AnyOutputPin, Output>,
}

impl LedSink {
    pub fn new(led: PinDriver<'static, AnyOutputPin, Output>) -> Self {
        Self { led }
    }

    fn flash(&mut self, times: u32) -> Result<(), EspError> {
        for _ in 0..times {
            self.led.set_low()?;
            FreeRtos::delay_ms(FLASH_MS);
            self.led.set_high()?;
            FreeRtos::delay_ms(FLASH_MS);
        }
        Ok(())
    }

    fn show(&mut self, severity: Severity) -> Result<(), EspError> {
        match severity {
            Severity::Info => self.led.set_high(),
            Severity::Success => self.flash(1),
            Severity::Error => {
                self.flash(3)?;
                self.led.set_low()
            }
        }
    }
}

impl FeedbackSink for LedSink {
    fn emit(&mut self, notification: &Notification) {
        if let Err(e) = self.show(notification.severity) {
            warn!("Status LED unavailable: {:?}", e);
        }
    }
}
