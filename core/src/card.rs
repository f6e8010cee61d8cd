//! Card reader adapter.
//!
//! Wraps the NFC frontend and turns raw UID bytes into the canonical
//! identifier string the attendance service looks cards up by.

use std::fmt;
use std::time::Duration;

use log::{info, warn};

use crate::error::Error;

/// Letter case used for the hex digits of a rendered UID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UidCase {
    #[default]
    Lower,
    Upper,
}

/// Canonical rendering of a card UID: two hex digits per byte, joined by `:`.
///
/// The service does exact-match lookups, so the rendering must not vary.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CardIdentifier(String);

impl CardIdentifier {
    /// Render `bytes` in the default (lower) case.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::from_bytes_with_case(bytes, UidCase::Lower)
    }

    pub fn from_bytes_with_case(bytes: &[u8], case: UidCase) -> Self {
        let groups: Vec<String> = bytes
            .iter()
            .map(|byte| match case {
                UidCase::Lower => hex::encode([*byte]),
                UidCase::Upper => hex::encode_upper([*byte]),
            })
            .collect();
        Self(groups.join(":"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CardIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parse a typed UID such as `04:a2:3f`, `04A23F` or `04 a2 3f` into bytes.
///
/// Returns `None` for empty input, stray characters or an odd digit count.
pub fn parse_hex_uid(text: &str) -> Option<Vec<u8>> {
    let digits: String = text
        .chars()
        .filter(|c| !matches!(c, ':' | ' ' | '-'))
        .collect();
    if digits.is_empty() {
        return None;
    }
    hex::decode(digits).ok()
}

/// Reader firmware version as reported by the frontend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Contactless frontend driver (PN5180, PN532, ...).
pub trait NfcTransceiver {
    type Error: fmt::Debug;

    fn initialize(&mut self) -> Result<(), Self::Error>;

    /// `None` when the chip does not answer.
    fn firmware_version(&mut self) -> Result<Option<FirmwareVersion>, Self::Error>;

    fn configure_reader_mode(&mut self) -> Result<(), Self::Error>;

    /// Raw UID of a card in the field, or `None` if none showed up within
    /// `timeout`.
    fn poll_for_card(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, Self::Error>;
}

pub struct CardReader<T> {
    transceiver: T,
    poll_timeout: Duration,
    case: UidCase,
    firmware: FirmwareVersion,
}

impl<T: NfcTransceiver> CardReader<T> {
    /// Bring the frontend up. A reader that does not report a firmware
    /// version is treated as missing.
    pub fn init(mut transceiver: T, poll_timeout: Duration, case: UidCase) -> Result<Self, Error> {
        transceiver
            .initialize()
            .map_err(|e| Error::ReaderNotFound(format!("init failed: {:?}", e)))?;

        let firmware = match transceiver.firmware_version() {
            Ok(Some(version)) => version,
            Ok(None) => return Err(Error::ReaderNotFound("no firmware version reported".into())),
            Err(e) => return Err(Error::ReaderNotFound(format!("version query failed: {:?}", e))),
        };
        info!("NFC reader firmware {}", firmware);

        transceiver
            .configure_reader_mode()
            .map_err(|e| Error::ReaderNotFound(format!("reader mode setup failed: {:?}", e)))?;
        info!("NFC reader ready (poll timeout {}ms)", poll_timeout.as_millis());

        Ok(Self {
            transceiver,
            poll_timeout,
            case,
            firmware,
        })
    }

    /// Look for a card in the field. Absence and read glitches both yield
    /// `None`.
    pub fn poll(&mut self) -> Option<CardIdentifier> {
        match self.transceiver.poll_for_card(self.poll_timeout) {
            Ok(Some(uid)) if uid.is_empty() => {
                warn!("Reader reported an empty UID, ignoring");
                None
            }
            Ok(Some(uid)) => Some(CardIdentifier::from_bytes_with_case(&uid, self.case)),
            Ok(None) => None,
            Err(e) => {
                warn!("Card poll failed: {:?}", e);
                None
            }
        }
    }

    pub fn firmware(&self) -> FirmwareVersion {
        self.firmware
    }
}
