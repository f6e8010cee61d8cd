//! TapStation core
//!
//! Attendance-reporting state machine for the TapStation NFC terminal.
//! Hardware and network access are behind traits ([`NfcTransceiver`],
//! [`NetworkLink`], [`HttpTransport`], [`FeedbackSink`], [`Clock`]) so the
//! same session logic runs on the ESP32 firmware, in the desktop simulator
//! and under test.

pub mod card;
pub mod clock;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod feedback;
pub mod reporter;
pub mod session;

#[cfg(test)]
mod testing;

pub use card::{parse_hex_uid, CardIdentifier, CardReader, FirmwareVersion, NfcTransceiver, UidCase};
pub use clock::{Clock, SystemClock};
pub use config::{Config, PortalConfig, ReconnectPolicy, SessionTiming, WifiCredentials};
pub use connectivity::{ConnectivityManager, ConnectivityState, NetworkLink};
pub use error::{ConfigError, Error};
pub use feedback::{FeedbackSink, LogSink, Notification, Severity, Tee};
pub use reporter::{
    AttendanceOutcome, AttendanceReporter, HttpRequest, HttpResponse, HttpTransport, Method, ServiceStatus,
};
pub use session::{halt_forever, Cycle, SessionController};
