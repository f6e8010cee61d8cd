//! Stdin console: card taps and link commands typed by the operator.

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use log::{info, warn};
use tapstation_core::{parse_hex_uid, FirmwareVersion, NfcTransceiver};

use crate::link::LinkControl;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Tap(Vec<u8>),
    Drop,
    Outage,
    TogglePortal,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "" => None,
            "drop" => Some(Command::Drop),
            "outage" => Some(Command::Outage),
            "portal" => Some(Command::TogglePortal),
            "quit" | "exit" | "q" => Some(Command::Quit),
            other => parse_hex_uid(other).map(Command::Tap),
        }
    }
}

/// Events the card reader consumes in typing order, so a `quit` after a
/// batch of taps only takes effect once they were all read.
enum ReaderEvent {
    Tap(Vec<u8>),
    Quit,
}

/// Spawn the stdin thread. Link commands apply immediately; taps and `quit`
/// are queued for the reader.
pub fn spawn(link: Arc<Mutex<LinkControl>>) -> ConsoleReader {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || read_stdin(tx, link));
    ConsoleReader {
        events: Arc::new(Mutex::new(rx)),
        quit: Arc::new(AtomicBool::new(false)),
    }
}

fn read_stdin(tx: Sender<ReaderEvent>, link: Arc<Mutex<LinkControl>>) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let Some(command) = Command::parse(&line) else {
            if !line.trim().is_empty() {
                warn!("Unrecognized input '{}' (hex UID, drop, outage, portal, quit)", line.trim());
            }
            continue;
        };
        let event = match command {
            Command::Tap(uid) => ReaderEvent::Tap(uid),
            Command::Quit => ReaderEvent::Quit,
            Command::Drop => {
                link.lock().unwrap_or_else(PoisonError::into_inner).drop_link();
                continue;
            }
            Command::Outage => {
                link.lock().unwrap_or_else(PoisonError::into_inner).start_outage();
                continue;
            }
            Command::TogglePortal => {
                link.lock().unwrap_or_else(PoisonError::into_inner).toggle_portal();
                continue;
            }
        };
        if tx.send(event).is_err() {
            break;
        }
    }
    info!("Console input closed");
}

#[derive(Debug)]
pub struct ConsoleClosed;

/// Simulated NFC transceiver fed by the console. Cloning shares the queue,
/// so a restarted session keeps reading the same console.
#[derive(Clone)]
pub struct ConsoleReader {
    events: Arc<Mutex<Receiver<ReaderEvent>>>,
    quit: Arc<AtomicBool>,
}

impl ConsoleReader {
    pub fn quit_requested(&self) -> bool {
        self.quit.load(Ordering::Relaxed)
    }
}

impl NfcTransceiver for ConsoleReader {
    type Error = ConsoleClosed;

    fn initialize(&mut self) -> Result<(), ConsoleClosed> {
        Ok(())
    }

    fn firmware_version(&mut self) -> Result<Option<FirmwareVersion>, ConsoleClosed> {
        Ok(Some(FirmwareVersion {
            major: 1,
            minor: 0,
            patch: 0,
        }))
    }

    fn configure_reader_mode(&mut self) -> Result<(), ConsoleClosed> {
        Ok(())
    }

    fn poll_for_card(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, ConsoleClosed> {
        if self.quit_requested() {
            return Ok(None);
        }
        let events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        match events.recv_timeout(timeout) {
            Ok(ReaderEvent::Tap(uid)) => Ok(Some(uid)),
            Ok(ReaderEvent::Quit) => {
                self.quit.store(true, Ordering::Relaxed);
                Ok(None)
            }
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                // Stdin is gone; behave like an empty field
                thread::sleep(timeout);
                Ok(None)
            }
        }
    }
}
