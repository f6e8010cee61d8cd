//! Scripted collaborators for unit tests.

use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::time::Duration;

use crate::card::{FirmwareVersion, NfcTransceiver};
use crate::clock::Clock;
use crate::config::{PortalConfig, WifiCredentials};
use crate::connectivity::NetworkLink;
use crate::feedback::{FeedbackSink, Notification};
use crate::reporter::{HttpRequest, HttpResponse, HttpTransport, Method};

/// Virtual time: `sleep` advances `now` instantly.
#[derive(Debug, Default)]
pub struct FakeClock {
    now: Duration,
    pub sleeps: Vec<Duration>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Duration {
        self.now
    }

    fn sleep(&mut self, duration: Duration) {
        self.sleeps.push(duration);
        self.now += duration;
    }
}

#[derive(Debug, Default)]
pub struct RecordingSink {
    pub notifications: Vec<Notification>,
}

impl RecordingSink {
    pub fn titles(&self) -> Vec<&str> {
        self.notifications.iter().map(|n| n.title.as_str()).collect()
    }

    pub fn count(&self, title: &str) -> usize {
        self.notifications.iter().filter(|n| n.title == title).count()
    }

    pub fn last(&self) -> Option<&Notification> {
        self.notifications.last()
    }

    pub fn clear(&mut self) {
        self.notifications.clear();
    }
}

impl FeedbackSink for RecordingSink {
    fn emit(&mut self, notification: &Notification) {
        self.notifications.push(notification.clone());
    }
}

#[derive(Debug)]
pub struct ReaderGlitch;

/// Plays back queued poll results, then keeps reporting the held card (if
/// any).
#[derive(Debug)]
pub struct ScriptedTransceiver {
    pub firmware: Option<FirmwareVersion>,
    pub reader_mode: bool,
    pub polls: usize,
    queued: VecDeque<Result<Option<Vec<u8>>, ReaderGlitch>>,
    held: Option<Vec<u8>>,
}

impl ScriptedTransceiver {
    pub fn new() -> Self {
        Self {
            firmware: Some(FirmwareVersion {
                major: 1,
                minor: 6,
                patch: 0,
            }),
            reader_mode: false,
            polls: 0,
            queued: VecDeque::new(),
            held: None,
        }
    }

    pub fn missing() -> Self {
        Self {
            firmware: None,
            ..Self::new()
        }
    }

    /// Card in the field for exactly one poll
    pub fn present(&mut self, uid: &[u8]) {
        self.queued.push_back(Ok(Some(uid.to_vec())));
    }

    pub fn absent_for(&mut self, polls: usize) {
        for _ in 0..polls {
            self.queued.push_back(Ok(None));
        }
    }

    pub fn fail_next_poll(&mut self) {
        self.queued.push_back(Err(ReaderGlitch));
    }

    /// Card left lying on the reader
    pub fn hold(&mut self, uid: &[u8]) {
        self.held = Some(uid.to_vec());
    }
}

impl NfcTransceiver for ScriptedTransceiver {
    type Error = ReaderGlitch;

    fn initialize(&mut self) -> Result<(), ReaderGlitch> {
        Ok(())
    }

    fn firmware_version(&mut self) -> Result<Option<FirmwareVersion>, ReaderGlitch> {
        Ok(self.firmware)
    }

    fn configure_reader_mode(&mut self) -> Result<(), ReaderGlitch> {
        self.reader_mode = true;
        Ok(())
    }

    fn poll_for_card(&mut self, _timeout: Duration) -> Result<Option<Vec<u8>>, ReaderGlitch> {
        self.polls += 1;
        match self.queued.pop_front() {
            Some(result) => result,
            None => Ok(self.held.clone()),
        }
    }
}

#[derive(Debug)]
pub struct LinkFault;

/// Station that joins after a scripted number of association attempts.
#[derive(Debug)]
pub struct ScriptedLink {
    pub associated: bool,
    pub stored_credentials: bool,
    pub address: Ipv4Addr,
    pub association_attempts: u32,
    pub last_credentials: Option<WifiCredentials>,
    pub portal_runs: u32,
    pub portal_succeeds: bool,
    pub portal_error: bool,
    remaining_attempts: Option<u32>,
}

impl ScriptedLink {
    pub fn associating_after(attempts: u32, address: Ipv4Addr) -> Self {
        Self {
            associated: false,
            stored_credentials: false,
            address,
            association_attempts: 0,
            last_credentials: None,
            portal_runs: 0,
            portal_succeeds: true,
            portal_error: false,
            remaining_attempts: Some(attempts),
        }
    }

    pub fn unprovisioned(address: Ipv4Addr) -> Self {
        Self {
            remaining_attempts: None,
            ..Self::associating_after(0, address)
        }
    }

    pub fn drop_link(&mut self) {
        self.associated = false;
    }

    pub fn associate_after(&mut self, attempts: u32) {
        self.remaining_attempts = Some(attempts);
    }

    pub fn never_associate(&mut self) {
        self.remaining_attempts = None;
    }
}

impl NetworkLink for ScriptedLink {
    type Error = LinkFault;

    fn is_associated(&mut self) -> bool {
        self.associated
    }

    fn has_stored_credentials(&mut self) -> bool {
        self.stored_credentials
    }

    fn begin_association(&mut self, credentials: Option<&WifiCredentials>) -> Result<(), LinkFault> {
        self.association_attempts += 1;
        self.last_credentials = credentials.cloned();
        if let Some(remaining) = self.remaining_attempts.as_mut() {
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                self.associated = true;
            }
        }
        Ok(())
    }

    fn begin_provisioning_portal(&mut self, _portal: &PortalConfig) -> Result<bool, LinkFault> {
        self.portal_runs += 1;
        if self.portal_error {
            return Err(LinkFault);
        }
        if self.portal_succeeds {
            self.associated = true;
            self.stored_credentials = true;
        }
        Ok(self.portal_succeeds)
    }

    fn current_address(&mut self) -> Option<Ipv4Addr> {
        self.associated.then_some(self.address)
    }
}

#[derive(Debug)]
pub struct TransportDown;

/// Owned copy of a request the code under test sent.
#[derive(Debug, Clone)]
pub struct SentRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// Answers queued responses first, then the fallback answer forever.
#[derive(Debug)]
pub struct ScriptedTransport {
    pub requests: Vec<SentRequest>,
    queued: VecDeque<Result<HttpResponse, TransportDown>>,
    fallback: Option<HttpResponse>,
}

impl ScriptedTransport {
    pub fn answering(status: u16, body: &str) -> Self {
        Self {
            requests: Vec::new(),
            queued: VecDeque::new(),
            fallback: Some(HttpResponse {
                status,
                body: body.as_bytes().to_vec(),
            }),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            requests: Vec::new(),
            queued: VecDeque::new(),
            fallback: None,
        }
    }

    pub fn then_answer(&mut self, status: u16, body: &str) {
        self.queued.push_back(Ok(HttpResponse {
            status,
            body: body.as_bytes().to_vec(),
        }));
    }

    pub fn then_fail(&mut self) {
        self.queued.push_back(Err(TransportDown));
    }

    pub fn posts(&self) -> usize {
        self.requests.iter().filter(|r| r.method == Method::Post).count()
    }
}

impl HttpTransport for ScriptedTransport {
    type Error = TransportDown;

    fn send(&mut self, request: &HttpRequest<'_>) -> Result<HttpResponse, TransportDown> {
        self.requests.push(SentRequest {
            method: request.method,
            url: request.url.to_string(),
            headers: request
                .headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: request.body.to_vec(),
        });
        match self.queued.pop_front() {
            Some(result) => result,
            None => self.fallback.clone().ok_or(TransportDown),
        }
    }
}
