//! Minimal in-memory collaborators driving a full session through the
//! public API.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::time::Duration;

use tapstation_core::{
    Clock, FeedbackSink, FirmwareVersion, HttpRequest, HttpResponse, HttpTransport, NetworkLink,
    NfcTransceiver, Notification, PortalConfig, WifiCredentials,
};

#[derive(Default)]
pub struct VirtualClock {
    pub now: Duration,
}

impl Clock for VirtualClock {
    fn now(&self) -> Duration {
        self.now
    }

    fn sleep(&mut self, duration: Duration) {
        self.now += duration;
    }
}

#[derive(Default)]
pub struct Transcript {
    pub lines: Vec<Notification>,
}

impl Transcript {
    pub fn titles(&self) -> Vec<String> {
        self.lines.iter().map(|n| n.title.clone()).collect()
    }
}

impl FeedbackSink for Transcript {
    fn emit(&mut self, notification: &Notification) {
        self.lines.push(notification.clone());
    }
}

/// Hands out one queued UID per poll, `None` once the queue is empty.
#[derive(Default)]
pub struct TapQueue {
    pub taps: VecDeque<Option<Vec<u8>>>,
}

impl NfcTransceiver for TapQueue {
    type Error = ();

    fn initialize(&mut self) -> Result<(), ()> {
        Ok(())
    }

    fn firmware_version(&mut self) -> Result<Option<FirmwareVersion>, ()> {
        Ok(Some(FirmwareVersion {
            major: 4,
            minor: 0,
            patch: 0,
        }))
    }

    fn configure_reader_mode(&mut self) -> Result<(), ()> {
        Ok(())
    }

    fn poll_for_card(&mut self, _timeout: Duration) -> Result<Option<Vec<u8>>, ()> {
        Ok(self.taps.pop_front().flatten())
    }
}

/// Station that is up unless `down` is set; the portal hands out fixed
/// credentials.
pub struct ToggleLink {
    pub up: bool,
    pub down: bool,
    pub portal_runs: u32,
    pub attempts: u32,
    pub provisioned: Option<WifiCredentials>,
}

impl ToggleLink {
    pub fn unprovisioned() -> Self {
        Self {
            up: false,
            down: false,
            portal_runs: 0,
            attempts: 0,
            provisioned: None,
        }
    }
}

impl NetworkLink for ToggleLink {
    type Error = ();

    fn is_associated(&mut self) -> bool {
        self.up
    }

    fn has_stored_credentials(&mut self) -> bool {
        self.provisioned.is_some()
    }

    fn begin_association(&mut self, _credentials: Option<&WifiCredentials>) -> Result<(), ()> {
        self.attempts += 1;
        self.up = !self.down;
        Ok(())
    }

    fn begin_provisioning_portal(&mut self, _portal: &PortalConfig) -> Result<bool, ()> {
        self.portal_runs += 1;
        self.provisioned = Some(WifiCredentials {
            ssid: "office".into(),
            password: "hunter22".into(),
        });
        self.up = true;
        Ok(true)
    }

    fn current_address(&mut self) -> Option<Ipv4Addr> {
        self.up.then_some(Ipv4Addr::new(192, 168, 4, 20))
    }
}

/// Fake attendance service keyed on the submitted UID.
pub struct FakeService {
    pub registered: Vec<(String, String)>,
    pub seen_today: Vec<String>,
    pub posts: Vec<String>,
}

impl HttpTransport for FakeService {
    type Error = ();

    fn send(&mut self, request: &HttpRequest<'_>) -> Result<HttpResponse, ()> {
        let body: serde_json::Value = serde_json::from_slice(request.body).map_err(|_| ())?;
        let uid = body["uid"].as_str().unwrap_or_default().to_string();
        self.posts.push(uid.clone());

        let Some((_, name)) = self.registered.iter().find(|(id, _)| *id == uid) else {
            return Ok(answer(404, serde_json::json!({"error": "User not found", "uid": uid})));
        };
        if self.seen_today.contains(&uid) {
            return Ok(answer(
                400,
                serde_json::json!({"error": "Attendance already recorded for today"}),
            ));
        }
        self.seen_today.push(uid);
        Ok(answer(
            201,
            serde_json::json!({"status": "success", "message": "Attendance recorded successfully", "user": name}),
        ))
    }
}

fn answer(status: u16, body: serde_json::Value) -> HttpResponse {
    HttpResponse {
        status,
        body: body.to_string().into_bytes(),
    }
}
