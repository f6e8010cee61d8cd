//! Simulated Wi-Fi link driven from the console.

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use log::info;
use tapstation_core::{NetworkLink, PortalConfig, WifiCredentials};

const SIMULATED_ADDRESS: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 50);
const PORTAL_DELAY: Duration = Duration::from_secs(1);

/// Radio state shared between the console thread and the session. Survives
/// simulated restarts the way NVS does on the device.
#[derive(Debug)]
pub struct LinkControl {
    associated: bool,
    outage: bool,
    portal_succeeds: bool,
    stored: Option<WifiCredentials>,
}

impl LinkControl {
    pub fn new() -> Self {
        Self {
            associated: false,
            outage: false,
            portal_succeeds: true,
            stored: None,
        }
    }

    /// Brief loss; the next association attempt succeeds.
    pub fn drop_link(&mut self) {
        info!("[sim] link dropped");
        self.associated = false;
    }

    /// Every association fails until a portal run succeeds.
    pub fn start_outage(&mut self) {
        info!("[sim] network outage");
        self.associated = false;
        self.outage = true;
    }

    pub fn toggle_portal(&mut self) {
        self.portal_succeeds = !self.portal_succeeds;
        info!(
            "[sim] next setup portal will {}",
            if self.portal_succeeds { "succeed" } else { "time out" }
        );
    }
}

impl Default for LinkControl {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SimulatedLink {
    control: Arc<Mutex<LinkControl>>,
}

impl SimulatedLink {
    pub fn new(control: Arc<Mutex<LinkControl>>) -> Self {
        Self { control }
    }

    fn control(&self) -> MutexGuard<'_, LinkControl> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl NetworkLink for SimulatedLink {
    type Error = std::convert::Infallible;

    fn is_associated(&mut self) -> bool {
        self.control().associated
    }

    fn has_stored_credentials(&mut self) -> bool {
        self.control().stored.is_some()
    }

    fn begin_association(&mut self, credentials: Option<&WifiCredentials>) -> Result<(), Self::Error> {
        let mut control = self.control();
        if let Some(credentials) = credentials {
            control.stored = Some(credentials.clone());
        }
        control.associated = !control.outage && control.stored.is_some();
        Ok(())
    }

    fn begin_provisioning_portal(&mut self, portal: &PortalConfig) -> Result<bool, Self::Error> {
        info!("[sim] setup portal '{}' open", portal.ssid);
        thread::sleep(PORTAL_DELAY);

        let mut control = self.control();
        if !control.portal_succeeds {
            // One failed run per toggle
            control.portal_succeeds = true;
            info!("[sim] nobody used the portal");
            return Ok(false);
        }
        control.stored = Some(WifiCredentials {
            ssid: "SimulatedNetwork".to_string(),
            password: "simulated".to_string(),
        });
        control.outage = false;
        control.associated = true;
        info!("[sim] portal received credentials");
        Ok(true)
    }

    fn current_address(&mut self) -> Option<Ipv4Addr> {
        self.control().associated.then_some(SIMULATED_ADDRESS)
    }
}
