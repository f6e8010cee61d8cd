//! Wi-Fi association lifecycle.
//!
//! States: `Disconnected -> Provisioning -> Connected`, `Connected ->
//! Disconnected` on link loss, and `Disconnected -> Connected` when a silent
//! reconnect with the stored credentials succeeds. Silent reconnection is
//! bounded; once the bound is spent the setup portal is opened again, and a
//! portal that times out ends the process.

use std::fmt;
use std::net::Ipv4Addr;

use log::{info, warn};

use crate::clock::Clock;
use crate::config::{Config, PortalConfig, ReconnectPolicy, WifiCredentials};
use crate::error::Error;
use crate::feedback::{FeedbackSink, Notification};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectivityState {
    Disconnected,
    Provisioning,
    Connected { address: Ipv4Addr },
}

impl ConnectivityState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectivityState::Connected { .. })
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectivityState::Disconnected => f.write_str("disconnected"),
            ConnectivityState::Provisioning => f.write_str("provisioning"),
            ConnectivityState::Connected { address } => write!(f, "connected ({})", address),
        }
    }
}

/// Network association subsystem (station + setup portal).
pub trait NetworkLink {
    type Error: fmt::Debug;

    /// Whether the station is currently associated.
    fn is_associated(&mut self) -> bool;

    /// Whether credentials from an earlier provisioning are stored.
    fn has_stored_credentials(&mut self) -> bool;

    /// Start joining a network. `None` reuses the stored credentials.
    fn begin_association(&mut self, credentials: Option<&WifiCredentials>) -> Result<(), Self::Error>;

    /// Run the captive setup portal until credentials were supplied and the
    /// station joined the network (`Ok(true)`), or until `portal.timeout`
    /// elapsed (`Ok(false)`).
    fn begin_provisioning_portal(&mut self, portal: &PortalConfig) -> Result<bool, Self::Error>;

    /// Station address, once DHCP has completed.
    fn current_address(&mut self) -> Option<Ipv4Addr>;
}

pub struct ConnectivityManager<L> {
    link: L,
    state: ConnectivityState,
    credentials: Option<WifiCredentials>,
    reset_requested: bool,
    policy: ReconnectPolicy,
    portal: PortalConfig,
}

impl<L: NetworkLink> ConnectivityManager<L> {
    pub fn new(link: L, config: &Config) -> Self {
        Self {
            link,
            state: ConnectivityState::Disconnected,
            credentials: config.wifi.clone(),
            reset_requested: config.reset_credentials,
            policy: config.reconnect,
            portal: config.portal.clone(),
        }
    }

    pub fn state(&self) -> &ConnectivityState {
        &self.state
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Startup path: join with known credentials if there are any, open the
    /// setup portal otherwise (or when a reset was requested).
    pub fn ensure_provisioned<C, S>(&mut self, clock: &mut C, sink: &mut S) -> Result<ConnectivityState, Error>
    where
        C: Clock,
        S: FeedbackSink,
    {
        let reset = std::mem::take(&mut self.reset_requested);
        let known = !reset && (self.credentials.is_some() || self.link.has_stored_credentials());

        if known {
            let network = self
                .credentials
                .as_ref()
                .map(|c| c.ssid.clone())
                .unwrap_or_else(|| "saved network".to_string());
            info!("Joining {}", network);
            sink.emit(&Notification::info("Connecting", format!("Joining {}", network)));

            if let Some(address) = self.try_associate(clock) {
                return Ok(self.mark_connected(address, sink));
            }
            warn!("Could not join {} with known credentials", network);
            sink.emit(&Notification::error("WiFi failed", "Opening setup portal"));
        } else if reset {
            info!("Credential reset requested, opening setup portal");
        } else {
            info!("No credentials stored, opening setup portal");
        }

        self.provision(clock, sink)
    }

    /// Cheap per-iteration check. Only records transitions; notifications
    /// for link loss are up to the caller.
    pub fn check_health(&mut self) -> ConnectivityState {
        let associated = self.link.is_associated();
        match (&self.state, associated) {
            (ConnectivityState::Connected { .. }, false) => {
                self.transition(ConnectivityState::Disconnected);
            }
            (ConnectivityState::Disconnected, true) => {
                if let Some(address) = self.link.current_address() {
                    self.transition(ConnectivityState::Connected { address });
                }
            }
            _ => {}
        }
        self.state.clone()
    }

    /// Silent reconnect with bounded attempts, then fall back to the portal.
    pub fn reconnect<C, S>(&mut self, clock: &mut C, sink: &mut S) -> Result<ConnectivityState, Error>
    where
        C: Clock,
        S: FeedbackSink,
    {
        if self.state.is_connected() {
            return Ok(self.state.clone());
        }

        sink.emit(&Notification::info(
            "Reconnecting",
            format!("Up to {} attempts", self.policy.max_attempts),
        ));
        if let Some(address) = self.try_associate(clock) {
            return Ok(self.mark_connected(address, sink));
        }

        warn!(
            "Reconnect failed after {} attempts, escalating to setup portal",
            self.policy.max_attempts
        );
        sink.emit(&Notification::error(
            "WiFi unavailable",
            format!("{} attempts failed, opening setup portal", self.policy.max_attempts),
        ));
        self.provision(clock, sink)
    }

    /// One association attempt per interval, at most `max_attempts` times.
    fn try_associate<C: Clock>(&mut self, clock: &mut C) -> Option<Ipv4Addr> {
        for attempt in 1..=self.policy.max_attempts {
            if let Err(e) = self.link.begin_association(self.credentials.as_ref()) {
                warn!("Association attempt {} failed to start: {:?}", attempt, e);
            }
            clock.sleep(self.policy.interval);

            if self.link.is_associated() {
                if let Some(address) = self.link.current_address() {
                    info!("Associated after {} attempt(s)", attempt);
                    return Some(address);
                }
            }
        }
        None
    }

    fn provision<C, S>(&mut self, clock: &mut C, sink: &mut S) -> Result<ConnectivityState, Error>
    where
        C: Clock,
        S: FeedbackSink,
    {
        self.transition(ConnectivityState::Provisioning);
        let body = match &self.portal.password {
            Some(_) => format!("Join '{}' (password protected) to configure", self.portal.ssid),
            None => format!("Join '{}' to configure", self.portal.ssid),
        };
        sink.emit(&Notification::info("Setup mode", body));

        match self.link.begin_provisioning_portal(&self.portal) {
            Ok(true) => {
                // Freshly provisioned credentials live in the link from now on
                self.credentials = None;
                if let Some(address) = self.link.current_address() {
                    return Ok(self.mark_connected(address, sink));
                }
                if let Some(address) = self.try_associate(clock) {
                    return Ok(self.mark_connected(address, sink));
                }
                sink.emit(&Notification::error("Setup failed", "Joined network but got no address"));
                Err(Error::ProvisioningFailed("no address after provisioning".into()))
            }
            Ok(false) => {
                sink.emit(&Notification::error("Setup timed out", "Restarting"));
                Err(Error::ProvisioningTimeout(self.portal.timeout))
            }
            Err(e) => {
                sink.emit(&Notification::error("Setup failed", "Restarting"));
                Err(Error::ProvisioningFailed(format!("{:?}", e)))
            }
        }
    }

    fn mark_connected<S: FeedbackSink>(&mut self, address: Ipv4Addr, sink: &mut S) -> ConnectivityState {
        self.transition(ConnectivityState::Connected { address });
        sink.emit(&Notification::success("WiFi connected", format!("IP {}", address)));
        self.state.clone()
    }

    fn transition(&mut self, next: ConnectivityState) {
        if self.state != next {
            info!("Connectivity: {} -> {}", self.state, next);
            self.state = next;
        }
    }
}
