//! WiFi station link using esp-idf-svc
//!
//! Implements [`NetworkLink`] on top of the ESP32 WiFi driver. Credentials
//! entered through the setup portal are persisted by the driver in NVS, so a
//! provisioned terminal rejoins on the next boot without the portal.

use std::net::Ipv4Addr;

use anyhow::anyhow;
use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};
use log::{info, warn};
use tapstation_core::{NetworkLink, PortalConfig, WifiCredentials};

use crate::portal;

pub struct EspNetworkLink {
    wifi: BlockingWifi<EspWifi<'static>>,
}

impl EspNetworkLink {
    pub fn new(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: Option<EspDefaultNvsPartition>,
    ) -> anyhow::Result<Self> {
        info!("Initializing WiFi...");
        let esp_wifi = EspWifi::new(modem, sysloop.clone(), nvs)?;
        let wifi = BlockingWifi::wrap(esp_wifi, sysloop)?;
        Ok(Self { wifi })
    }

    pub(crate) fn wifi_mut(&mut self) -> &mut BlockingWifi<EspWifi<'static>> {
        &mut self.wifi
    }

    pub(crate) fn stored_client(&self) -> Option<ClientConfiguration> {
        match self.wifi.get_configuration() {
            Ok(Configuration::Client(client)) | Ok(Configuration::Mixed(client, _)) => {
                (!client.ssid.is_empty()).then_some(client)
            }
            Ok(_) => None,
            Err(e) => {
                warn!("Reading WiFi configuration failed: {:?}", e);
                None
            }
        }
    }
}

pub(crate) fn client_configuration(credentials: &WifiCredentials) -> anyhow::Result<ClientConfiguration> {
    let auth_method = if credentials.password.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPA2Personal
    };
    Ok(ClientConfiguration {
        ssid: credentials
            .ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("SSID longer than 32 bytes"))?,
        password: credentials
            .password
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("password longer than 64 bytes"))?,
        auth_method,
        bssid: None,
        channel: None,
        ..Default::default()
    })
}

impl NetworkLink for EspNetworkLink {
    type Error = anyhow::Error;

    fn is_associated(&mut self) -> bool {
        self.wifi.is_connected().unwrap_or(false)
    }

    fn has_stored_credentials(&mut self) -> bool {
        self.stored_client().is_some()
    }

    fn begin_association(&mut self, credentials: Option<&WifiCredentials>) -> anyhow::Result<()> {
        let client = match credentials {
            Some(credentials) => client_configuration(credentials)?,
            None => self
                .stored_client()
                .ok_or_else(|| anyhow!("no stored WiFi credentials"))?,
        };
        info!("Connecting to WiFi: {}", client.ssid);

        let configuration = Configuration::Client(client);
        if self.wifi.get_configuration().ok().as_ref() != Some(&configuration) {
            self.wifi.set_configuration(&configuration)?;
        }
        if !self.wifi.is_started()? {
            self.wifi.start()?;
        }
        // Non-blocking: the connectivity manager polls `is_associated`
        self.wifi.wifi_mut().connect()?;
        Ok(())
    }

    fn begin_provisioning_portal(&mut self, portal: &PortalConfig) -> anyhow::Result<bool> {
        portal::run(self, portal)
    }

    fn current_address(&mut self) -> Option<Ipv4Addr> {
        if !self.is_associated() {
            return None;
        }
        let ip_info = self.wifi.wifi().sta_netif().get_ip_info().ok()?;
        let octets = ip_info.ip.octets();
        let address = Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]);
        (!address.is_unspecified()).then_some(address)
    }
}
