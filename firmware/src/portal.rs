//! Captive setup portal.
//!
//! Brings up a soft access point next to the station interface and serves a
//! small form on `http://192.168.71.1/`. A submitted form is tried right
//! away; the portal keeps running until the station joins or the timeout
//! elapses.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::anyhow;
use esp_idf_hal::delay::FreeRtos;
use esp_idf_svc::http::server::{Configuration as HttpServerConfiguration, EspHttpServer};
use embedded_svc::http::Headers;
use esp_idf_svc::http::Method;
use esp_idf_svc::io::{Read, Write};
use esp_idf_svc::wifi::{AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration};
use log::{info, warn};
use tapstation_core::{PortalConfig, WifiCredentials};

use crate::wifi_init::{client_configuration, EspNetworkLink};

const MAX_FORM_LEN: usize = 512;
const JOIN_TIMEOUT: Duration = Duration::from_secs(15);

static SETUP_PAGE: &str = r#"<!DOCTYPE html>
<html><head><meta name="viewport" content="width=device-width, initial-scale=1">
<title>TapStation setup</title></head>
<body><h2>TapStation WiFi setup</h2>
<form method="post" action="/save">
<p><label>Network <input name="ssid" maxlength="32" required></label></p>
<p><label>Password <input name="password" type="password" maxlength="64"></label></p>
<p><button type="submit">Connect</button></p>
</form></body></html>"#;

type Submitted = Arc<Mutex<Option<WifiCredentials>>>;

pub fn run(link: &mut EspNetworkLink, portal: &PortalConfig) -> anyhow::Result<bool> {
    info!("Starting setup portal '{}' for {}s", portal.ssid, portal.timeout.as_secs());

    let access_point = access_point_configuration(portal)?;
    // Keep the stored station so the radio can still rejoin it meanwhile
    let station = link.stored_client().unwrap_or_default();
    start_mixed(link, station, access_point.clone())?;

    let submitted: Submitted = Arc::new(Mutex::new(None));
    let _server = serve_form(submitted.clone())?;

    let deadline = Instant::now() + portal.timeout;
    while Instant::now() < deadline {
        let credentials = submitted.lock().map_err(|_| anyhow!("portal state poisoned"))?.take();
        if let Some(credentials) = credentials {
            info!("Portal received credentials for '{}'", credentials.ssid);
            let client = client_configuration(&credentials)?;
            start_mixed(link, client, access_point.clone())?;
            if join(link) {
                // Drop the access point, keep the station configuration
                let client = client_configuration(&credentials)?;
                link.wifi_mut().set_configuration(&Configuration::Client(client))?;
                link.wifi_mut().connect()?;
                link.wifi_mut().wait_netif_up()?;
                return Ok(true);
            }
            warn!("Could not join '{}', portal stays open", credentials.ssid);
        }
        FreeRtos::delay_ms(200);
    }

    info!("Setup portal timed out");
    link.wifi_mut().stop()?;
    Ok(false)
}

fn access_point_configuration(portal: &PortalConfig) -> anyhow::Result<AccessPointConfiguration> {
    let (auth_method, password) = match &portal.password {
        Some(password) => (
            AuthMethod::WPA2Personal,
            password
                .as_str()
                .try_into()
                .map_err(|_| anyhow!("portal password longer than 64 bytes"))?,
        ),
        None => (AuthMethod::None, Default::default()),
    };
    Ok(AccessPointConfiguration {
        ssid: portal
            .ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("portal SSID longer than 32 bytes"))?,
        password,
        auth_method,
        channel: 1,
        ..Default::default()
    })
}

fn start_mixed(
    link: &mut EspNetworkLink,
    client: ClientConfiguration,
    access_point: AccessPointConfiguration,
) -> anyhow::Result<()> {
    let wifi = link.wifi_mut();
    if wifi.is_started()? {
        wifi.stop()?;
    }
    wifi.set_configuration(&Configuration::Mixed(client, access_point))?;
    wifi.start()?;
    Ok(())
}

fn join(link: &mut EspNetworkLink) -> bool {
    let wifi = link.wifi_mut();
    if let Err(e) = wifi.wifi_mut().connect() {
        warn!("WiFi connect failed: {:?}", e);
        return false;
    }
    let started = Instant::now();
    while started.elapsed() < JOIN_TIMEOUT {
        if wifi.is_connected().unwrap_or(false) {
            return true;
        }
        FreeRtos::delay_ms(250);
    }
    false
}

fn serve_form(submitted: Submitted) -> anyhow::Result<EspHttpServer<'static>> {
    let config = HttpServerConfiguration {
        stack_size: 8192,
        ..Default::default()
    };
    let mut server = EspHttpServer::new(&config)?;

    server.fn_handler::<anyhow::Error, _>("/", Method::Get, |request| {
        request.into_ok_response()?.write_all(SETUP_PAGE.as_bytes())?;
        Ok(())
    })?;

    server.fn_handler::<anyhow::Error, _>("/save", Method::Post, move |mut request| {
        let len = request.content_len().unwrap_or(0) as usize;
        if len == 0 || len > MAX_FORM_LEN {
            request.into_status_response(413)?.write_all(b"Form too large")?;
            return Ok(());
        }
        let mut body = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            match request.read(&mut body[filled..])? {
                0 => break,
                n => filled += n,
            }
        }
        body.truncate(filled);

        match WifiCredentials::from_form(&String::from_utf8_lossy(&body)) {
            Some(credentials) => {
                *submitted.lock().map_err(|_| anyhow!("portal state poisoned"))? = Some(credentials);
                request
                    .into_ok_response()?
                    .write_all(b"Saved. The terminal is joining the network.")?;
            }
            None => {
                request.into_status_response(400)?.write_all(b"Network name is required")?;
            }
        }
        Ok(())
    })?;

    Ok(server)
}
