//! Blocking HTTP(S) transport on the ESP-IDF client.

use std::time::Duration;

use embedded_svc::http::client::Client;
use esp_idf_svc::http::client::{Configuration as HttpConfiguration, EspHttpConnection};
use esp_idf_svc::http::Method as EspMethod;
use esp_idf_svc::io::{Read, Write};
use log::debug;
use tapstation_core::{HttpRequest, HttpResponse, HttpTransport, Method};

const MAX_RESPONSE_LEN: usize = 4096;

/// Opens a fresh connection per request; the terminal sends one request per
/// tap, so keep-alive buys nothing.
pub struct EspHttpTransport {
    timeout: Duration,
}

impl EspHttpTransport {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl HttpTransport for EspHttpTransport {
    type Error = anyhow::Error;

    fn send(&mut self, request: &HttpRequest<'_>) -> anyhow::Result<HttpResponse> {
        let connection = EspHttpConnection::new(&HttpConfiguration {
            timeout: Some(self.timeout),
            crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
            ..Default::default()
        })?;
        let mut client = Client::wrap(connection);

        let content_length = request.body.len().to_string();
        let mut headers: Vec<(&str, &str)> = request.headers.to_vec();
        if !request.body.is_empty() {
            headers.push(("Content-Length", &content_length));
        }

        let method = match request.method {
            Method::Get => EspMethod::Get,
            Method::Post => EspMethod::Post,
        };
        let mut outgoing = client.request(method, request.url, &headers)?;
        if !request.body.is_empty() {
            outgoing.write_all(request.body)?;
            outgoing.flush()?;
        }
        let mut response = outgoing.submit()?;
        let status = response.status();

        let mut body = Vec::new();
        let mut chunk = [0u8; 256];
        loop {
            let n = response.read(&mut chunk)?;
            if n == 0 || body.len() + n > MAX_RESPONSE_LEN {
                body.extend_from_slice(&chunk[..n.min(MAX_RESPONSE_LEN - body.len())]);
                break;
            }
            body.extend_from_slice(&chunk[..n]);
        }
        debug!("{:?} {} -> {} ({} bytes)", request.method, request.url, status, body.len());

        Ok(HttpResponse { status, body })
    }
}
