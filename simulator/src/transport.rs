//! HTTP transports for the simulator: a real blocking client, or canned
//! answers when no attendance service is around.

use std::convert::Infallible;
use std::time::Duration;

use log::debug;
use serde_json::json;
use tapstation_core::{HttpRequest, HttpResponse, HttpTransport, Method};

pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    type Error = reqwest::Error;

    fn send(&mut self, request: &HttpRequest<'_>) -> Result<HttpResponse, reqwest::Error> {
        let mut builder = match request.method {
            Method::Get => self.client.get(request.url),
            Method::Post => self.client.post(request.url).body(request.body.to_vec()),
        };
        for (name, value) in request.headers {
            builder = builder.header(*name, *value);
        }
        let response = builder.send()?;
        let status = response.status().as_u16();
        let body = response.bytes()?.to_vec();
        debug!("{:?} {} -> {} ({} bytes)", request.method, request.url, status, body.len());
        Ok(HttpResponse { status, body })
    }
}

/// Records every submission and reports the service as online.
#[derive(Default)]
pub struct OfflineTransport;

impl HttpTransport for OfflineTransport {
    type Error = Infallible;

    fn send(&mut self, request: &HttpRequest<'_>) -> Result<HttpResponse, Infallible> {
        let (status, body) = match request.method {
            Method::Post => (
                201,
                json!({
                    "status": "success",
                    "message": "Attendance recorded (offline)",
                    "user": "Simulated Holder",
                }),
            ),
            Method::Get => (
                200,
                json!({"status": "online", "message": "Offline simulator", "firebase": "connected"}),
            ),
        };
        Ok(HttpResponse {
            status,
            body: body.to_string().into_bytes(),
        })
    }
}

#[cfg(test)]
mod tests {
    use tapstation_core::{AttendanceOutcome, AttendanceReporter, CardIdentifier, ServiceStatus};

    use super::*;

    #[test]
    fn offline_submissions_are_recorded() {
        let mut reporter = AttendanceReporter::new(OfflineTransport, "http://offline/api/attendance", None);
        let outcome = reporter.submit(&CardIdentifier::from_bytes(&[0x04, 0xa2, 0x3f]), "sim");
        assert!(matches!(
            outcome,
            AttendanceOutcome::Recorded { holder_name, .. } if holder_name == "Simulated Holder"
        ));
    }

    #[test]
    fn offline_service_is_online() {
        let mut reporter = AttendanceReporter::new(
            OfflineTransport,
            "http://offline/api/attendance",
            Some("http://offline/".to_string()),
        );
        assert_eq!(reporter.probe_service(), Some(ServiceStatus::Online));
    }

    #[test]
    fn unreachable_service_is_a_transport_failure() {
        let mut reporter = AttendanceReporter::new(
            ReqwestTransport::new(Duration::from_millis(200)).unwrap(),
            "http://127.0.0.1:9/api/attendance",
            None,
        );
        let outcome = reporter.submit(&CardIdentifier::from_bytes(&[1, 2, 3, 4]), "sim");
        assert_eq!(outcome, AttendanceOutcome::TransportFailure);
    }
}
