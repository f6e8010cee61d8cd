//! Attendance reporter.
//!
//! Sends one POST per scanned card and classifies the answer from the status
//! code plus whatever can be salvaged from the body. A body that is missing
//! or not JSON only costs the holder a placeholder text.

use std::fmt;

use log::{info, warn};
use serde::Serialize;
use serde_json::Value;

use crate::card::CardIdentifier;
use crate::feedback::Notification;

/// Holder name used when a 201 answer does not name anyone
pub const UNKNOWN_HOLDER: &str = "Unknown";
const ALREADY_RECORDED_TEXT: &str = "Attendance already recorded";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone, Copy)]
pub struct HttpRequest<'a> {
    pub method: Method,
    pub url: &'a str,
    pub headers: &'a [(&'a str, &'a str)],
    pub body: &'a [u8],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// HTTP client used to reach the attendance service.
///
/// An `Err` means the request never got an answer (connect failure,
/// timeout, reset). Any status code, including 5xx, is an `Ok`.
pub trait HttpTransport {
    type Error: fmt::Debug;

    fn send(&mut self, request: &HttpRequest<'_>) -> Result<HttpResponse, Self::Error>;
}

impl<T: HttpTransport + ?Sized> HttpTransport for &mut T {
    type Error = T::Error;

    fn send(&mut self, request: &HttpRequest<'_>) -> Result<HttpResponse, Self::Error> {
        (**self).send(request)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttendanceOutcome {
    Recorded {
        holder_name: String,
        message: Option<String>,
    },
    NotRegistered,
    AlreadyRecorded {
        message: String,
    },
    ServerError {
        code: u16,
        message: String,
    },
    TransportFailure,
}

impl AttendanceOutcome {
    /// Map a status code and raw body to an outcome. Never fails.
    pub fn classify(status: u16, body: &[u8]) -> Self {
        let fields = ResponseFields::parse(body);
        match status {
            201 => AttendanceOutcome::Recorded {
                holder_name: fields.user.unwrap_or_else(|| UNKNOWN_HOLDER.to_string()),
                message: fields.message,
            },
            404 => AttendanceOutcome::NotRegistered,
            400 => AttendanceOutcome::AlreadyRecorded {
                message: fields.error.unwrap_or_else(|| ALREADY_RECORDED_TEXT.to_string()),
            },
            code => AttendanceOutcome::ServerError {
                code,
                message: fields.error.unwrap_or_else(|| format!("HTTP error {}", code)),
            },
        }
    }

    /// What the card holder gets to see.
    pub fn notification(&self, identifier: &CardIdentifier) -> Notification {
        match self {
            AttendanceOutcome::Recorded {
                holder_name,
                message,
            } => Notification::success(
                format!("Welcome, {}", holder_name),
                message.as_deref().unwrap_or("Attendance recorded"),
            ),
            AttendanceOutcome::NotRegistered => {
                Notification::error("Card not registered", identifier.as_str())
            }
            AttendanceOutcome::AlreadyRecorded { message } => {
                Notification::error("Already recorded", message.as_str())
            }
            AttendanceOutcome::ServerError { code, message } => {
                Notification::error(format!("Server error {}", code), message.as_str())
            }
            AttendanceOutcome::TransportFailure => {
                Notification::error("Network error", "Server unreachable, scan again")
            }
        }
    }
}

impl fmt::Display for AttendanceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttendanceOutcome::Recorded { holder_name, .. } => write!(f, "recorded ({})", holder_name),
            AttendanceOutcome::NotRegistered => f.write_str("not registered"),
            AttendanceOutcome::AlreadyRecorded { message } => write!(f, "already recorded ({})", message),
            AttendanceOutcome::ServerError { code, message } => write!(f, "server error {} ({})", code, message),
            AttendanceOutcome::TransportFailure => f.write_str("transport failure"),
        }
    }
}

/// Known string fields of a service answer. Anything missing, mistyped or
/// unparseable is simply absent.
#[derive(Debug, Default, PartialEq)]
struct ResponseFields {
    user: Option<String>,
    error: Option<String>,
    message: Option<String>,
    status: Option<String>,
    database: Option<String>,
}

impl ResponseFields {
    fn parse(body: &[u8]) -> Self {
        let value: Value = match serde_json::from_slice(body) {
            Ok(value) => value,
            Err(_) => return Self::default(),
        };
        let field = |name: &str| {
            value
                .get(name)
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string)
        };
        Self {
            user: field("user"),
            error: field("error"),
            message: field("message"),
            status: field("status"),
            database: field("firebase"),
        }
    }
}

/// Result of probing the service status page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceStatus {
    Online,
    Degraded { reason: String },
    Unreachable,
}

impl ServiceStatus {
    pub fn notification(&self) -> Notification {
        match self {
            ServiceStatus::Online => Notification::info("Server online", "Attendance service reachable"),
            ServiceStatus::Degraded { reason } => Notification::error("Server degraded", reason.as_str()),
            ServiceStatus::Unreachable => Notification::error("Server unreachable", "Check network or server"),
        }
    }
}

/// Request body of one attendance submission.
#[derive(Serialize)]
struct Submission<'a> {
    uid: &'a str,
    device_id: &'a str,
}

pub struct AttendanceReporter<T> {
    transport: T,
    endpoint: String,
    status_url: Option<String>,
}

impl<T: HttpTransport> AttendanceReporter<T> {
    pub fn new(transport: T, endpoint: impl Into<String>, status_url: Option<String>) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
            status_url,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Report one scan. Exactly one request goes out; there is no retry.
    pub fn submit(&mut self, identifier: &CardIdentifier, device_id: &str) -> AttendanceOutcome {
        let submission = Submission {
            uid: identifier.as_str(),
            device_id,
        };
        let body = match serde_json::to_vec(&submission) {
            Ok(body) => body,
            Err(e) => {
                warn!("Encoding submission for {} failed: {}", identifier, e);
                return AttendanceOutcome::TransportFailure;
            }
        };

        let request = HttpRequest {
            method: Method::Post,
            url: &self.endpoint,
            headers: &[("Content-Type", "application/json")],
            body: &body,
        };

        match self.transport.send(&request) {
            Ok(response) => {
                let outcome = AttendanceOutcome::classify(response.status, &response.body);
                info!("Submitted {}: HTTP {} -> {}", identifier, response.status, outcome);
                outcome
            }
            Err(e) => {
                warn!("Submitting {} failed: {:?}", identifier, e);
                AttendanceOutcome::TransportFailure
            }
        }
    }

    /// Probe the status page, if one is configured.
    pub fn probe_service(&mut self) -> Option<ServiceStatus> {
        let url = self.status_url.as_deref()?;
        let request = HttpRequest {
            method: Method::Get,
            url,
            headers: &[("Accept", "application/json")],
            body: &[],
        };

        let status = match self.transport.send(&request) {
            Ok(response) if (200..300).contains(&response.status) => {
                let fields = ResponseFields::parse(&response.body);
                match (fields.status.as_deref(), fields.database.as_deref()) {
                    (_, Some("disconnected")) => ServiceStatus::Degraded {
                        reason: "Database disconnected".to_string(),
                    },
                    (Some(other), _) if other != "online" => ServiceStatus::Degraded {
                        reason: format!("Status '{}'", other),
                    },
                    _ => ServiceStatus::Online,
                }
            }
            Ok(response) => {
                warn!("Status probe answered HTTP {}", response.status);
                ServiceStatus::Unreachable
            }
            Err(e) => {
                warn!("Status probe failed: {:?}", e);
                ServiceStatus::Unreachable
            }
        };
        info!("Service status: {:?}", status);
        Some(status)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::testing::ScriptedTransport;

    const ENDPOINT: &str = "http://attendance.local/api/attendance";

    fn card() -> CardIdentifier {
        CardIdentifier::from_bytes(&[0x04, 0xa2, 0x3f, 0x91])
    }

    fn submit_with(status: u16, body: &str) -> AttendanceOutcome {
        let transport = ScriptedTransport::answering(status, body);
        let mut reporter = AttendanceReporter::new(transport, ENDPOINT, None);
        reporter.submit(&card(), "gate-1")
    }

    #[test]
    fn created_with_user_is_recorded() {
        assert_eq!(
            submit_with(201, r#"{"user":"Alice"}"#),
            AttendanceOutcome::Recorded {
                holder_name: "Alice".into(),
                message: None
            }
        );
    }

    #[test]
    fn created_keeps_service_message() {
        let outcome = submit_with(
            201,
            r#"{"status":"success","message":"Attendance recorded successfully","user":"Bob"}"#,
        );
        assert_eq!(
            outcome,
            AttendanceOutcome::Recorded {
                holder_name: "Bob".into(),
                message: Some("Attendance recorded successfully".into())
            }
        );
    }

    #[test]
    fn created_with_empty_body_uses_placeholder() {
        assert_eq!(
            submit_with(201, ""),
            AttendanceOutcome::Recorded {
                holder_name: UNKNOWN_HOLDER.into(),
                message: None
            }
        );
    }

    #[test]
    fn created_with_non_string_user_uses_placeholder() {
        let outcome = submit_with(201, r#"{"user":42}"#);
        assert!(matches!(outcome, AttendanceOutcome::Recorded { holder_name, .. } if holder_name == UNKNOWN_HOLDER));
    }

    #[test]
    fn created_with_blank_user_uses_placeholder() {
        for body in [r#"{"user":""}"#, r#"{"user":"   "}"#] {
            let outcome = submit_with(201, body);
            assert!(matches!(&outcome, AttendanceOutcome::Recorded { holder_name, .. } if holder_name == UNKNOWN_HOLDER));
            assert_eq!(outcome.notification(&card()).title, "Welcome, Unknown");
        }
    }

    #[test]
    fn bad_request_with_blank_error_uses_generic_text() {
        assert_eq!(
            submit_with(400, r#"{"error":""}"#),
            AttendanceOutcome::AlreadyRecorded {
                message: ALREADY_RECORDED_TEXT.into()
            }
        );
    }

    #[test]
    fn not_found_is_not_registered() {
        assert_eq!(
            submit_with(404, r#"{"error":"User not found","uid":"04:a2:3f:91"}"#),
            AttendanceOutcome::NotRegistered
        );
    }

    #[test]
    fn bad_request_carries_error_text() {
        assert_eq!(
            submit_with(400, r#"{"error":"Already recorded today"}"#),
            AttendanceOutcome::AlreadyRecorded {
                message: "Already recorded today".into()
            }
        );
    }

    #[test]
    fn bad_request_with_garbage_body_uses_generic_text() {
        assert_eq!(
            submit_with(400, "<html>nope</html>"),
            AttendanceOutcome::AlreadyRecorded {
                message: ALREADY_RECORDED_TEXT.into()
            }
        );
    }

    #[test]
    fn other_codes_are_server_errors() {
        assert_eq!(
            submit_with(500, r#"{"error":"Database not connected"}"#),
            AttendanceOutcome::ServerError {
                code: 500,
                message: "Database not connected".into()
            }
        );
        assert_eq!(
            submit_with(503, "{truncated"),
            AttendanceOutcome::ServerError {
                code: 503,
                message: "HTTP error 503".into()
            }
        );
        assert!(matches!(submit_with(200, "{}"), AttendanceOutcome::ServerError { code: 200, .. }));
    }

    #[test]
    fn transport_error_is_transport_failure() {
        let transport = ScriptedTransport::unreachable();
        let mut reporter = AttendanceReporter::new(transport, ENDPOINT, None);
        assert_eq!(reporter.submit(&card(), "gate-1"), AttendanceOutcome::TransportFailure);
        assert_eq!(reporter.transport().requests.len(), 1);
    }

    #[test]
    fn submit_sends_one_json_post() {
        let transport = ScriptedTransport::answering(201, r#"{"user":"Alice"}"#);
        let mut reporter = AttendanceReporter::new(transport, ENDPOINT, None);

        reporter.submit(&card(), "gate-1");

        let requests = &reporter.transport().requests;
        assert_eq!(requests.len(), 1);
        let sent = &requests[0];
        assert_eq!(sent.method, Method::Post);
        assert_eq!(sent.url, ENDPOINT);
        assert!(sent
            .headers
            .contains(&("Content-Type".to_string(), "application/json".to_string())));
        let body: Value = serde_json::from_slice(&sent.body).unwrap();
        assert_eq!(body, serde_json::json!({"uid": "04:a2:3f:91", "device_id": "gate-1"}));
    }

    #[test]
    fn notifications_match_outcomes() {
        let id = card();
        let recorded = AttendanceOutcome::classify(201, br#"{"user":"Alice"}"#).notification(&id);
        assert_eq!(recorded.title, "Welcome, Alice");
        assert!(!recorded.severity.is_error());

        let unknown = AttendanceOutcome::NotRegistered.notification(&id);
        assert_eq!(unknown.body, "04:a2:3f:91");
        assert!(unknown.severity.is_error());

        assert!(AttendanceOutcome::TransportFailure.notification(&id).severity.is_error());
    }

    #[test]
    fn probe_is_skipped_without_status_url() {
        let transport = ScriptedTransport::answering(200, "{}");
        let mut reporter = AttendanceReporter::new(transport, ENDPOINT, None);
        assert_eq!(reporter.probe_service(), None);
        assert!(reporter.transport().requests.is_empty());
    }

    #[test]
    fn probe_classifies_status_page() {
        let probe = |status: u16, body: &str| {
            let transport = ScriptedTransport::answering(status, body);
            let mut reporter =
                AttendanceReporter::new(transport, ENDPOINT, Some("http://attendance.local/".into()));
            reporter.probe_service().unwrap()
        };

        assert_eq!(
            probe(200, r#"{"status":"online","firebase":"connected"}"#),
            ServiceStatus::Online
        );
        assert_eq!(
            probe(200, r#"{"status":"online","firebase":"disconnected"}"#),
            ServiceStatus::Degraded {
                reason: "Database disconnected".into()
            }
        );
        assert_eq!(probe(200, "not json"), ServiceStatus::Online);
        assert_eq!(probe(502, ""), ServiceStatus::Unreachable);
    }

    #[test]
    fn probe_transport_error_is_unreachable() {
        let transport = ScriptedTransport::unreachable();
        let mut reporter = AttendanceReporter::new(transport, ENDPOINT, Some("http://attendance.local/".into()));
        assert_eq!(reporter.probe_service(), Some(ServiceStatus::Unreachable));
        assert_eq!(reporter.transport().requests[0].method, Method::Get);
    }

    fn assert_classified(status: u16, outcome: &AttendanceOutcome) -> Result<(), TestCaseError> {
        match (status, outcome) {
            (201, AttendanceOutcome::Recorded { holder_name, .. }) => prop_assert!(!holder_name.trim().is_empty()),
            (404, AttendanceOutcome::NotRegistered) => {}
            (400, AttendanceOutcome::AlreadyRecorded { message }) => prop_assert!(!message.trim().is_empty()),
            (code, AttendanceOutcome::ServerError { code: reported, message }) => {
                prop_assert!(![201, 400, 404].contains(&code));
                prop_assert_eq!(code, *reported);
                prop_assert!(!message.trim().is_empty());
            }
            (code, other) => prop_assert!(false, "HTTP {} classified as {:?}", code, other),
        }
        Ok(())
    }

    proptest! {
        #[test]
        fn any_answer_is_classified(status in any::<u16>(), body in prop::collection::vec(any::<u8>(), 0..256)) {
            let outcome = AttendanceOutcome::classify(status, &body);
            assert_classified(status, &outcome)?;
        }

        #[test]
        fn any_json_fields_are_classified(
            status in prop::sample::select(vec![200u16, 201, 400, 404, 500, 503]),
            user in ".{0,12}",
            error in ".{0,12}",
        ) {
            let body = serde_json::json!({"user": user, "error": error}).to_string();
            let outcome = AttendanceOutcome::classify(status, body.as_bytes());
            assert_classified(status, &outcome)?;
        }
    }
}
