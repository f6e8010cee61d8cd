use std::time::Duration;

use thiserror::Error;

/// Conditions that end the session loop.
///
/// Everything recoverable (link loss, transport failures, rejected
/// submissions, unreadable response bodies) is handled in place and never
/// shows up here.
#[derive(Error, Debug)]
pub enum Error {
    #[error("NFC reader not found: {0}")]
    ReaderNotFound(String),

    #[error("Provisioning portal timed out after {}s", .0.as_secs())]
    ProvisioningTimeout(Duration),

    #[error("Provisioning portal failed: {0}")]
    ProvisioningFailed(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl Error {
    /// Provisioning failures are resolved by restarting the whole process.
    /// Hardware and configuration failures halt instead.
    pub fn is_restart_required(&self) -> bool {
        matches!(
            self,
            Error::ProvisioningTimeout(_) | Error::ProvisioningFailed(_)
        )
    }

    /// Short title for the persistent fatal notification.
    pub fn title(&self) -> &'static str {
        match self {
            Error::ReaderNotFound(_) => "Reader error",
            Error::ProvisioningTimeout(_) => "Setup timed out",
            Error::ProvisioningFailed(_) => "Setup failed",
            Error::Config(_) => "Config error",
        }
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),

    #[error("Missing value for {0}")]
    Missing(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provisioning_errors_require_restart() {
        assert!(Error::ProvisioningTimeout(Duration::from_secs(180)).is_restart_required());
        assert!(Error::ProvisioningFailed("radio".into()).is_restart_required());
        assert!(!Error::ReaderNotFound("no answer".into()).is_restart_required());
        assert!(!Error::Config(ConfigError::Missing("endpoint")).is_restart_required());
    }

    #[test]
    fn config_errors_halt_with_their_own_title() {
        let err = Error::from(ConfigError::Invalid("endpoint", "must be an http:// or https:// URL"));
        assert!(!err.is_restart_required());
        assert_eq!(err.title(), "Config error");
        assert_eq!(
            err.to_string(),
            "Configuration error: Invalid value for endpoint: must be an http:// or https:// URL"
        );
    }

    #[test]
    fn timeout_message_is_in_seconds() {
        let err = Error::ProvisioningTimeout(Duration::from_secs(180));
        assert_eq!(err.to_string(), "Provisioning portal timed out after 180s");
    }
}
