use std::time::Duration;
use thiserror::Error;

/// Longest slice of an error body kept in a [`RemoteError::Protocol`].
pub const MAX_ERROR_BODY: usize = 500;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Timeout error: {service} did not answer within {timeout_secs}s")]
    Timeout { service: String, timeout_secs: u64 },

    #[error("Connect error: {service}: {message}")]
    Connect { service: String, message: String },

    #[error("Protocol error: {service} returned HTTP {status}: {body}")]
    Protocol { service: String, status: u16, body: String },

    #[error("Decode error: {service}: {message}")]
    Decode { service: String, message: String },

    #[error("Service error: {service}: {message}")]
    Service { service: String, message: String },
}

impl RemoteError {
    /// Short machine-readable class, recorded on failed stages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Connect { .. } => "connect",
            Self::Protocol { .. } => "protocol",
            Self::Decode { .. } => "decode",
            Self::Service { .. } => "service",
        }
    }

    pub(crate) fn from_reqwest(service: &str, timeout: Duration, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                service: service.to_string(),
                timeout_secs: timeout.as_secs(),
            }
        } else if err.is_decode() {
            Self::Decode {
                service: service.to_string(),
                message: err.to_string(),
            }
        } else {
            Self::Connect {
                service: service.to_string(),
                message: err.to_string(),
            }
        }
    }

    pub(crate) fn protocol(service: &str, status: reqwest::StatusCode, body: &str) -> Self {
        Self::Protocol {
            service: service.to_string(),
            status: status.as_u16(),
            body: truncate(body, MAX_ERROR_BODY).to_string(),
        }
    }
}

/// Cuts `s` to at most `max` bytes on a char boundary.
pub(crate) fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

pub type Result<T> = std::result::Result<T, RemoteError>;
