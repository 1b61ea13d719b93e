use serde::Deserialize;
use std::fmt::Display;
use thiserror::Error;

/// A failure reported by the API server or by the wire transport.
///
/// This is the unit the [`RetryPolicy`](crate::api::retry::RetryPolicy) classifies.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RestError {
    #[error("{status} {reason}: {message}")]
    Status { status: u16, reason: StatusReason, message: String },
    #[error("unknown {status} error:\n{body}")]
    Unknown { status: u16, body: String },
    #[error("transport failure: {0}")]
    Transport(String),
    /// The request could not be built or sent as configured, e.g. a bad URL.
    #[error("invalid request: {0}")]
    Request(String),
    #[error("undecodable response: {0}")]
    Decode(String),
}

impl RestError {
    pub fn status(&self) -> Option<u16> {
        match self {
            RestError::Status { status, .. } | RestError::Unknown { status, .. } => Some(*status),
            RestError::Transport(_) | RestError::Request(_) | RestError::Decode(_) => None,
        }
    }

    pub fn reason(&self) -> Option<&StatusReason> {
        match self {
            RestError::Status { reason, .. } => Some(reason),
            _ => None,
        }
    }

    /// Whether the failure is expected to go away on its own.
    ///
    /// Connection problems, throttling and server side failures are transient.
    /// Everything the server rejected on purpose (not found, conflicts, invalid
    /// bodies, missing permissions) and undecodable responses are not.
    pub fn is_transient(&self) -> bool {
        match self {
            RestError::Transport(_) => true,
            RestError::Request(_) | RestError::Decode(_) => false,
            RestError::Status { status, reason, .. } => {
                transient_status(*status) || reason.is_transient()
            }
            RestError::Unknown { status, .. } => transient_status(*status),
        }
    }
}

fn transient_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

/// The `reason` field of a Kubernetes `Status` object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum StatusReason {
    AlreadyExists,
    NotFound,
    Conflict,
    Invalid,
    BadRequest,
    Unauthorized,
    Forbidden,
    ServerTimeout,
    Timeout,
    TooManyRequests,
    InternalError,
    ServiceUnavailable,
    Unknown(String),
}

impl StatusReason {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            StatusReason::ServerTimeout
                | StatusReason::Timeout
                | StatusReason::TooManyRequests
                | StatusReason::InternalError
                | StatusReason::ServiceUnavailable
        )
    }
}

impl From<&str> for StatusReason {
    fn from(value: &str) -> Self {
        match value {
            "AlreadyExists" => StatusReason::AlreadyExists,
            "NotFound" => StatusReason::NotFound,
            "Conflict" => StatusReason::Conflict,
            "Invalid" => StatusReason::Invalid,
            "BadRequest" => StatusReason::BadRequest,
            "Unauthorized" => StatusReason::Unauthorized,
            "Forbidden" => StatusReason::Forbidden,
            "ServerTimeout" => StatusReason::ServerTimeout,
            "Timeout" => StatusReason::Timeout,
            "TooManyRequests" => StatusReason::TooManyRequests,
            "InternalError" => StatusReason::InternalError,
            "ServiceUnavailable" => StatusReason::ServiceUnavailable,
            _ => StatusReason::Unknown(value.to_owned()),
        }
    }
}

impl From<String> for StatusReason {
    fn from(value: String) -> Self {
        StatusReason::from(value.as_str())
    }
}

impl Display for StatusReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusReason::Unknown(reason) => write!(f, "{}", reason),
            known => write!(f, "{:?}", known),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("request failed after {attempts} attempt(s) when {context}: {source}")]
    Remote {
        context: String,
        attempts: u32,
        #[source]
        source: RestError,
    },
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("malformed {kind} document: {reason}")]
    MalformedDocument { kind: &'static str, reason: String },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    pub(crate) fn malformed(kind: &'static str, reason: impl Into<String>) -> Self {
        Error::MalformedDocument { kind, reason: reason.into() }
    }

    /// The wire level failure behind a remote error.
    pub fn rest(&self) -> Option<&RestError> {
        match self {
            Error::Remote { source, .. } => Some(source),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.rest().and_then(RestError::reason) == Some(&StatusReason::NotFound)
    }

    pub fn is_already_exists(&self) -> bool {
        self.rest().and_then(RestError::reason) == Some(&StatusReason::AlreadyExists)
    }
}
