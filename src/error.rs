use core::fmt;
use std::time::Duration;

/// Reason an envelope was refused before it reached any mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidEnvelope {
    ZeroRequestId,
    EmptyDestination,
    MissingPayload,
}

impl fmt::Display for InvalidEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidEnvelope::ZeroRequestId => write!(f, "request id must be positive"),
            InvalidEnvelope::EmptyDestination => write!(f, "destination gateway id is empty"),
            InvalidEnvelope::MissingPayload => write!(f, "payload is missing"),
        }
    }
}

impl std::error::Error for InvalidEnvelope {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmptyGatewayId;

impl fmt::Display for EmptyGatewayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gateway id cannot be empty")
    }
}

impl std::error::Error for EmptyGatewayId {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Backpressure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    Validation(InvalidEnvelope),
    NotFound {
        gateway: String,
    },
    Backpressure {
        gateway: String,
        request_id: u64,
        waited: Duration,
    },
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::Validation(_) => ErrorKind::Validation,
            DispatchError::NotFound { .. } => ErrorKind::NotFound,
            DispatchError::Backpressure { .. } => ErrorKind::Backpressure,
        }
    }

    /// Stable identifier used on the ingress wire.
    pub fn code(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Validation => "INVALID_ENVELOPE",
            ErrorKind::NotFound => "GATEWAY_NOT_FOUND",
            ErrorKind::Backpressure => "BACKPRESSURE",
        }
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::Validation(reason) => write!(f, "invalid envelope: {}", reason),
            DispatchError::NotFound { gateway } => {
                write!(f, "no mailbox for gateway {}", gateway)
            }
            DispatchError::Backpressure {
                gateway,
                request_id,
                waited,
            } => write!(
                f,
                "failed to enqueue request {} because mailbox for gateway {} stayed full for {:?}",
                request_id, gateway, waited
            ),
        }
    }
}

impl std::error::Error for DispatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DispatchError::Validation(reason) => Some(reason),
            _ => None,
        }
    }
}

impl From<InvalidEnvelope> for DispatchError {
    fn from(reason: InvalidEnvelope) -> Self {
        DispatchError::Validation(reason)
    }
}

impl From<DispatchError> for std::io::Error {
    fn from(err: DispatchError) -> Self {
        let kind = match err.kind() {
            ErrorKind::Validation => std::io::ErrorKind::InvalidInput,
            ErrorKind::NotFound => std::io::ErrorKind::NotFound,
            ErrorKind::Backpressure => std::io::ErrorKind::TimedOut,
        };
        std::io::Error::new(kind, err)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    ZeroCapacity,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroCapacity => write!(f, "mailbox capacity must be at least 1"),
        }
    }
}

impl std::error::Error for ConfigError {}
