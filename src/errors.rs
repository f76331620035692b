use crate::session::SessionState;
use crate::uds::format_hex;
use std::fmt;
use std::time::Duration;

/// What the ECM actually sent back when a response was missed or unmatched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservedResponse {
    /// A frame arrived from the ECM response identifier. Holds its service data
    /// unit: the frame bytes with any single-frame PCI byte removed, exactly the
    /// bytes the response was matched against.
    Frame(Vec<u8>),
    /// Nothing arrived before the response timeout expired
    NoResponse,
}

impl ObservedResponse {
    pub fn from_payload(payload: Option<Vec<u8>>) -> Self {
        match payload {
            Some(data) => ObservedResponse::Frame(data),
            None => ObservedResponse::NoResponse,
        }
    }
}

impl fmt::Display for ObservedResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObservedResponse::Frame(data) => write!(f, "{}", format_hex(data)),
            ObservedResponse::NoResponse => write!(f, "No response"),
        }
    }
}

/// Failures reported by a diagnostic transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The transport has already been released
    Closed,
    /// Peer or adapter went away
    Disconnected(String),
    /// Underlying I/O failure
    Io(String),
    /// A bus message could not be encoded or decoded
    Encoding(String),
    /// Classic CAN carries at most 8 data bytes
    FrameTooLong(usize),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Closed => write!(f, "Transport already closed"),
            TransportError::Disconnected(reason) => write!(f, "Transport disconnected: {}", reason),
            TransportError::Io(reason) => write!(f, "Transport I/O error: {}", reason),
            TransportError::Encoding(reason) => write!(f, "Bus message encoding error: {}", reason),
            TransportError::FrameTooLong(len) => {
                write!(f, "CAN frame data length {} exceeds 8 bytes", len)
            }
        }
    }
}

impl std::error::Error for TransportError {}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        TransportError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(e: serde_json::Error) -> Self {
        TransportError::Encoding(e.to_string())
    }
}

/// Outcome of a SecurityAccess step that did not succeed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityAccessError {
    /// No or invalid response to DiagnosticSessionControl (extended)
    SessionEstablishFailed(ObservedResponse),
    /// No or invalid response to the seed request
    SeedRequestFailed(ObservedResponse),
    /// ECM answered NRC 0x35 to the submitted key
    InvalidKey,
    /// ECM answered NRC 0x36; the penalty delay has already been waited out
    LockedOut { delay: Duration },
    /// Response to the key submission matched no known pattern, or timed out
    UnexpectedResponse(ObservedResponse),
    /// Transport failure; the session is failed and the transport released
    Transport(TransportError),
    /// Operation is not permitted in the current session state
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },
}

impl fmt::Display for SecurityAccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecurityAccessError::SessionEstablishFailed(observed) => {
                write!(f, "Failed to start diagnostic session: {}", observed)
            }
            SecurityAccessError::SeedRequestFailed(observed) => {
                write!(f, "Failed to retrieve seed: {}", observed)
            }
            SecurityAccessError::InvalidKey => {
                write!(f, "Invalid key (NRC 0x35), algorithm may be incorrect")
            }
            SecurityAccessError::LockedOut { delay } => write!(
                f,
                "Lockout (NRC 0x36), waited {} ms before returning",
                delay.as_millis()
            ),
            SecurityAccessError::UnexpectedResponse(observed) => {
                write!(f, "Unexpected response: {}", observed)
            }
            SecurityAccessError::Transport(e) => write!(f, "{}", e),
            SecurityAccessError::InvalidState { operation, state } => {
                write!(f, "{} not permitted in state {:?}", operation, state)
            }
        }
    }
}

impl std::error::Error for SecurityAccessError {}

impl From<TransportError> for SecurityAccessError {
    fn from(e: TransportError) -> Self {
        SecurityAccessError::Transport(e)
    }
}

/// Errors parsing a hex seed or key from user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseHexError {
    Empty,
    InvalidDigit(String),
    /// Value needs more than 40 bits
    TooWide(String),
}

impl fmt::Display for ParseHexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseHexError::Empty => write!(f, "Empty hex value"),
            ParseHexError::InvalidDigit(input) => write!(f, "Invalid hex value '{}'", input),
            ParseHexError::TooWide(input) => {
                write!(f, "Hex value '{}' does not fit in 5 bytes", input)
            }
        }
    }
}

impl std::error::Error for ParseHexError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observed_response_display() {
        let frame = ObservedResponse::Frame(vec![0x7F, 0x27, 0x31]);
        assert_eq!(frame.to_string(), "7F 27 31");
        assert_eq!(ObservedResponse::NoResponse.to_string(), "No response");
    }

    #[test]
    fn test_transport_error_converts_into_session_error() {
        let err: SecurityAccessError = TransportError::Closed.into();
        assert!(matches!(err, SecurityAccessError::Transport(TransportError::Closed)));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe gone");
        let err = TransportError::from(io);
        assert!(matches!(err, TransportError::Io(ref reason) if reason.contains("pipe gone")));
    }
}
